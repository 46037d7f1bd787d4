//! Record pipeline
//!
//! One converted record, start to finish:
//! 1. Exact dedup: identifier, then DOI / metadata key. A loaded match ends
//!    here, before any user-directory lookups
//! 2. Attribution: bind users/institutions; no owners means discard. Owners
//!    are needed even for unloaded duplicates, which gain them
//! 3. Embedding (external, best effort) and similarity dedup
//! 4. Persist as new, or deep-merge into the matched record
//!
//! Shared by harvests and file uploads so both follow the same rules.

use biblio_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};

use super::attribution::{attribute, UserDirectory};
use super::deduplicator::{DedupDecision, Deduplicator};
use super::deep_merge::deep_merge;
use super::embedding::Embedder;
use crate::db::import_records;
use crate::models::{ImportRecord, Owner, RecordOutcome};
use crate::utils::retry_on_lock;

const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

#[derive(Clone)]
pub struct RecordPipeline {
    pool: SqlitePool,
    directory: Arc<dyn UserDirectory>,
    embedder: Arc<dyn Embedder>,
    deduplicator: Deduplicator,
    max_lock_wait_ms: u64,
}

impl RecordPipeline {
    pub fn new(pool: SqlitePool, directory: Arc<dyn UserDirectory>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            deduplicator: Deduplicator::new(pool.clone()),
            pool,
            directory,
            embedder,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub async fn process(&self, mut record: ImportRecord, requester: Option<Owner>) -> Result<RecordOutcome> {
        let exact = self.deduplicator.exact_match(&record).await?;
        if let Some(DedupDecision::Duplicate { identifier, loaded: true }) = &exact {
            debug!(record = %record.identifier, existing = %identifier, "Duplicate of a loaded record");
            return Ok(RecordOutcome::Duplicate);
        }

        attribute(self.directory.as_ref(), &mut record, requester).await?;
        if !record.has_owners() {
            debug!(record = %record.identifier, "No user or institution to attribute, discarding");
            return Ok(RecordOutcome::Discarded);
        }

        let decision = match exact {
            Some(decision) => decision,
            None => {
                self.embed(&mut record).await;
                self.deduplicator
                    .similar_match(&record)
                    .await?
                    .unwrap_or(DedupDecision::New)
            }
        };

        match decision {
            DedupDecision::Duplicate { identifier, loaded } => {
                if !loaded {
                    self.add_owners(&identifier, &record).await?;
                }
                debug!(record = %record.identifier, existing = %identifier, "Duplicate");
                Ok(RecordOutcome::Duplicate)
            }
            DedupDecision::MergeInto(mut existing) => {
                if deep_merge(&mut existing, &record) {
                    let updated = retry_on_lock("update_record", self.max_lock_wait_ms, || {
                        import_records::update_record(&self.pool, &existing)
                    })
                    .await?;
                    if !updated {
                        debug!(
                            record = %record.identifier,
                            existing = %existing.identifier,
                            "Merge target was loaded meanwhile, treating as duplicate"
                        );
                        return Ok(RecordOutcome::Duplicate);
                    }
                }
                debug!(record = %record.identifier, into = %existing.identifier, "Merged");
                Ok(RecordOutcome::Merged {
                    into: existing.identifier,
                })
            }
            DedupDecision::SimilarTo { identifier, similarity } => {
                debug!(record = %record.identifier, of = %identifier, similarity, "Similar record stored, dropping");
                Ok(RecordOutcome::SimilarDuplicate {
                    of: identifier,
                    similarity,
                })
            }
            DedupDecision::New => {
                let inserted = retry_on_lock("insert_record", self.max_lock_wait_ms, || {
                    import_records::insert_record(&self.pool, &record)
                })
                .await?;
                if inserted {
                    debug!(record = %record.identifier, "Created");
                    Ok(RecordOutcome::Created)
                } else {
                    // A concurrent harvest stored the same identifier first
                    self.add_owners(&record.identifier, &record).await?;
                    Ok(RecordOutcome::Duplicate)
                }
            }
        }
    }

    async fn add_owners(&self, identifier: &str, record: &ImportRecord) -> Result<()> {
        let owners = record.owners();
        retry_on_lock("add_owners", self.max_lock_wait_ms, || {
            import_records::add_owners(&self.pool, identifier, &owners)
        })
        .await
    }

    async fn embed(&self, record: &mut ImportRecord) {
        if record.embedding.is_some() {
            return;
        }
        match self.embedder.embed(&record.flatten_for_embedding()).await {
            Ok(embedding) => record.embedding = embedding,
            Err(e) => warn!(
                record = %record.identifier,
                error = %e,
                "Embedding failed, skipping similarity check"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MultilingualContent, PersonName, PersonStub, PublicationType, RecordSource};
    use crate::services::attribution::UserMatch;
    use crate::services::embedding::{DisabledEmbedder, EmbeddingError};
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;

    struct NoUsers;

    #[async_trait]
    impl UserDirectory for NoUsers {
        async fn find_by_external_author_id(&self, _person: &PersonStub) -> Result<Option<UserMatch>> {
            Ok(None)
        }
        async fn search_by_name(&self, _name: &PersonName) -> Result<Option<UserMatch>> {
            Ok(None)
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> std::result::Result<Option<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::NetworkError("connection refused".to_string()))
        }
    }

    async fn pipeline(embedder: Arc<dyn Embedder>) -> RecordPipeline {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        biblio_common::db::init_schema(&pool).await.unwrap();
        RecordPipeline::new(pool, Arc::new(NoUsers), embedder)
    }

    fn record(identifier: &str) -> ImportRecord {
        let mut record = ImportRecord::new(
            identifier,
            RecordSource::OpenAlex,
            PublicationType::JournalPublication,
        );
        record.title.push(MultilingualContent::new("EN", "Pipelines", 1));
        record
    }

    #[tokio::test]
    async fn test_unattributed_record_is_discarded() {
        let pipeline = pipeline(Arc::new(DisabledEmbedder)).await;
        let outcome = pipeline.process(record("OPENALEX:W1"), None).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Discarded);
        assert!(import_records::find_by_identifier(&pipeline.pool, "OPENALEX:W1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_reharvest_is_duplicate_and_unions_owners() {
        let pipeline = pipeline(Arc::new(DisabledEmbedder)).await;
        let first = pipeline.process(record("OPENALEX:W1"), Some(Owner::User(1))).await.unwrap();
        assert_eq!(first, RecordOutcome::Created);

        let second = pipeline.process(record("OPENALEX:W1"), Some(Owner::User(2))).await.unwrap();
        assert_eq!(second, RecordOutcome::Duplicate);

        let stored = import_records::find_by_identifier(&pipeline.pool, "OPENALEX:W1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.owners(), vec![Owner::User(1), Owner::User(2)]);
    }

    #[tokio::test]
    async fn test_embedder_failure_does_not_fail_record() {
        let pipeline = pipeline(Arc::new(FailingEmbedder)).await;
        let outcome = pipeline.process(record("OPENALEX:W7"), Some(Owner::Institution(3))).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Created);
    }
}
