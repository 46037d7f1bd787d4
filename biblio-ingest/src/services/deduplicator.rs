//! Deduplication engine
//!
//! **Decision order (first match wins):**
//! 1. Same identifier already stored: duplicate, idempotent re-harvest
//! 2. Stored record sharing the DOI or metadata key: merge candidate,
//!    enrich it instead of creating a second record
//! 3. Stored embedding above [`SIMILARITY_THRESHOLD`]: duplicate, dropped
//!    without merging (a similarity match is not trusted enough to copy
//!    fields across)
//! 4. Otherwise new
//!
//! A merge candidate that is already loaded counts as a duplicate, since
//! loaded records are immutable history.

use biblio_common::Result;
use sqlx::SqlitePool;
use tracing::debug;

use super::embedding::cosine_similarity;
use crate::db::import_records;
use crate::models::ImportRecord;

/// Cosine similarity above which two records are the same work
pub const SIMILARITY_THRESHOLD: f32 = 0.95;

/// Stored embeddings compared per incoming record
pub const MAX_SIMILARITY_CANDIDATES: i64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub enum DedupDecision {
    /// `identifier` is already stored (or is the loaded record matched by DOI)
    Duplicate { identifier: String, loaded: bool },
    /// Unloaded record matched by DOI or metadata key
    MergeInto(Box<ImportRecord>),
    /// Embedding match against a stored record
    SimilarTo { identifier: String, similarity: f32 },
    New,
}

/// Identifier / embedding duplicate test for one candidate
///
/// An existing record with the same identifier is always a duplicate;
/// otherwise both embeddings must be present and exceed the threshold.
pub fn is_duplicate(
    existing_by_identifier: Option<&ImportRecord>,
    new_embedding: Option<&[f32]>,
    candidate_embedding: Option<&[f32]>,
) -> bool {
    if existing_by_identifier.is_some() {
        return true;
    }
    match (new_embedding, candidate_embedding) {
        (Some(new), Some(candidate)) => {
            cosine_similarity(new, candidate).map_or(false, |s| s > SIMILARITY_THRESHOLD)
        }
        _ => false,
    }
}

/// Most similar candidate above the threshold
pub fn most_similar<'a>(
    embedding: &[f32],
    candidates: &'a [(String, Vec<f32>)],
) -> Option<(&'a str, f32)> {
    candidates
        .iter()
        .filter_map(|(identifier, stored)| {
            cosine_similarity(embedding, stored).map(|s| (identifier.as_str(), s))
        })
        .filter(|(_, similarity)| *similarity > SIMILARITY_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

#[derive(Clone)]
pub struct Deduplicator {
    pool: SqlitePool,
}

impl Deduplicator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Full decision for a record whose embedding (if any) is already set
    pub async fn decide(&self, record: &ImportRecord) -> Result<DedupDecision> {
        if let Some(decision) = self.exact_match(record).await? {
            return Ok(decision);
        }
        Ok(self.similar_match(record).await?.unwrap_or(DedupDecision::New))
    }

    /// Steps 1 and 2: identifier, then DOI / metadata key
    pub async fn exact_match(&self, record: &ImportRecord) -> Result<Option<DedupDecision>> {
        if let Some(existing) = import_records::find_by_identifier(&self.pool, &record.identifier).await? {
            return Ok(Some(DedupDecision::Duplicate {
                identifier: existing.identifier,
                loaded: existing.loaded,
            }));
        }

        let metadata_key = record.metadata_key();
        let candidate = import_records::find_merge_candidate(
            &self.pool,
            record.doi.as_deref(),
            metadata_key.as_deref(),
        )
        .await?;
        let Some(candidate) = candidate else {
            return Ok(None);
        };

        debug!(
            record = %record.identifier,
            candidate = %candidate.identifier,
            loaded = candidate.loaded,
            "DOI/metadata match"
        );
        if candidate.loaded {
            return Ok(Some(DedupDecision::Duplicate {
                identifier: candidate.identifier,
                loaded: true,
            }));
        }
        Ok(Some(DedupDecision::MergeInto(Box::new(candidate))))
    }

    /// Step 3: embedding similarity; `None` without an embedding
    pub async fn similar_match(&self, record: &ImportRecord) -> Result<Option<DedupDecision>> {
        let Some(embedding) = record.embedding.as_deref() else {
            return Ok(None);
        };
        let candidates = import_records::similarity_candidates(
            &self.pool,
            record.publication_year(),
            MAX_SIMILARITY_CANDIDATES,
        )
        .await?;
        Ok(most_similar(embedding, &candidates).map(|(identifier, similarity)| {
            DedupDecision::SimilarTo {
                identifier: identifier.to_string(),
                similarity,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MultilingualContent, Owner, PublicationType, RecordSource};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        biblio_common::db::init_schema(&pool).await.unwrap();
        pool
    }

    fn record(identifier: &str, title: &str) -> ImportRecord {
        let mut record = ImportRecord::new(
            identifier,
            RecordSource::OpenAlex,
            PublicationType::JournalPublication,
        );
        record.title.push(MultilingualContent::new("EN", title, 1));
        record.document_date = Some("2021".to_string());
        record.add_owner(Owner::User(1));
        record
    }

    #[test]
    fn test_is_duplicate_rules() {
        let existing = record("A", "T");
        assert!(is_duplicate(Some(&existing), None, None));
        assert!(!is_duplicate(None, Some(&[1.0, 0.0]), None));
        assert!(is_duplicate(None, Some(&[1.0, 0.0]), Some(&[1.0, 0.01])));
        assert!(!is_duplicate(None, Some(&[1.0, 0.0]), Some(&[0.5, 0.5])));
    }

    #[test]
    fn test_most_similar_picks_best_above_threshold() {
        let candidates = vec![
            ("far".to_string(), vec![0.0, 1.0]),
            ("close".to_string(), vec![1.0, 0.1]),
            ("closest".to_string(), vec![1.0, 0.01]),
        ];
        let (identifier, similarity) = most_similar(&[1.0, 0.0], &candidates).unwrap();
        assert_eq!(identifier, "closest");
        assert!(similarity > SIMILARITY_THRESHOLD);
        assert_eq!(most_similar(&[0.7, 0.7], &candidates[..1]), None);
    }

    #[tokio::test]
    async fn test_decision_order() {
        let pool = test_pool().await;
        let dedup = Deduplicator::new(pool.clone());

        let mut stored = record("OPENALEX:W1", "Graph Neural Networks");
        stored.doi = Some("10.1/abc".to_string());
        stored.embedding = Some(vec![1.0, 0.0, 0.0]);
        import_records::insert_record(&pool, &stored).await.unwrap();

        assert!(matches!(
            dedup.decide(&stored).await.unwrap(),
            DedupDecision::Duplicate { ref identifier, loaded: false } if identifier == "OPENALEX:W1"
        ));

        let mut by_doi = record("SCOPUS:1", "Something else entirely");
        by_doi.doi = Some("10.1/abc".to_string());
        assert!(matches!(
            dedup.decide(&by_doi).await.unwrap(),
            DedupDecision::MergeInto(ref candidate) if candidate.identifier == "OPENALEX:W1"
        ));

        let mut similar = record("WOS:1", "A different title");
        similar.embedding = Some(vec![0.99, 0.01, 0.0]);
        assert!(matches!(
            dedup.decide(&similar).await.unwrap(),
            DedupDecision::SimilarTo { ref identifier, .. } if identifier == "OPENALEX:W1"
        ));

        let unrelated = record("WOS:2", "Unrelated work");
        assert_eq!(dedup.decide(&unrelated).await.unwrap(), DedupDecision::New);
    }

    #[tokio::test]
    async fn test_loaded_merge_candidate_is_duplicate() {
        let pool = test_pool().await;
        let mut stored = record("SCOPUS:9", "Loaded work");
        stored.doi = Some("10.9/z".to_string());
        import_records::insert_record(&pool, &stored).await.unwrap();
        import_records::mark_loaded(&pool, "SCOPUS:9").await.unwrap();

        let mut incoming = record("OPENALEX:W9", "Loaded work");
        incoming.doi = Some("10.9/z".to_string());
        let decision = Deduplicator::new(pool).decide(&incoming).await.unwrap();
        assert_eq!(
            decision,
            DedupDecision::Duplicate { identifier: "SCOPUS:9".to_string(), loaded: true }
        );
    }
}
