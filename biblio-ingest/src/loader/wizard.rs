//! Loader wizard
//!
//! Walks one owner's unloaded records in identifier order. The identifier
//! of the record under review is the owner's `LOADER` progress cursor, so
//! review survives restarts and parallel reviewers never share a cursor.
//!
//! - `next`: first unloaded record at or after the cursor, as a preview
//! - `skip`: move strictly past the current record; past the end the
//!   cursor is cleared and review wraps around
//! - `mark_loaded`: flag the current record loaded; a second call for the
//!   same cursor reports `AlreadyLoaded`

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use super::create_request::{
    build_create_request, ContributionPreview, CreateRequest, InstitutionPreview, LoadPreview,
};
use super::{EntityResolver, LoaderError};
use crate::db::import_records;
use crate::db::progress::ProgressStore;
use crate::models::{DatasetKey, ImportRecord, Owner};

#[derive(Clone)]
pub struct LoaderWizard {
    pool: SqlitePool,
    progress: ProgressStore,
    resolver: Arc<EntityResolver>,
}

impl LoaderWizard {
    pub fn new(pool: SqlitePool, resolver: Arc<EntityResolver>) -> Self {
        Self {
            progress: ProgressStore::new(pool.clone()),
            pool,
            resolver,
        }
    }

    pub fn resolver(&self) -> &Arc<EntityResolver> {
        &self.resolver
    }

    async fn cursor(&self, owner: &Owner) -> Result<Option<String>, LoaderError> {
        Ok(self.progress.get(&DatasetKey::loader(), owner).await?)
    }

    /// Record under review, or `None` when nothing is left
    pub async fn next(&self, owner: &Owner) -> Result<Option<LoadPreview>, LoaderError> {
        let cursor = self.cursor(owner).await?;
        let record =
            import_records::next_unloaded(&self.pool, owner, cursor.as_deref(), true).await?;

        match record {
            Some(record) => {
                if cursor.as_deref() != Some(record.identifier.as_str()) {
                    self.progress
                        .set(&DatasetKey::loader(), owner, &record.identifier)
                        .await?;
                }
                Ok(Some(self.preview(&record).await?))
            }
            None => Ok(None),
        }
    }

    /// Move past the record under review; returns the new current identifier
    pub async fn skip(&self, owner: &Owner) -> Result<Option<String>, LoaderError> {
        let current = self.cursor(owner).await?.ok_or(LoaderError::NoActiveRecord)?;
        let next = import_records::next_unloaded(&self.pool, owner, Some(&current), false).await?;

        match next {
            Some(record) => {
                self.progress
                    .set(&DatasetKey::loader(), owner, &record.identifier)
                    .await?;
                Ok(Some(record.identifier))
            }
            None => {
                self.progress.clear(&DatasetKey::loader(), owner).await?;
                Ok(None)
            }
        }
    }

    /// Flag the record under review as loaded into the primary domain
    pub async fn mark_loaded(&self, owner: &Owner) -> Result<String, LoaderError> {
        let current = self.cursor(owner).await?.ok_or(LoaderError::NoActiveRecord)?;
        let record = import_records::find_by_identifier(&self.pool, &current)
            .await?
            .ok_or_else(|| LoaderError::NotFound(current.clone()))?;
        if record.loaded {
            return Err(LoaderError::AlreadyLoaded(current));
        }

        if !import_records::mark_loaded(&self.pool, &current).await? {
            return Err(LoaderError::AlreadyLoaded(current));
        }
        info!(owner = %owner, identifier = %current, "Import record loaded");
        Ok(current)
    }

    /// Forget the owner's position; the next `next` starts from the beginning
    pub async fn reset(&self, owner: &Owner) -> Result<(), LoaderError> {
        self.progress.clear(&DatasetKey::loader(), owner).await?;
        Ok(())
    }

    pub async fn remaining(&self, owner: &Owner) -> Result<i64, LoaderError> {
        Ok(import_records::count_unloaded(&self.pool, owner).await?)
    }

    /// Create request plus the ids of entities that already exist
    async fn preview(&self, record: &ImportRecord) -> Result<LoadPreview, LoaderError> {
        let mut request = build_create_request(record);
        match &mut request {
            CreateRequest::JournalPublication { journal, journal_id, .. } => {
                *journal_id = self.resolver.find_journal(journal).await?;
            }
            CreateRequest::ProceedingsPublication { event: Some(event), event_id, .. } => {
                *event_id = self.resolver.find_event(event).await?;
            }
            _ => {}
        }

        let mut contributions = Vec::with_capacity(record.contributions.len());
        for contribution in &record.contributions {
            let mut institutions = Vec::with_capacity(contribution.institutions.len());
            for stub in &contribution.institutions {
                institutions.push(InstitutionPreview {
                    institution_id: self.resolver.find_institution(stub).await?,
                    stub: stub.clone(),
                });
            }
            contributions.push(ContributionPreview {
                order_number: contribution.order_number,
                role: contribution.role,
                is_corresponding: contribution.is_corresponding,
                person_id: self.resolver.find_person(&contribution.person).await?,
                person: contribution.person.clone(),
                institutions,
            });
        }

        Ok(LoadPreview {
            identifier: record.identifier.clone(),
            request,
            contributions,
        })
    }
}
