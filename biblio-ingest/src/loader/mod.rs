//! Loader wizard and entity resolution
//!
//! Human-paced, one-record-at-a-time review of harvested records that are
//! not loaded yet, plus exactly-once creation of the entities they refer to.

pub mod create_request;
pub mod entity_resolver;
pub mod wizard;

use thiserror::Error;

pub use create_request::{
    build_create_request, journal_stub, ContributionPreview, CreateRequest, DocumentFields,
    InstitutionPreview, LoadPreview,
};
pub use entity_resolver::{EntityResolver, EntityStore, JournalStub};
pub use wizard::LoaderWizard;

/// Loader wizard errors
#[derive(Debug, Error)]
pub enum LoaderError {
    /// No cursor stored for this owner: `next` was never called or review wrapped
    #[error("No record is under review")]
    NoActiveRecord,

    #[error("Import record not found: {0}")]
    NotFound(String),

    /// Double submission of the same record
    #[error("Import record already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Storage(#[from] biblio_common::Error),
}
