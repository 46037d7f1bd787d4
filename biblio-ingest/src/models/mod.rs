//! Data models for biblio-ingest
//!
//! - Canonical import record shared by every source adapter
//! - Owners (users, institutions) and progress dataset keys
//! - Harvest task parameters, outcomes and the harvest error taxonomy

pub mod harvest;
pub mod import_record;
pub mod owner;

pub use harvest::{
    HarvestError, HarvestReport, HarvestTaskParameters, RecordOutcome, SourceKind,
};
pub use import_record::{
    normalize_doi, normalize_text, Contribution, ContributionRole, EventStub, ImportRecord,
    InstitutionStub, MultilingualContent, PersonName, PersonStub, PublicationType, RecordSource,
};
pub use owner::{DatasetKey, Owner};
