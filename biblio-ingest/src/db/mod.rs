//! Database access for biblio-ingest
//!
//! Schema creation lives in `biblio_common::db`; these modules are the
//! per-table accessors used by the harvesting pipeline.

pub mod entities;
pub mod import_records;
pub mod progress;
pub mod scheduled_tasks;
pub mod settings;
