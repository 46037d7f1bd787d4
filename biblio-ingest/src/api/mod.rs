//! HTTP API handlers for biblio-ingest
//!
//! Harvest control, file uploads, the loader wizard and source settings.

pub mod file_import;
pub mod harvest;
pub mod health;
pub mod loader;
pub mod settings;

pub use file_import::file_import_routes;
pub use harvest::harvest_routes;
pub use health::health_routes;
pub use loader::loader_routes;
pub use settings::settings_routes;
