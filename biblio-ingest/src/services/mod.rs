//! Harvesting services
//!
//! - Attribution, embeddings, deduplication and deep merge
//! - Record pipeline shared by harvests and file uploads
//! - Harvest sources, coordinator and background jobs
//! - Scheduler and startup restore of scheduled harvests

pub mod attribution;
pub mod deduplicator;
pub mod deep_merge;
pub mod embedding;
pub mod fetchers;
pub mod harvest_coordinator;
pub mod harvest_jobs;
pub mod record_pipeline;
pub mod scheduler;

pub use attribution::{UserDirectory, UserMatch};
pub use deduplicator::{DedupDecision, Deduplicator, SIMILARITY_THRESHOLD};
pub use deep_merge::deep_merge;
pub use embedding::{DisabledEmbedder, Embedder, HttpEmbedder};
pub use fetchers::{FetchedPage, HarvestSource, JsonApiSource, OaiPmhSource, PageCursor};
pub use harvest_coordinator::HarvestCoordinator;
pub use harvest_jobs::{ConfiguredSources, HarvestJob, HarvestJobState, HarvestLauncher, SourceFactory};
pub use record_pipeline::RecordPipeline;
pub use scheduler::{
    Recurrence, ScheduledHarvestRestorer, ScheduledTask, Scheduler, TaskRunner, TokioScheduler,
    HARVEST_TASK_TYPE,
};
