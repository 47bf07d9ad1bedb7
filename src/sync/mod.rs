pub mod client;
pub mod config;
pub mod merge;
pub mod snapshot;

mod scheduler;

pub use client::{
    absorb_content, content_item_for, progress_uploads_for, publish_chapter, ContentItem,
    ContentService, ProgressUpload, RemoteClient, SyncError,
};
pub use config::{SyncConfig, SyncOutcome, SyncPhase, SyncStatus};
pub use merge::{merge_classes, merge_collections, merge_progress, merge_snapshot};
pub use scheduler::{start_scheduler, SchedulerMessage, SyncScheduler};
pub use snapshot::{CloudSnapshot, SnapshotData, SnapshotMeta};
