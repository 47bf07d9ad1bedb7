//! Offline-first learning platform core.
//!
//! Local state is always authoritative for the current session; a scheduler
//! debounces durable writes and opportunistically reconciles against a
//! remote content service and a shared mirror snapshot. The UI layer is an
//! external collaborator: it mutates [`AppState`], signals the scheduler,
//! and watches the sync status channel.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub mod state;
pub mod storage;
pub mod sync;

pub use state::{AppState, NewUser, SharedState, StateError};
pub use storage::{FileStore, StorageError, StoreKey};
pub use sync::{ContentService, RemoteClient, SyncConfig, SyncScheduler, SyncStatus};

/// A running application core: shared state, durable store, and the sync
/// scheduler driving both.
pub struct App {
    pub state: SharedState,
    pub store: Arc<FileStore>,
    pub scheduler: SyncScheduler,
}

impl App {
    /// Initialize the core against a data directory: load persisted
    /// collections (falling back to defaults on parse failure), install
    /// first-run seed data, and start the sync scheduler.
    pub fn init(
        data_dir: PathBuf,
        config: SyncConfig,
        service: Arc<dyn ContentService>,
    ) -> Result<Self, StorageError> {
        let store = FileStore::new(data_dir);
        store.init()?;

        let mut state = AppState::load(&store);
        if state::seed::ensure_seed_data(&mut state) {
            state.persist(&store)?;
        }

        let store = Arc::new(store);
        let state = Arc::new(Mutex::new(state));
        let scheduler = sync::start_scheduler(
            Arc::clone(&state),
            Arc::clone(&store),
            service,
            config,
        );

        Ok(Self {
            state,
            store,
            scheduler,
        })
    }

    /// Initialize against the default platform data directory.
    pub fn init_default(
        config: SyncConfig,
        service: Arc<dyn ContentService>,
    ) -> Result<Self, StorageError> {
        Self::init(FileStore::default_data_dir()?, config, service)
    }

    /// Best-effort teardown: final push and persist, then scheduler exit.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
