use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::state::SharedState;
use crate::storage::{now_millis, FileStore, StoreKey};

use super::client::{self, ContentService};
use super::config::{SyncConfig, SyncOutcome, SyncPhase, SyncStatus};
use super::snapshot;

/// Messages to control the sync scheduler
#[derive(Debug)]
pub enum SchedulerMessage {
    /// Local state was mutated — schedule a debounced durable write
    LocalMutation,
    /// Manual "sync now": pull then push, one aggregate outcome
    SyncNow,
    /// Application regained foreground visibility — pull immediately
    Visible,
    /// App closing — final persist and best-effort push
    Shutdown,
}

/// Handle for the running sync scheduler
pub struct SyncScheduler {
    sender: mpsc::Sender<SchedulerMessage>,
    status: watch::Receiver<SyncStatus>,
}

impl SyncScheduler {
    /// Notify the scheduler that local state changed. Repeated calls within
    /// the debounce window collapse into a single durable write.
    pub fn local_mutation(&self) {
        let _ = self.sender.try_send(SchedulerMessage::LocalMutation);
    }

    /// Trigger a full sync cycle now.
    pub fn sync_now(&self) {
        let _ = self.sender.try_send(SchedulerMessage::SyncNow);
    }

    /// Notify the scheduler the app regained foreground visibility.
    pub fn visible(&self) {
        let _ = self.sender.try_send(SchedulerMessage::Visible);
    }

    /// Shut down the scheduler.
    pub fn shutdown(&self) {
        let _ = self.sender.try_send(SchedulerMessage::Shutdown);
    }

    /// Subscribe to scheduler status updates.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleKind {
    Pull,
    Push,
    Manual,
}

/// Shared sync machinery: the scheduler loop and spawned cycles both hold an
/// `Arc` of this.
struct SyncEngine {
    state: SharedState,
    store: Arc<FileStore>,
    service: Arc<dyn ContentService>,
    config: SyncConfig,
    device_id: String,
    /// In-flight guard: at most one sync cycle runs at a time.
    in_flight: AtomicBool,
    status: watch::Sender<SyncStatus>,
}

impl SyncEngine {
    fn try_begin(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn end_cycle(&self) {
        self.set_phase(SyncPhase::Idle);
        self.in_flight.store(false, Ordering::SeqCst);
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.status.send_modify(|status| status.phase = phase);
    }

    fn publish_outcome(&self, outcome: SyncOutcome) {
        self.status.send_modify(|status| {
            if outcome.success {
                status.last_sync = Some(now_millis());
            }
            // Only a completed pull may update the remote-change hint; a
            // push cycle publishing its outcome must not clear it before
            // the UI has polled.
            if outcome.pulled {
                status.remote_changed = outcome.remote_changed;
            }
            status.last_outcome = Some(outcome);
        });
    }

    fn session_active(&self) -> bool {
        self.state.lock().unwrap().current_user.is_some()
    }

    /// Debounced durable write: flush the current state to the store.
    fn persist_now(&self) {
        let result = self.state.lock().unwrap().persist(&self.store);
        match result {
            Ok(()) => {
                self.status.send_modify(|status| status.persists += 1);
                log::debug!("Debounced write flushed to store");
            }
            Err(e) => log::error!("Durable write failed: {}", e),
        }
    }

    /// Run one guarded sync cycle. Periodic cycles are skipped silently when
    /// another cycle is in flight or no session is active; a manual cycle
    /// reports the skip so the caller can notify the user.
    async fn run_cycle(&self, kind: CycleKind) {
        if !self.session_active() {
            if kind == CycleKind::Manual {
                self.publish_outcome(SyncOutcome::failure("no active session".to_string()));
            } else {
                log::debug!("No active session, skipping {:?} cycle", kind);
            }
            return;
        }
        if !self.try_begin() {
            log::debug!("Sync already in flight, skipping {:?} cycle", kind);
            if kind == CycleKind::Manual {
                self.publish_outcome(SyncOutcome::skipped());
            }
            return;
        }

        let started = Instant::now();
        let mut outcome = match kind {
            CycleKind::Pull => self.pull_cycle().await,
            CycleKind::Push => {
                let pushed = self.push_cycle().await;
                SyncOutcome {
                    success: true,
                    pushed,
                    ..SyncOutcome::default()
                }
            }
            CycleKind::Manual => {
                let mut outcome = self.pull_cycle().await;
                // Push runs even after a failed pull; the aggregate result
                // still reports the pull failure.
                outcome.pushed = self.push_cycle().await;
                outcome
            }
        };
        outcome.duration_ms = started.elapsed().as_millis() as u64;

        if let Some(ref error) = outcome.error {
            log::warn!("{:?} cycle failed: {} — continuing offline", kind, error);
        } else {
            log::info!(
                "{:?} cycle complete — fetched={}, absorbed={}, pushed={}, remote_changed={}",
                kind,
                outcome.fetched,
                outcome.absorbed,
                outcome.pushed,
                outcome.remote_changed,
            );
        }
        self.publish_outcome(outcome);
        self.end_cycle();
    }

    /// Pull phase: one network read, then fold results into the *current*
    /// state under the lock. Network failure leaves local state untouched.
    async fn pull_cycle(&self) -> SyncOutcome {
        self.set_phase(SyncPhase::Pulling);

        // No state lock is held across the network call.
        let items = match self.service.fetch_content().await {
            Ok(items) => items,
            Err(e) => return SyncOutcome::failure(e.to_string()),
        };

        self.set_phase(SyncPhase::Merging);
        let (absorbed, mirrored) = {
            // Re-acquire current state at merge time; a mutation made while
            // the request was in flight is merged against, not overwritten.
            let mut state = self.state.lock().unwrap();
            let absorbed = client::absorb_content(&mut state, &items);
            let mirrored = snapshot::absorb_if_newer(&mut state, &self.store, &self.device_id);
            if absorbed > 0 || mirrored {
                // Silent write-through; no UI refresh is forced.
                if let Err(e) = state.persist(&self.store) {
                    log::error!("Persisting merged state failed: {}", e);
                }
            }
            (absorbed, mirrored)
        };

        if let Err(e) = self.store.set(StoreKey::LastSync, &now_millis().to_string()) {
            log::warn!("Recording sync timestamp failed: {}", e);
        }

        SyncOutcome {
            success: true,
            pulled: true,
            fetched: items.len(),
            absorbed,
            remote_changed: absorbed > 0 || mirrored,
            ..SyncOutcome::default()
        }
    }

    /// Push phase: best-effort upload of the current user's progress, then
    /// refresh the mirror snapshot. Individual failures are logged and
    /// swallowed.
    async fn push_cycle(&self) -> usize {
        self.set_phase(SyncPhase::Pushing);

        let uploads = {
            let state = self.state.lock().unwrap();
            match state.current_user.as_deref() {
                Some(user_id) => client::progress_uploads_for(&state, user_id),
                None => Vec::new(),
            }
        };

        let mut pushed = 0;
        for upload in &uploads {
            match self.service.push_progress(upload).await {
                Ok(()) => pushed += 1,
                Err(e) => {
                    log::debug!("Progress push failed for '{}': {}", upload.chapter, e);
                }
            }
        }

        {
            let state = self.state.lock().unwrap();
            if let Err(e) = snapshot::write_snapshot(&self.store, &state, &self.device_id) {
                log::warn!("Mirror snapshot write failed: {}", e);
            }
        }
        pushed
    }
}

/// Start the sync scheduler.
///
/// Spawns an async loop that debounces local persistence, runs periodic
/// pull/push cycles while a session is active, and serves manual triggers
/// and lifecycle hooks.
pub fn start_scheduler(
    state: SharedState,
    store: Arc<FileStore>,
    service: Arc<dyn ContentService>,
    config: SyncConfig,
) -> SyncScheduler {
    let (tx, rx) = mpsc::channel(32);
    let (status_tx, status_rx) = watch::channel(SyncStatus::default());

    let device_id = store.ensure_device_id().unwrap_or_else(|e| {
        log::warn!("Device id unavailable: {}", e);
        "device-unknown".to_string()
    });

    let engine = Arc::new(SyncEngine {
        state,
        store,
        service,
        config,
        device_id,
        in_flight: AtomicBool::new(false),
        status: status_tx,
    });

    tokio::spawn(scheduler_loop(engine, rx));

    SyncScheduler {
        sender: tx,
        status: status_rx,
    }
}

/// Main scheduler loop
async fn scheduler_loop(engine: Arc<SyncEngine>, mut receiver: mpsc::Receiver<SchedulerMessage>) {
    log::info!(
        "Sync scheduler started (debounce {}ms, pull {}s, push {}s, remote {})",
        engine.config.debounce_ms,
        engine.config.pull_interval_secs,
        engine.config.push_interval_secs,
        if engine.config.enabled { "enabled" } else { "disabled" },
    );

    let debounce = Duration::from_millis(engine.config.debounce_ms.max(1));
    // Single-slot pending-write deadline; rearmed on every mutation.
    let mut pending_write: Option<tokio::time::Instant> = None;

    let mut pull_tick =
        tokio::time::interval(Duration::from_secs(engine.config.pull_interval_secs.max(1)));
    pull_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut push_tick =
        tokio::time::interval(Duration::from_secs(engine.config.push_interval_secs.max(1)));
    push_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Both intervals fire immediately on the first tick; the pull doubles as
    // the startup sync, the push as the startup mirror write.

    loop {
        let write_deadline = pending_write
            .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            _ = tokio::time::sleep_until(write_deadline), if pending_write.is_some() => {
                pending_write = None;
                engine.persist_now();
            }

            _ = pull_tick.tick(), if engine.config.enabled => {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.run_cycle(CycleKind::Pull).await });
            }

            _ = push_tick.tick(), if engine.config.enabled => {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.run_cycle(CycleKind::Push).await });
            }

            msg = receiver.recv() => {
                match msg {
                    Some(SchedulerMessage::LocalMutation) => {
                        pending_write = Some(tokio::time::Instant::now() + debounce);
                    }
                    Some(SchedulerMessage::SyncNow) => {
                        log::info!("Manual sync requested");
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move { engine.run_cycle(CycleKind::Manual).await });
                    }
                    Some(SchedulerMessage::Visible) => {
                        log::info!("App became visible, pulling");
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move { engine.run_cycle(CycleKind::Pull).await });
                    }
                    Some(SchedulerMessage::Shutdown) | None => {
                        log::info!("Sync scheduler: shutting down");
                        if pending_write.take().is_some() {
                            engine.persist_now();
                        }
                        if engine.config.enabled {
                            // Final push is best-effort; a cycle already in
                            // flight wins the guard and this one is skipped.
                            engine.run_cycle(CycleKind::Push).await;
                        }
                        break;
                    }
                }
            }
        }
    }
}
