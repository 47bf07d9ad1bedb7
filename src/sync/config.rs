use serde::{Deserialize, Serialize};

/// Scheduler tuning. Defaults follow the small-dataset, chatty-UI profile:
/// quick debounce, pulls every 15s, pushes every 30s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Whether remote sync is enabled at all. Local persistence always runs.
    pub enabled: bool,
    /// Quiet period after a local mutation before the durable write.
    pub debounce_ms: u64,
    /// Interval between periodic remote pulls.
    pub pull_interval_secs: u64,
    /// Interval between periodic progress pushes.
    pub push_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
            pull_interval_secs: 15,
            push_interval_secs: 30,
        }
    }
}

/// Phase of the current sync cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Pulling,
    Merging,
    Pushing,
}

/// Result of one sync cycle, reported through the status channel.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub success: bool,
    /// Whether this cycle included a completed pull. Only such cycles are
    /// allowed to update the `remote_changed` hint.
    pub pulled: bool,
    /// Content items fetched from the remote service.
    pub fetched: usize,
    /// Chapters appended by the additive content reconciliation.
    pub absorbed: usize,
    /// Progress records pushed.
    pub pushed: usize,
    /// Whether the merge changed local state (UI may want to refresh).
    pub remote_changed: bool,
    /// True when the cycle was skipped because another was in flight.
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl SyncOutcome {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::default()
        }
    }
}

/// Observable scheduler state, published on a watch channel. Pulls are
/// silent: the UI layer reads `remote_changed` and decides when to refresh,
/// and is never forced to re-render mid-task.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// Millisecond timestamp of the last completed cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<i64>,
    /// Outcome of the most recent cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<SyncOutcome>,
    /// Count of debounced durable writes performed this session.
    pub persists: u64,
    /// Set when a merge changed local state. Updated by each completed
    /// pull; push-only cycles and failed pulls leave it untouched so a
    /// polling UI cannot miss the hint.
    pub remote_changed: bool,
}
