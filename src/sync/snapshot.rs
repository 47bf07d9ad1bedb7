//! Full-state mirror snapshot.
//!
//! Every collection plus metadata about which device wrote it, serialized to
//! the `cloud-snapshot` store key. Peer devices sharing the store location
//! exchange state through this snapshot; a pull folds a newer snapshot into
//! the live state through the merge engine.

use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::storage::{
    now_millis, Chapter, FileStore, LiveClass, Note, ProgressMap, Question, StoreKey, Subject,
    User, Video,
};

use super::merge;

/// All collections. Every field defaults so a wrong-shaped or truncated
/// snapshot degrades to empty collections instead of failing the merge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotData {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub videos: Vec<Video>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub live_classes: Vec<LiveClass>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub progress: ProgressMap,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    /// Millisecond timestamp of the write.
    #[serde(default)]
    pub last_updated: i64,
    /// User id responsible for the write, or "system".
    #[serde(default)]
    pub updated_by: String,
    #[serde(default)]
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CloudSnapshot {
    pub data: SnapshotData,
    pub metadata: SnapshotMeta,
}

impl CloudSnapshot {
    pub fn capture(state: &AppState, device_id: &str) -> Self {
        Self {
            data: SnapshotData {
                users: state.users.clone(),
                subjects: state.subjects.clone(),
                chapters: state.chapters.clone(),
                videos: state.videos.clone(),
                questions: state.questions.clone(),
                notes: state.notes.clone(),
                live_classes: state.live_classes.clone(),
                classes: state.classes.clone(),
                progress: state.progress.clone(),
            },
            metadata: SnapshotMeta {
                last_updated: now_millis(),
                updated_by: state
                    .current_user
                    .clone()
                    .unwrap_or_else(|| "system".to_string()),
                device_id: device_id.to_string(),
            },
        }
    }
}

/// Write the current state as the mirror snapshot.
pub fn write_snapshot(
    store: &FileStore,
    state: &AppState,
    device_id: &str,
) -> crate::storage::Result<()> {
    let snapshot = CloudSnapshot::capture(state, device_id);
    let raw = serde_json::to_string(&snapshot)?;
    store.set(StoreKey::CloudSnapshot, &raw)?;
    log::debug!(
        "Mirror snapshot written by {} ({} users, {} chapters)",
        device_id,
        snapshot.data.users.len(),
        snapshot.data.chapters.len(),
    );
    Ok(())
}

/// Read the mirror snapshot if one exists. A malformed snapshot is treated
/// as absent.
pub fn read_snapshot(store: &FileStore) -> Option<CloudSnapshot> {
    let raw = store.get(StoreKey::CloudSnapshot)?;
    match serde_json::from_str(&raw) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            log::warn!("Discarding malformed mirror snapshot: {}", e);
            None
        }
    }
}

/// Fold the mirror snapshot into the live state if it is newer than our last
/// durable write and came from another device. Returns true when a merge was
/// applied.
pub fn absorb_if_newer(state: &mut AppState, store: &FileStore, device_id: &str) -> bool {
    let Some(snapshot) = read_snapshot(store) else {
        return false;
    };
    if snapshot.metadata.device_id == device_id {
        return false;
    }

    let local_last_update: i64 = store
        .get(StoreKey::LastUpdate)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0);
    if snapshot.metadata.last_updated <= local_last_update {
        return false;
    }

    log::info!(
        "Merging newer mirror snapshot from device {}",
        snapshot.metadata.device_id
    );
    merge::merge_snapshot(state, &snapshot.data);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::seed;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        store.init().unwrap();
        (dir, store)
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let (_dir, store) = store();
        let mut state = AppState::new();
        seed::ensure_seed_data(&mut state);

        write_snapshot(&store, &state, "device-a").unwrap();
        let snapshot = read_snapshot(&store).unwrap();
        assert_eq!(snapshot.data.users.len(), 2);
        assert_eq!(snapshot.metadata.device_id, "device-a");
        assert_eq!(snapshot.metadata.updated_by, "system");
    }

    #[test]
    fn test_own_snapshot_is_not_reabsorbed() {
        let (_dir, store) = store();
        let mut state = AppState::new();
        seed::ensure_seed_data(&mut state);
        write_snapshot(&store, &state, "device-a").unwrap();

        assert!(!absorb_if_newer(&mut state, &store, "device-a"));
    }

    #[test]
    fn test_newer_peer_snapshot_is_absorbed_once() {
        let (_dir, store) = store();
        let mut peer = AppState::new();
        seed::ensure_seed_data(&mut peer);
        write_snapshot(&store, &peer, "device-b").unwrap();

        let mut state = AppState::new();
        assert!(absorb_if_newer(&mut state, &store, "device-a"));
        assert_eq!(state.users.len(), 2);
        assert_eq!(state.classes.len(), 5);

        // After persisting the merge, the same snapshot is stale
        state.persist(&store).unwrap();
        assert!(!absorb_if_newer(&mut state, &store, "device-a"));
    }

    #[test]
    fn test_malformed_snapshot_treated_as_absent() {
        let (_dir, store) = store();
        store.set(StoreKey::CloudSnapshot, "{\"data\": 12}").unwrap();
        let mut state = AppState::new();
        assert!(!absorb_if_newer(&mut state, &store, "device-a"));
    }
}
