//! Collection merge engine.
//!
//! Reconciles a locally mutated collection against a remote copy that may
//! have been updated independently. Policy is last-writer-wins at record
//! granularity: a newer remote record replaces the whole local record, even
//! when only one field actually changed. Merge never deletes; records absent
//! remotely are kept, since deletion is an explicit operation and is never
//! inferred from absence.

use std::collections::HashMap;

use crate::state::AppState;
use crate::storage::{Identifiable, ProgressMap, Timestamped};

use super::snapshot::SnapshotData;

/// Merge a remote collection into a local one keyed by record id.
///
/// Remote-exclusive records are appended. For shared ids the remote record
/// wins only when its recency is strictly greater. Local-only records are
/// always kept.
pub fn merge_collections<T>(local: &[T], remote: &[T]) -> Vec<T>
where
    T: Identifiable + Timestamped + Clone,
{
    let index: HashMap<&str, usize> = local
        .iter()
        .enumerate()
        .map(|(position, record)| (record.id(), position))
        .collect();

    let mut merged: Vec<T> = local.to_vec();
    for record in remote {
        match index.get(record.id()) {
            None => merged.push(record.clone()),
            Some(&position) => {
                if record.recency() > local[position].recency() {
                    merged[position] = record.clone();
                }
            }
        }
    }
    merged
}

/// Class names carry no timestamp; their merge is a set union with
/// remote-first ordering.
pub fn merge_classes(local: &[String], remote: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(local.len() + remote.len());
    for name in remote.iter().chain(local.iter()) {
        if !merged.iter().any(|existing| existing == name) {
            merged.push(name.clone());
        }
    }
    merged
}

/// Key-wise progress merge. Unknown users or chapters on either side are
/// adopted wholesale. For a shared (user, chapter) the merged score is the
/// max and completion is the OR — higher achievement on one device is never
/// overwritten by a lower one from another.
pub fn merge_progress(local: &ProgressMap, remote: &ProgressMap) -> ProgressMap {
    let mut merged = local.clone();

    for (user_id, remote_chapters) in remote {
        let local_chapters = merged.entry(user_id.clone()).or_default();
        for (chapter_id, remote_entry) in remote_chapters {
            match local_chapters.get_mut(chapter_id) {
                None => {
                    local_chapters.insert(chapter_id.clone(), *remote_entry);
                }
                Some(local_entry) => {
                    local_entry.score = local_entry.score.max(remote_entry.score);
                    local_entry.completed = local_entry.completed || remote_entry.completed;
                }
            }
        }
    }
    merged
}

/// Fold a full remote snapshot into the state container. Must be called with
/// the *current* state at merge time, never a copy captured when the pull
/// started.
pub fn merge_snapshot(state: &mut AppState, data: &SnapshotData) {
    state.users = merge_collections(&state.users, &data.users);
    state.subjects = merge_collections(&state.subjects, &data.subjects);
    state.chapters = merge_collections(&state.chapters, &data.chapters);
    state.videos = merge_collections(&state.videos, &data.videos);
    state.questions = merge_collections(&state.questions, &data.questions);
    state.notes = merge_collections(&state.notes, &data.notes);
    state.live_classes = merge_collections(&state.live_classes, &data.live_classes);
    state.classes = merge_classes(&state.classes, &data.classes);
    state.progress = merge_progress(&state.progress, &data.progress);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Chapter, ChapterProgress, Difficulty, Provenance};

    fn progress_entry(completed: bool, score: u32, attempts: u32) -> ChapterProgress {
        ChapterProgress {
            completed,
            score,
            attempts,
        }
    }

    fn chapter(id: &str, title: &str, updated_at: i64) -> Chapter {
        Chapter {
            id: id.to_string(),
            subject_id: "math".to_string(),
            title: title.to_string(),
            description: String::new(),
            difficulty: Difficulty::Beginner,
            questions: 5,
            duration: 45,
            class: "8th Grade".to_string(),
            source: Provenance::Local,
            created_at: 1,
            updated_at,
        }
    }

    #[test]
    fn test_remote_exclusive_records_are_appended() {
        let local = vec![chapter("1", "Algebra", 100)];
        let remote = vec![chapter("2", "Geometry", 50)];

        let merged = merge_collections(&local, &remote);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().any(|c| c.id == "2"));
    }

    #[test]
    fn test_newer_remote_record_replaces_local() {
        let local = vec![chapter("1", "Algebra", 100)];
        let remote = vec![chapter("1", "Algebra v2", 200)];

        let merged = merge_collections(&local, &remote);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "Algebra v2");
    }

    #[test]
    fn test_recency_decides_not_value() {
        // A remote record with a "worse" payload still wins on recency.
        let mut local = chapter("1", "Algebra", 0);
        local.questions = 50;
        local.updated_at = 100;
        let mut remote = chapter("1", "Algebra", 0);
        remote.questions = 40;
        remote.updated_at = 200;

        let merged = merge_collections(&[local], &[remote]);
        assert_eq!(merged[0].questions, 40);
    }

    #[test]
    fn test_equal_recency_keeps_local() {
        let local = vec![chapter("1", "Local", 100)];
        let remote = vec![chapter("1", "Remote", 100)];

        let merged = merge_collections(&local, &remote);
        assert_eq!(merged[0].title, "Local");
    }

    #[test]
    fn test_local_only_records_never_dropped() {
        let local = vec![chapter("1", "Algebra", 100), chapter("3", "Stats", 10)];
        let remote = vec![chapter("1", "Algebra", 50)];

        let merged = merge_collections(&local, &remote);
        assert!(merged.iter().any(|c| c.id == "3"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let local = vec![chapter("1", "Algebra", 100), chapter("2", "Geometry", 10)];
        let remote = vec![chapter("1", "Algebra v2", 200), chapter("4", "Calc", 5)];

        let once = merge_collections(&local, &remote);
        let twice = merge_collections(&once, &remote);

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.title, b.title);
            assert_eq!(a.updated_at, b.updated_at);
        }
    }

    #[test]
    fn test_classes_union_remote_first() {
        let local = vec!["8th Grade".to_string(), "Night School".to_string()];
        let remote = vec!["6th Grade".to_string(), "8th Grade".to_string()];

        let merged = merge_classes(&local, &remote);
        assert_eq!(
            merged,
            vec![
                "6th Grade".to_string(),
                "8th Grade".to_string(),
                "Night School".to_string(),
            ]
        );
    }

    #[test]
    fn test_progress_never_regresses() {
        let mut local = ProgressMap::new();
        local
            .entry("u1".to_string())
            .or_default()
            .insert("c1".to_string(), progress_entry(true, 80, 3));

        let mut remote = ProgressMap::new();
        remote
            .entry("u1".to_string())
            .or_default()
            .insert("c1".to_string(), progress_entry(false, 60, 5));

        let merged = merge_progress(&local, &remote);
        let entry = merged["u1"]["c1"];
        assert!(entry.completed);
        assert_eq!(entry.score, 80);
    }

    #[test]
    fn test_progress_adopts_unknown_keys_wholesale() {
        let mut local = ProgressMap::new();
        local
            .entry("u1".to_string())
            .or_default()
            .insert("c1".to_string(), progress_entry(true, 90, 1));

        let mut remote = ProgressMap::new();
        remote
            .entry("u2".to_string())
            .or_default()
            .insert("c1".to_string(), progress_entry(false, 30, 2));
        remote
            .entry("u1".to_string())
            .or_default()
            .insert("c9".to_string(), progress_entry(true, 100, 4));

        let merged = merge_progress(&local, &remote);
        assert_eq!(merged["u2"]["c1"], progress_entry(false, 30, 2));
        assert_eq!(merged["u1"]["c9"], progress_entry(true, 100, 4));
        assert_eq!(merged["u1"]["c1"], progress_entry(true, 90, 1));
    }

    #[test]
    fn test_snapshot_merge_reads_current_state() {
        let mut state = AppState::new();
        crate::state::seed::ensure_seed_data(&mut state);

        // A local mutation made after the snapshot was captured survives the
        // fold because merge operates on the container as it is now.
        let snapshot = SnapshotData {
            chapters: vec![chapter("late-addition", "Remote Chapter", 10)],
            ..Default::default()
        };
        let local_count = state.chapters.len();
        merge_snapshot(&mut state, &snapshot);

        assert_eq!(state.chapters.len(), local_count + 1);
        assert_eq!(state.classes.len(), 5);
    }
}
