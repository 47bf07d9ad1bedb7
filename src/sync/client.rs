use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{AppState, SharedState};
use crate::storage::{new_id, now_millis, Chapter, Difficulty, Provenance};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote returned status {0}")]
    RemoteStatus(u16),

    #[error("remote reported failure: {0}")]
    RemoteRejected(String),

    #[error("malformed remote payload: {0}")]
    MalformedPayload(String),

    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("chapter not found: {0}")]
    ChapterNotFound(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// One content record as the remote service shapes it. Remote ids are
/// integers, unlike local opaque string ids; reconciliation therefore keys on
/// (title, class) instead.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContentItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub subject: String,
    #[serde(default)]
    pub difficulty: String,
    /// Comma-joined class names.
    #[serde(default)]
    pub classes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<ContentItem>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpload {
    pub user_id: String,
    pub subject: String,
    pub chapter: String,
    pub score: u32,
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
struct PushAck {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<PushAckData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PushAckData {
    id: i64,
}

/// The remote content service seam. The production implementation is
/// `RemoteClient`; tests drive the scheduler with an in-memory fake.
#[async_trait]
pub trait ContentService: Send + Sync {
    async fn fetch_content(&self) -> Result<Vec<ContentItem>>;
    async fn push_content(&self, item: &ContentItem) -> Result<i64>;
    async fn push_progress(&self, upload: &ProgressUpload) -> Result<()>;
}

/// HTTP client for the remote content service.
pub struct RemoteClient {
    client: Client,
    base_url: String,
}

impl RemoteClient {
    pub fn new(base_url: String) -> Result<Self> {
        // Normalized to no trailing slash so path joins stay predictable
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(SyncError::InvalidUrl(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ContentService for RemoteClient {
    async fn fetch_content(&self) -> Result<Vec<ContentItem>> {
        let response = self.client.get(self.url("/api/content")).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::RemoteStatus(status.as_u16()));
        }

        let envelope: ContentEnvelope = response
            .json()
            .await
            .map_err(|e| SyncError::MalformedPayload(e.to_string()))?;
        if !envelope.success {
            return Err(SyncError::RemoteRejected(
                envelope.error.unwrap_or_else(|| "unspecified".to_string()),
            ));
        }
        Ok(envelope.data)
    }

    async fn push_content(&self, item: &ContentItem) -> Result<i64> {
        let response = self
            .client
            .post(self.url("/api/content"))
            .json(item)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::RemoteStatus(status.as_u16()));
        }

        let ack: PushAck = response
            .json()
            .await
            .map_err(|e| SyncError::MalformedPayload(e.to_string()))?;
        if !ack.success {
            return Err(SyncError::RemoteRejected(
                ack.error.unwrap_or_else(|| "unspecified".to_string()),
            ));
        }
        ack.data
            .map(|data| data.id)
            .ok_or_else(|| SyncError::MalformedPayload("ack carries no id".to_string()))
    }

    async fn push_progress(&self, upload: &ProgressUpload) -> Result<()> {
        let response = self
            .client
            .post(self.url("/api/progress"))
            .json(upload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::RemoteStatus(status.as_u16()));
        }
        // Fire-and-forget ack; the body is not inspected beyond success
        Ok(())
    }
}

/// Fold fetched content items into the chapter collection. Additive-only:
/// an item already known locally (natural key: title + class) is skipped,
/// an unknown one is appended tagged `Provenance::Backend`. Items naming a
/// subject or class with no local match are skipped. Nothing is ever
/// overwritten or deleted.
///
/// Returns the number of chapters added.
pub fn absorb_content(state: &mut AppState, items: &[ContentItem]) -> usize {
    let mut added = 0;

    for item in items {
        let title = item.title.trim();
        if title.is_empty() {
            continue;
        }
        let Some(subject_id) = state
            .subjects
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(item.subject.trim()))
            .map(|s| s.id.clone())
        else {
            // A chapter must hang off a real subject or cascades and
            // subject-scoped views never reach it
            log::debug!(
                "Skipping remote item '{}': unknown subject '{}'",
                title,
                item.subject.trim()
            );
            continue;
        };

        for class in item.classes.split(',') {
            let class = class.trim();
            if class.is_empty() || !state.classes.iter().any(|c| c == class) {
                continue;
            }
            let known = state
                .chapters
                .iter()
                .any(|c| c.class == class && c.title.eq_ignore_ascii_case(title));
            if known {
                continue;
            }

            let now = now_millis();
            state.chapters.push(Chapter {
                id: item
                    .id
                    .map(|id| format!("backend-{}-{}", id, class.replace(' ', "-")))
                    .unwrap_or_else(new_id),
                subject_id: subject_id.clone(),
                title: title.to_string(),
                description: item.description.clone(),
                difficulty: Difficulty::parse(&item.difficulty),
                questions: 5,
                duration: 30,
                class: class.to_string(),
                source: Provenance::Backend,
                created_at: now,
                updated_at: now,
            });
            added += 1;
        }
    }
    added
}

/// Build the wire shape for pushing a locally authored chapter.
pub fn content_item_for(state: &AppState, chapter: &Chapter) -> ContentItem {
    let subject = state
        .subject(&chapter.subject_id)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| chapter.subject_id.clone());
    ContentItem {
        id: None,
        title: chapter.title.clone(),
        description: chapter.description.clone(),
        subject,
        difficulty: match chapter.difficulty {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
        .to_string(),
        classes: chapter.class.clone(),
        created_at: None,
    }
}

/// Build the progress uploads for one user: one record per attempted chapter.
pub fn progress_uploads_for(state: &AppState, user_id: &str) -> Vec<ProgressUpload> {
    let Some(chapters) = state.progress.get(user_id) else {
        return Vec::new();
    };

    chapters
        .iter()
        .filter_map(|(chapter_id, entry)| {
            let chapter = state.chapter(chapter_id)?;
            let subject = state
                .subject(&chapter.subject_id)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| chapter.subject_id.clone());
            Some(ProgressUpload {
                user_id: user_id.to_string(),
                subject,
                chapter: chapter.title.clone(),
                score: entry.score,
                completed: entry.completed,
            })
        })
        .collect()
}

/// Publish one locally authored chapter to the remote service. On an
/// acknowledged push the chapter is re-tagged `Provenance::Backend` so the
/// next pull recognizes it instead of duplicating it.
pub async fn publish_chapter(
    state: &SharedState,
    service: &dyn ContentService,
    chapter_id: &str,
) -> Result<i64> {
    let item = {
        let state = state.lock().unwrap();
        let chapter = state
            .chapter(chapter_id)
            .ok_or_else(|| SyncError::ChapterNotFound(chapter_id.to_string()))?;
        content_item_for(&state, chapter)
    };

    // No lock held across the request
    let remote_id = service.push_content(&item).await?;

    state.lock().unwrap().mark_chapter_backend(chapter_id);
    log::info!("published chapter {chapter_id} as remote id {remote_id}");
    Ok(remote_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::seed;

    fn seeded_state() -> AppState {
        let mut state = AppState::new();
        seed::ensure_seed_data(&mut state);
        state
    }

    fn item(title: &str, subject: &str, classes: &str) -> ContentItem {
        ContentItem {
            id: Some(7),
            title: title.to_string(),
            description: "from the backend".to_string(),
            subject: subject.to_string(),
            difficulty: "intermediate".to_string(),
            classes: classes.to_string(),
            created_at: Some("2026-08-01T00:00:00Z".to_string()),
        }
    }

    #[test]
    fn test_absorb_appends_unknown_items_with_backend_provenance() {
        let mut state = seeded_state();
        let added = absorb_content(&mut state, &[item("Fractions", "Mathematics", "6th Grade")]);

        assert_eq!(added, 1);
        let chapter = state
            .chapters
            .iter()
            .find(|c| c.title == "Fractions")
            .unwrap();
        assert_eq!(chapter.source, Provenance::Backend);
        assert_eq!(chapter.subject_id, "math");
        assert_eq!(chapter.difficulty, Difficulty::Intermediate);
    }

    #[test]
    fn test_absorb_skips_known_natural_key() {
        let mut state = seeded_state();
        // "Algebra Basics" in 8th Grade is seeded locally
        let added = absorb_content(
            &mut state,
            &[item("algebra basics", "Mathematics", "8th Grade")],
        );
        assert_eq!(added, 0);
    }

    #[test]
    fn test_absorb_is_additive_only() {
        let mut state = seeded_state();
        let before = state.chapters.clone();
        absorb_content(&mut state, &[item("Fractions", "Mathematics", "6th Grade")]);

        // No pre-existing chapter was touched
        for original in &before {
            let still = state.chapters.iter().find(|c| c.id == original.id).unwrap();
            assert_eq!(still.title, original.title);
            assert_eq!(still.updated_at, original.updated_at);
        }
    }

    #[test]
    fn test_absorb_skips_items_with_unknown_subject() {
        let mut state = seeded_state();
        let before = state.chapters.len();

        let added = absorb_content(&mut state, &[item("Knots", "Seamanship", "6th Grade")]);

        assert_eq!(added, 0);
        assert_eq!(state.chapters.len(), before);
    }

    #[test]
    fn test_absorb_fans_out_over_classes_and_skips_unknown() {
        let mut state = seeded_state();
        let added = absorb_content(
            &mut state,
            &[item("Fractions", "Mathematics", "6th Grade, 7th Grade, 13th Grade")],
        );
        assert_eq!(added, 2);
    }

    #[test]
    fn test_envelope_parsing_tolerates_missing_fields() {
        let envelope: ContentEnvelope = serde_json::from_str(
            r#"{"success": true, "data": [{"title": "T", "subject": "Science"}]}"#,
        )
        .unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.data.len(), 1);
        assert_eq!(envelope.data[0].difficulty, "");
    }

    #[test]
    fn test_progress_uploads_resolve_subject_names() {
        let mut state = seeded_state();
        state
            .progress
            .entry("1".to_string())
            .or_default()
            .insert(
                "1".to_string(),
                crate::storage::ChapterProgress {
                    completed: true,
                    score: 85,
                    attempts: 2,
                },
            );

        let uploads = progress_uploads_for(&state, "1");
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].subject, "Mathematics");
        assert_eq!(uploads[0].chapter, "Algebra Basics");
        assert_eq!(uploads[0].score, 85);
    }

    #[test]
    fn test_remote_client_rejects_non_http_url() {
        assert!(RemoteClient::new("ftp://example.com".to_string()).is_err());
        assert!(RemoteClient::new("https://example.com/".to_string()).is_ok());
    }

    struct StubRemote {
        pushed: std::sync::Mutex<Vec<ContentItem>>,
        fail: bool,
    }

    #[async_trait]
    impl ContentService for StubRemote {
        async fn fetch_content(&self) -> Result<Vec<ContentItem>> {
            Ok(Vec::new())
        }

        async fn push_content(&self, item: &ContentItem) -> Result<i64> {
            if self.fail {
                return Err(SyncError::RemoteStatus(500));
            }
            self.pushed.lock().unwrap().push(item.clone());
            Ok(42)
        }

        async fn push_progress(&self, _upload: &ProgressUpload) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_chapter_marks_backend_provenance() {
        let state = seeded_state();
        let chapter_id = state.chapters[0].id.clone();
        let state: SharedState = std::sync::Arc::new(std::sync::Mutex::new(state));
        let remote = StubRemote {
            pushed: std::sync::Mutex::new(Vec::new()),
            fail: false,
        };

        let remote_id = publish_chapter(&state, &remote, &chapter_id).await.unwrap();

        assert_eq!(remote_id, 42);
        assert_eq!(remote.pushed.lock().unwrap().len(), 1);
        assert_eq!(
            state.lock().unwrap().chapter(&chapter_id).unwrap().source,
            Provenance::Backend
        );
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_provenance_alone() {
        let state = seeded_state();
        let chapter_id = state.chapters[0].id.clone();
        let state: SharedState = std::sync::Arc::new(std::sync::Mutex::new(state));
        let remote = StubRemote {
            pushed: std::sync::Mutex::new(Vec::new()),
            fail: true,
        };

        assert!(publish_chapter(&state, &remote, &chapter_id).await.is_err());
        assert_eq!(
            state.lock().unwrap().chapter(&chapter_id).unwrap().source,
            Provenance::Local
        );
    }

    #[test]
    fn test_content_item_for_local_chapter() {
        let state = seeded_state();
        let chapter = &state.chapters[0];
        let item = content_item_for(&state, chapter);
        assert_eq!(item.subject, "Mathematics");
        assert_eq!(item.classes, chapter.class);
        assert!(item.id.is_none());
    }
}
