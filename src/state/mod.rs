pub mod seed;

use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::storage::{
    now_millis, new_id, Attachment, Chapter, ChapterProgress, Difficulty, FileStore, LiveClass,
    LiveClassStatus, Note, ProgressMap, Provenance, Question, StorageError, StoreKey, Subject,
    User, Video, DEFAULT_CLASSES, DEFAULT_SUBJECT_IDS,
};

#[derive(Error, Debug)]
pub enum StateError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, StateError>;

fn invalid(field: &'static str, message: impl Into<String>) -> StateError {
    StateError::Validation {
        field,
        message: message.into(),
    }
}

/// Type alias for the shared state container
pub type SharedState = Arc<Mutex<AppState>>;

/// Input for registering a new user account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub class: String,
    pub gender: String,
    pub school: String,
}

/// Quiz completion threshold: a score at or above this marks the chapter
/// completed.
const COMPLETION_SCORE: u32 = 70;

/// In-memory collections owned for the lifetime of the session. The durable
/// copy lives in the `FileStore`; the merge engine and scheduler operate on
/// this container through a shared `Arc<Mutex<_>>`.
#[derive(Debug, Default)]
pub struct AppState {
    pub users: Vec<User>,
    pub subjects: Vec<Subject>,
    pub chapters: Vec<Chapter>,
    pub videos: Vec<Video>,
    pub questions: Vec<Question>,
    pub notes: Vec<Note>,
    pub live_classes: Vec<LiveClass>,
    pub classes: Vec<String>,
    pub progress: ProgressMap,
    /// Id of the logged-in user, if any. Sync cycles only run while a
    /// session is active.
    pub current_user: Option<String>,
}

fn load_collection<T: DeserializeOwned + Default>(store: &FileStore, key: StoreKey) -> T {
    let Some(raw) = store.get(key) else {
        return T::default();
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            // Malformed persisted JSON degrades to the empty default.
            log::warn!("Discarding malformed '{}' collection: {}", key.as_str(), e);
            T::default()
        }
    }
}

fn save_collection<T: Serialize>(
    store: &FileStore,
    key: StoreKey,
    value: &T,
) -> crate::storage::Result<()> {
    let raw = serde_json::to_string_pretty(value)?;
    store.set(key, &raw)
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every collection from the durable store. Collections that are
    /// absent or fail to parse come back empty.
    pub fn load(store: &FileStore) -> Self {
        Self {
            users: load_collection(store, StoreKey::Users),
            subjects: load_collection(store, StoreKey::Subjects),
            chapters: load_collection(store, StoreKey::Chapters),
            videos: load_collection(store, StoreKey::Videos),
            questions: load_collection(store, StoreKey::Questions),
            notes: load_collection(store, StoreKey::Notes),
            live_classes: load_collection(store, StoreKey::LiveClasses),
            classes: load_collection(store, StoreKey::Classes),
            progress: load_collection(store, StoreKey::UserProgress),
            current_user: store
                .get(StoreKey::CurrentUser)
                .filter(|id| !id.is_empty()),
        }
    }

    /// Write every collection to the durable store and stamp the write time.
    pub fn persist(&self, store: &FileStore) -> crate::storage::Result<()> {
        save_collection(store, StoreKey::Users, &self.users)?;
        save_collection(store, StoreKey::Subjects, &self.subjects)?;
        save_collection(store, StoreKey::Chapters, &self.chapters)?;
        save_collection(store, StoreKey::Videos, &self.videos)?;
        save_collection(store, StoreKey::Questions, &self.questions)?;
        save_collection(store, StoreKey::Notes, &self.notes)?;
        save_collection(store, StoreKey::LiveClasses, &self.live_classes)?;
        save_collection(store, StoreKey::Classes, &self.classes)?;
        save_collection(store, StoreKey::UserProgress, &self.progress)?;
        match &self.current_user {
            Some(id) => store.set(StoreKey::CurrentUser, id)?,
            None => store.remove(StoreKey::CurrentUser)?,
        }
        store.set(StoreKey::LastUpdate, &now_millis().to_string())?;
        Ok(())
    }

    // ===== Users & session =====

    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_deref().and_then(|id| self.user(id))
    }

    pub fn register_user(&mut self, input: NewUser) -> Result<User> {
        let email = input.email.trim().to_string();
        if email.is_empty() {
            return Err(invalid("email", "email is required"));
        }
        if input.display_name.trim().is_empty() {
            return Err(invalid("displayName", "display name is required"));
        }
        if input.class.trim().is_empty() {
            return Err(invalid("class", "class is required"));
        }
        if input.password.len() < 6 {
            return Err(invalid("password", "password must be at least 6 characters"));
        }
        if self.users.iter().any(|u| u.email == email) {
            return Err(invalid("email", format!("user already exists: {}", email)));
        }

        let user = User::new(
            email,
            input.password,
            input.display_name.trim().to_string(),
            input.class,
            input.gender,
            input.school,
        );
        self.users.push(user.clone());
        self.current_user = Some(user.id.clone());
        Ok(user)
    }

    /// Plaintext credential check; real authentication is out of scope.
    pub fn login(&mut self, email: &str, password: &str) -> Result<User> {
        let user = self
            .users
            .iter()
            .find(|u| u.email == email.trim() && u.password == password)
            .cloned()
            .ok_or(StateError::InvalidCredentials)?;

        self.current_user = Some(user.id.clone());
        self.touch_streak(&user.id);
        // Return the refreshed record; touch_streak bumped the stored copy.
        Ok(self.user(&user.id).cloned().unwrap_or(user))
    }

    pub fn logout(&mut self) {
        self.current_user = None;
    }

    /// Bump the user's streak once per active day: consecutive days increase
    /// it, a gap of more than one day resets it to 1.
    pub fn touch_streak(&mut self, user_id: &str) {
        let now = now_millis();
        let today = Utc
            .timestamp_millis_opt(now)
            .single()
            .map(|t| t.date_naive());

        let Some(user) = self.users.iter_mut().find(|u| u.id == user_id) else {
            return;
        };
        let last_day = user
            .last_active
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(|t| t.date_naive());

        match (today, last_day) {
            (Some(today), Some(last)) => {
                let gap = (today - last).num_days();
                if gap == 1 {
                    user.streak += 1;
                } else if gap > 1 {
                    user.streak = 1;
                }
                // Same day: streak unchanged
            }
            _ => {
                user.streak = user.streak.max(1);
            }
        }
        user.last_active = Some(now);
        user.updated_at = now;
    }

    // ===== Subjects =====

    pub fn subject(&self, subject_id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == subject_id)
    }

    pub fn add_subject(
        &mut self,
        name: String,
        description: String,
        color: String,
        classes: Vec<String>,
    ) -> Result<Subject> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(invalid("name", "subject name is required"));
        }
        if self
            .subjects
            .iter()
            .any(|s| s.name.eq_ignore_ascii_case(&name))
        {
            return Err(invalid("name", format!("subject already exists: {}", name)));
        }

        let subject = Subject::new(new_id(), name, description, color, classes);
        self.subjects.push(subject.clone());
        Ok(subject)
    }

    /// Delete a subject; cascades to its chapters (and their questions and
    /// notes) and videos. Default subjects are permanent.
    pub fn delete_subject(&mut self, subject_id: &str) -> Result<()> {
        if DEFAULT_SUBJECT_IDS.contains(&subject_id) {
            return Err(invalid("subject", "default subjects cannot be deleted"));
        }
        if self.subject(subject_id).is_none() {
            return Err(StateError::NotFound(format!("subject {}", subject_id)));
        }

        let chapter_ids: Vec<String> = self
            .chapters
            .iter()
            .filter(|c| c.subject_id == subject_id)
            .map(|c| c.id.clone())
            .collect();
        for chapter_id in &chapter_ids {
            self.questions.retain(|q| q.chapter_id != *chapter_id);
            self.notes.retain(|n| n.chapter_id != *chapter_id);
        }
        self.chapters.retain(|c| c.subject_id != subject_id);
        self.videos.retain(|v| v.subject_id != subject_id);
        self.subjects.retain(|s| s.id != subject_id);
        Ok(())
    }

    // ===== Chapters =====

    pub fn chapter(&self, chapter_id: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == chapter_id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_chapter(
        &mut self,
        subject_id: &str,
        title: String,
        description: String,
        difficulty: Difficulty,
        questions: u32,
        duration: u32,
        class: String,
    ) -> Result<Chapter> {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(invalid("title", "chapter title is required"));
        }
        if self.subject(subject_id).is_none() {
            return Err(invalid("subjectId", format!("unknown subject: {}", subject_id)));
        }
        if !self.classes.iter().any(|c| c == &class) {
            return Err(invalid("class", format!("unknown class: {}", class)));
        }

        let now = now_millis();
        let chapter = Chapter {
            id: new_id(),
            subject_id: subject_id.to_string(),
            title,
            description,
            difficulty,
            questions,
            duration,
            class,
            source: Provenance::Local,
            created_at: now,
            updated_at: now,
        };
        self.chapters.push(chapter.clone());
        Ok(chapter)
    }

    /// Mark a chapter as accepted by the backend after a successful push.
    pub fn mark_chapter_backend(&mut self, chapter_id: &str) {
        if let Some(chapter) = self.chapters.iter_mut().find(|c| c.id == chapter_id) {
            chapter.source = Provenance::Backend;
            chapter.updated_at = now_millis();
        }
    }

    /// Delete a chapter and all of its questions and notes.
    pub fn delete_chapter(&mut self, chapter_id: &str) -> Result<()> {
        if self.chapter(chapter_id).is_none() {
            return Err(StateError::NotFound(format!("chapter {}", chapter_id)));
        }
        self.chapters.retain(|c| c.id != chapter_id);
        self.questions.retain(|q| q.chapter_id != chapter_id);
        self.notes.retain(|n| n.chapter_id != chapter_id);
        Ok(())
    }

    // ===== Videos =====

    pub fn add_video(
        &mut self,
        subject_id: &str,
        title: String,
        description: String,
        url: String,
        duration: String,
        class: String,
    ) -> Result<Video> {
        if title.trim().is_empty() {
            return Err(invalid("title", "video title is required"));
        }
        if url.trim().is_empty() {
            return Err(invalid("url", "video URL is required"));
        }
        if self.subject(subject_id).is_none() {
            return Err(invalid("subjectId", format!("unknown subject: {}", subject_id)));
        }

        let now = now_millis();
        let video = Video {
            id: new_id(),
            subject_id: subject_id.to_string(),
            title: title.trim().to_string(),
            description,
            url,
            duration,
            class,
            created_at: now,
            updated_at: now,
        };
        self.videos.push(video.clone());
        Ok(video)
    }

    pub fn delete_video(&mut self, video_id: &str) -> Result<()> {
        if !self.videos.iter().any(|v| v.id == video_id) {
            return Err(StateError::NotFound(format!("video {}", video_id)));
        }
        self.videos.retain(|v| v.id != video_id);
        Ok(())
    }

    // ===== Questions =====

    pub fn add_question(
        &mut self,
        chapter_id: &str,
        text: String,
        options: [String; 4],
        correct_answer: u8,
        explanation: Option<String>,
    ) -> Result<Question> {
        if text.trim().is_empty() {
            return Err(invalid("text", "question text is required"));
        }
        if correct_answer > 3 {
            return Err(invalid("correctAnswer", "answer index must be 0-3"));
        }
        if options.iter().any(|o| o.trim().is_empty()) {
            return Err(invalid("options", "all four options are required"));
        }
        let class = self
            .chapter(chapter_id)
            .map(|c| c.class.clone())
            .ok_or_else(|| invalid("chapterId", format!("unknown chapter: {}", chapter_id)))?;

        let now = now_millis();
        let question = Question {
            id: new_id(),
            chapter_id: chapter_id.to_string(),
            text,
            options,
            correct_answer,
            explanation,
            class,
            created_at: now,
            updated_at: now,
        };
        self.questions.push(question.clone());
        Ok(question)
    }

    pub fn delete_question(&mut self, question_id: &str) -> Result<()> {
        if !self.questions.iter().any(|q| q.id == question_id) {
            return Err(StateError::NotFound(format!("question {}", question_id)));
        }
        self.questions.retain(|q| q.id != question_id);
        Ok(())
    }

    // ===== Notes =====

    /// Create or replace the note for a (chapter, class) pair.
    pub fn set_note(
        &mut self,
        chapter_id: &str,
        class: String,
        content: String,
        attachments: Vec<Attachment>,
    ) -> Result<Note> {
        if self.chapter(chapter_id).is_none() {
            return Err(invalid("chapterId", format!("unknown chapter: {}", chapter_id)));
        }

        let now = now_millis();
        if let Some(existing) = self
            .notes
            .iter_mut()
            .find(|n| n.chapter_id == chapter_id && n.class == class)
        {
            existing.content = content;
            existing.attachments = attachments;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let note = Note {
            id: new_id(),
            chapter_id: chapter_id.to_string(),
            content,
            attachments,
            class,
            created_at: now,
            updated_at: now,
        };
        self.notes.push(note.clone());
        Ok(note)
    }

    pub fn delete_note(&mut self, note_id: &str) -> Result<()> {
        if !self.notes.iter().any(|n| n.id == note_id) {
            return Err(StateError::NotFound(format!("note {}", note_id)));
        }
        self.notes.retain(|n| n.id != note_id);
        Ok(())
    }

    // ===== Live classes =====

    #[allow(clippy::too_many_arguments)]
    pub fn add_live_class(
        &mut self,
        title: String,
        subject: String,
        teacher: String,
        description: String,
        scheduled_at: String,
        duration: String,
        meeting_link: String,
        class: String,
    ) -> Result<LiveClass> {
        if title.trim().is_empty() {
            return Err(invalid("title", "live class title is required"));
        }
        if scheduled_at.trim().is_empty() {
            return Err(invalid("scheduledAt", "schedule time is required"));
        }

        let now = now_millis();
        let live = LiveClass {
            id: new_id(),
            title,
            subject,
            teacher,
            description,
            scheduled_at,
            duration,
            meeting_link,
            status: LiveClassStatus::Scheduled,
            class,
            attendees: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.live_classes.push(live.clone());
        Ok(live)
    }

    pub fn set_live_class_status(&mut self, live_id: &str, status: LiveClassStatus) -> Result<()> {
        let live = self
            .live_classes
            .iter_mut()
            .find(|l| l.id == live_id)
            .ok_or_else(|| StateError::NotFound(format!("live class {}", live_id)))?;
        live.status = status;
        live.updated_at = now_millis();
        Ok(())
    }

    /// Add a user to the attendee set; joining twice is a no-op.
    pub fn join_live_class(&mut self, live_id: &str, user_id: &str) -> Result<()> {
        let live = self
            .live_classes
            .iter_mut()
            .find(|l| l.id == live_id)
            .ok_or_else(|| StateError::NotFound(format!("live class {}", live_id)))?;
        if !live.attendees.iter().any(|a| a == user_id) {
            live.attendees.push(user_id.to_string());
            live.updated_at = now_millis();
        }
        Ok(())
    }

    pub fn delete_live_class(&mut self, live_id: &str) -> Result<()> {
        if !self.live_classes.iter().any(|l| l.id == live_id) {
            return Err(StateError::NotFound(format!("live class {}", live_id)));
        }
        self.live_classes.retain(|l| l.id != live_id);
        Ok(())
    }

    // ===== Classes =====

    pub fn add_class(&mut self, name: String) -> Result<()> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(invalid("class", "class name is required"));
        }
        if self.classes.iter().any(|c| c == &name) {
            return Err(invalid("class", format!("class already exists: {}", name)));
        }
        self.classes.push(name);
        Ok(())
    }

    /// Delete a class and every entity tagged with it. The five default
    /// classes are permanent.
    pub fn delete_class(&mut self, name: &str) -> Result<()> {
        if DEFAULT_CLASSES.contains(&name) {
            return Err(invalid("class", "default classes cannot be deleted"));
        }
        if !self.classes.iter().any(|c| c == name) {
            return Err(StateError::NotFound(format!("class {}", name)));
        }

        self.classes.retain(|c| c != name);
        self.chapters.retain(|c| c.class != name);
        self.videos.retain(|v| v.class != name);
        self.questions.retain(|q| q.class != name);
        self.notes.retain(|n| n.class != name);
        self.live_classes.retain(|l| l.class != name);
        for subject in &mut self.subjects {
            subject.classes.retain(|c| c != name);
        }
        Ok(())
    }

    // ===== Progress & gamification =====

    pub fn progress_for(&self, user_id: &str, chapter_id: &str) -> Option<ChapterProgress> {
        self.progress
            .get(user_id)
            .and_then(|chapters| chapters.get(chapter_id))
            .copied()
    }

    /// Record a quiz outcome. Score and completion only move upward, one
    /// attempt is counted, and coins are awarded for the run.
    pub fn record_quiz_result(&mut self, user_id: &str, chapter_id: &str, score: u32) -> Result<ChapterProgress> {
        if self.user(user_id).is_none() {
            return Err(StateError::NotFound(format!("user {}", user_id)));
        }
        if self.chapter(chapter_id).is_none() {
            return Err(StateError::NotFound(format!("chapter {}", chapter_id)));
        }
        let score = score.min(100);

        let entry = self
            .progress
            .entry(user_id.to_string())
            .or_default()
            .entry(chapter_id.to_string())
            .or_default();
        entry.attempts += 1;
        entry.score = entry.score.max(score);
        if score >= COMPLETION_SCORE {
            entry.completed = true;
        }
        let result = *entry;

        if let Some(user) = self.users.iter_mut().find(|u| u.id == user_id) {
            // Rounded to the nearest ten-point bracket, half up
            user.coins += (score + 5) / 10 + 10;
            user.updated_at = now_millis();
        }
        self.touch_streak(user_id);
        Ok(result)
    }
}
