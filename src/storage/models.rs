use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The five permanent class names. They are installed on first run and can
/// never be deleted.
pub const DEFAULT_CLASSES: [&str; 5] = [
    "6th Grade",
    "7th Grade",
    "8th Grade",
    "9th Grade",
    "10th Grade",
];

/// Subject ids installed by seeding; not deletable.
pub const DEFAULT_SUBJECT_IDS: [&str; 3] = ["math", "science", "english"];

/// Current millisecond epoch timestamp, the recency unit used by every record.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Fresh opaque record id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A record that carries an identity key unique within its collection.
pub trait Identifiable {
    fn id(&self) -> &str;
}

/// A record that carries a recency value for merge tie-breaking:
/// `updatedAt` if set, else `createdAt`, else 0.
pub trait Timestamped {
    fn recency(&self) -> i64;
}

macro_rules! impl_record {
    ($($ty:ty),* $(,)?) => {$(
        impl Identifiable for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        }

        impl Timestamped for $ty {
            fn recency(&self) -> i64 {
                if self.updated_at != 0 {
                    self.updated_at
                } else {
                    self.created_at
                }
            }
        }
    )*};
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    /// Parse a remote difficulty string, defaulting to beginner on anything
    /// unrecognized (remote content is not trusted to be well formed).
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "intermediate" => Self::Intermediate,
            "advanced" => Self::Advanced,
            _ => Self::Beginner,
        }
    }
}

/// Where a record was authored. Backend-sourced chapters are learned from the
/// remote content service and never re-pushed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    #[default]
    Local,
    Backend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    /// Stored in plaintext; real credential handling is out of scope.
    pub password: String,
    pub display_name: String,
    pub class: String,
    pub gender: String,
    pub school: String,
    pub streak: u32,
    pub coins: u32,
    pub level: u32,
    pub is_admin: bool,
    pub is_super_admin: bool,
    /// Millisecond epoch of the last day the streak was touched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<i64>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl User {
    pub fn new(
        email: String,
        password: String,
        display_name: String,
        class: String,
        gender: String,
        school: String,
    ) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            email,
            password,
            display_name,
            class,
            gender,
            school,
            streak: 0,
            coins: 100,
            level: 1,
            is_admin: false,
            is_super_admin: false,
            last_active: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Super-admins always have admin scope.
    pub fn has_admin_scope(&self) -> bool {
        self.is_admin || self.is_super_admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub description: String,
    pub color: String,
    /// Class names this subject applies to.
    pub classes: Vec<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Subject {
    pub fn new(
        id: String,
        name: String,
        description: String,
        color: String,
        classes: Vec<String>,
    ) -> Self {
        let now = now_millis();
        Self {
            id,
            name,
            description,
            color,
            classes,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub subject_id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    /// Expected question count.
    pub questions: u32,
    /// Duration in minutes.
    pub duration: u32,
    pub class: String,
    #[serde(default)]
    pub source: Provenance,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub subject_id: String,
    pub title: String,
    pub description: String,
    /// Embeddable URL.
    pub url: String,
    /// Display string, e.g. "12:30".
    pub duration: String,
    pub class: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub chapter_id: String,
    pub text: String,
    /// Exactly four ordered answer options.
    pub options: [String; 4],
    /// Index 0..=3 into `options`.
    pub correct_answer: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub class: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

/// Attached file metadata. No binary payload is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub uploaded_at: i64,
}

/// One note record per (chapter, class) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub chapter_id: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub class: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LiveClassStatus {
    #[default]
    Scheduled,
    Live,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveClass {
    pub id: String,
    pub title: String,
    /// Display name of the subject, not a foreign key.
    pub subject: String,
    pub teacher: String,
    pub description: String,
    /// ISO timestamp of the scheduled start.
    pub scheduled_at: String,
    /// Display string, e.g. "60 minutes".
    pub duration: String,
    pub meeting_link: String,
    pub status: LiveClassStatus,
    pub class: String,
    /// User ids who joined.
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

/// Per-chapter learning progress. Score is best-ever and completed is
/// monotonic; both only move upward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterProgress {
    pub completed: bool,
    /// 0-100, best score across attempts.
    pub score: u32,
    pub attempts: u32,
}

/// userId -> chapterId -> progress.
pub type ProgressMap = HashMap<String, HashMap<String, ChapterProgress>>;

impl_record!(User, Subject, Chapter, Video, Question, Note, LiveClass);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recency_falls_back_to_created_at() {
        let mut user = User::new(
            "a@b.c".into(),
            "secret1".into(),
            "A".into(),
            "8th Grade".into(),
            "other".into(),
            "School".into(),
        );
        user.updated_at = 0;
        assert_eq!(user.recency(), user.created_at);

        user.updated_at = user.created_at + 5;
        assert_eq!(user.recency(), user.created_at + 5);
    }

    #[test]
    fn test_difficulty_parse_unknown_defaults_to_beginner() {
        assert_eq!(Difficulty::parse("Advanced"), Difficulty::Advanced);
        assert_eq!(Difficulty::parse("hard"), Difficulty::Beginner);
    }

    #[test]
    fn test_missing_timestamps_deserialize_to_zero() {
        let json = r#"{
            "id": "x",
            "subjectId": "math",
            "title": "T",
            "description": "",
            "difficulty": "beginner",
            "questions": 5,
            "duration": 45,
            "class": "8th Grade"
        }"#;
        let chapter: Chapter = serde_json::from_str(json).unwrap();
        assert_eq!(chapter.recency(), 0);
        assert_eq!(chapter.source, Provenance::Local);
    }
}
