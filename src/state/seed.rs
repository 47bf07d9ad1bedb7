//! First-run seed data. Each collection is seeded only when it is empty, so
//! re-running initialization against existing data never duplicates records.

use crate::storage::{
    now_millis, Chapter, Difficulty, Provenance, Question, Subject, User, DEFAULT_CLASSES,
};

use super::AppState;

struct DemoChapter {
    class: &'static str,
    subject: &'static str,
    title: &'static str,
    difficulty: Difficulty,
    questions: u32,
    duration: u32,
}

const DEMO_CHAPTERS: [DemoChapter; 5] = [
    DemoChapter {
        class: "8th Grade",
        subject: "math",
        title: "Algebra Basics",
        difficulty: Difficulty::Beginner,
        questions: 5,
        duration: 45,
    },
    DemoChapter {
        class: "9th Grade",
        subject: "math",
        title: "Geometry Introduction",
        difficulty: Difficulty::Intermediate,
        questions: 6,
        duration: 60,
    },
    DemoChapter {
        class: "10th Grade",
        subject: "math",
        title: "Trigonometry",
        difficulty: Difficulty::Advanced,
        questions: 8,
        duration: 75,
    },
    DemoChapter {
        class: "8th Grade",
        subject: "science",
        title: "Basic Physics",
        difficulty: Difficulty::Beginner,
        questions: 4,
        duration: 40,
    },
    DemoChapter {
        class: "9th Grade",
        subject: "science",
        title: "Chemistry Basics",
        difficulty: Difficulty::Intermediate,
        questions: 7,
        duration: 65,
    },
];

/// Install seed data into every empty collection. Returns true if anything
/// was installed (the caller should persist).
pub fn ensure_seed_data(state: &mut AppState) -> bool {
    let mut seeded = false;

    if state.classes.is_empty() {
        state.classes = DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect();
        log::info!("Seeded {} default classes", state.classes.len());
        seeded = true;
    }

    if state.users.is_empty() {
        let now = now_millis();
        let mut student = User::new(
            "student@example.com".into(),
            "123456".into(),
            "Demo Student".into(),
            "8th Grade".into(),
            "male".into(),
            "Demo Public School".into(),
        );
        student.id = "1".into();
        student.streak = 5;
        student.coins = 250;
        student.level = 2;

        let mut admin = User::new(
            "admin@example.com".into(),
            "admin123".into(),
            "Demo Admin".into(),
            "8th Grade".into(),
            "female".into(),
            "Demo Public School".into(),
        );
        admin.id = "2".into();
        admin.streak = 100;
        admin.coins = 1000;
        admin.level = 10;
        admin.is_admin = true;
        admin.is_super_admin = true;

        for user in [&mut student, &mut admin] {
            user.created_at = now;
            user.updated_at = now;
        }
        state.users = vec![student, admin];
        log::info!("Seeded default users");
        seeded = true;
    }

    if state.subjects.is_empty() {
        let classes = state.classes.clone();
        state.subjects = vec![
            Subject::new(
                "math".into(),
                "Mathematics".into(),
                "Learn math concepts from basic to advanced".into(),
                "#4361ee".into(),
                classes.clone(),
            ),
            Subject::new(
                "science".into(),
                "Science".into(),
                "Explore scientific concepts and experiments".into(),
                "#4CAF50".into(),
                classes.clone(),
            ),
            Subject::new(
                "english".into(),
                "English".into(),
                "Improve language and communication skills".into(),
                "#FF9800".into(),
                classes,
            ),
        ];
        log::info!("Seeded default subjects");
        seeded = true;
    }

    if state.chapters.is_empty() {
        let now = now_millis();
        state.chapters = DEMO_CHAPTERS
            .iter()
            .enumerate()
            .map(|(index, demo)| Chapter {
                id: (index + 1).to_string(),
                subject_id: demo.subject.to_string(),
                title: demo.title.to_string(),
                description: format!("{} for {}", demo.title, demo.class),
                difficulty: demo.difficulty,
                questions: demo.questions,
                duration: demo.duration,
                class: demo.class.to_string(),
                source: Provenance::Local,
                created_at: now,
                updated_at: now,
            })
            .collect();
        log::info!("Seeded demo chapters");
        seeded = true;
    }

    if state.questions.is_empty() {
        let now = now_millis();
        // Demo quiz for the first chapter (Algebra Basics, 8th Grade)
        let demo: [(&str, [&str; 4], u8); 3] = [
            ("What is 2x + 3x?", ["5x", "6x", "x", "2x"], 0),
            ("Solve for x: x + 5 = 12", ["5", "6", "7", "8"], 2),
            ("What is 3(x + 2) when x = 4?", ["14", "18", "12", "20"], 1),
        ];
        state.questions = demo
            .iter()
            .enumerate()
            .map(|(index, (text, options, correct_answer))| Question {
                id: format!("q{}", index + 1),
                chapter_id: "1".to_string(),
                text: text.to_string(),
                options: options.map(|o| o.to_string()),
                correct_answer: *correct_answer,
                explanation: None,
                class: "8th Grade".to_string(),
                created_at: now,
                updated_at: now,
            })
            .collect();
        log::info!("Seeded demo questions");
        seeded = true;
    }

    seeded
}
