//! Database schema and record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type LessonId = i64;
pub type QuestionId = i64;
pub type AnswerId = i64;
pub type UserId = i64;

/// Every question carries exactly this many answers.
pub const ANSWERS_PER_QUESTION: usize = 4;
/// Every authored lesson carries exactly this many questions.
pub const QUESTIONS_PER_LESSON: usize = 3;

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 2000;
pub const MAX_QUESTION_LEN: usize = 1000;
pub const MAX_ANSWER_LEN: usize = 500;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS lessons (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    video_ref TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lesson_id INTEGER NOT NULL,
    text TEXT NOT NULL,

    FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_questions_lesson ON questions(lesson_id, id);

CREATE TABLE IF NOT EXISTS answers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    is_correct BOOLEAN NOT NULL DEFAULT 0,

    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_answers_question ON answers(question_id, id);

CREATE TABLE IF NOT EXISTS user_progress (
    user_id INTEGER PRIMARY KEY,
    current_lesson_id INTEGER,
    last_answered_question_id INTEGER
);
";

/// Lesson record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    pub description: Option<String>,
    /// Opaque handle into the transport's media store
    pub video_ref: String,
    pub created_at: DateTime<Utc>,
}

/// Question record with its answers loaded as a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub lesson_id: LessonId,
    pub text: String,
    pub answers: Vec<Answer>,
}

impl Question {
    #[allow(dead_code)] // Used in tests
    pub fn correct_answer(&self) -> Option<&Answer> {
        self.answers.iter().find(|a| a.is_correct)
    }

    pub fn answer(&self, id: AnswerId) -> Option<&Answer> {
        self.answers.iter().find(|a| a.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub question_id: QuestionId,
    pub text: String,
    pub is_correct: bool,
}

/// Per-user quiz progress, one row per user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: UserId,
    pub current_lesson_id: Option<LessonId>,
    pub last_answered_question_id: Option<QuestionId>,
}

/// A fully collected lesson, ready to be written in one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLesson {
    pub title: String,
    pub description: String,
    pub video_ref: String,
    pub questions: Vec<NewQuestion>,
}

/// A fully collected question. `correct` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    pub text: String,
    pub answers: Vec<String>,
    pub correct: usize,
}

impl NewQuestion {
    pub fn is_complete(&self) -> bool {
        !self.text.trim().is_empty()
            && self.answers.len() == ANSWERS_PER_QUESTION
            && (1..=ANSWERS_PER_QUESTION).contains(&self.correct)
    }
}

impl NewLesson {
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.description.trim().is_empty()
            && !self.video_ref.trim().is_empty()
            && self.questions.len() == QUESTIONS_PER_LESSON
            && self.questions.iter().all(NewQuestion::is_complete)
    }
}
