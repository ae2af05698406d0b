//! Database module for the lesson bot
//!
//! Provides persistence for lessons, their questions and answers, and
//! per-user quiz progress.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Lesson not found: {0}")]
    LessonNotFound(LessonId),
    #[error("Question not found: {0}")]
    QuestionNotFound(QuestionId),
    #[error("Answer not found: {0}")]
    AnswerNotFound(AnswerId),
    #[error("Answer position {position} is out of range (question has {count} answers)")]
    InvalidAnswerPosition { position: usize, count: usize },
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DbError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DbError::LessonNotFound(_) | DbError::QuestionNotFound(_) | DbError::AnswerNotFound(_)
        )
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        // Cascading deletes depend on this; SQLite leaves it off per connection
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // ==================== Lesson Operations ====================

    /// All lessons in creation order
    pub fn list_lessons(&self) -> DbResult<Vec<Lesson>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, description, video_ref, created_at FROM lessons ORDER BY id ASC",
        )?;
        let lessons = stmt
            .query_map([], parse_lesson_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lessons)
    }

    pub fn get_lesson(&self, id: LessonId) -> DbResult<Lesson> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, title, description, video_ref, created_at FROM lessons WHERE id = ?1",
            params![id],
            parse_lesson_row,
        )
        .optional()?
        .ok_or(DbError::LessonNotFound(id))
    }

    pub fn create_lesson(
        &self,
        title: &str,
        description: Option<&str>,
        video_ref: &str,
    ) -> DbResult<Lesson> {
        let conn = self.conn()?;
        insert_lesson(&conn, title, description, video_ref)
    }

    /// Write a fully collected lesson with all its questions and answers in a
    /// single transaction.
    pub fn commit_lesson(&self, draft: &NewLesson) -> DbResult<Lesson> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let lesson = insert_lesson(&tx, &draft.title, Some(&draft.description), &draft.video_ref)?;
        for question in &draft.questions {
            insert_question_with_answers(&tx, lesson.id, question)?;
        }
        tx.commit()?;

        tracing::info!(
            lesson_id = lesson.id,
            questions = draft.questions.len(),
            "Committed lesson"
        );
        Ok(lesson)
    }

    pub fn update_lesson_title(&self, id: LessonId, title: &str) -> DbResult<()> {
        self.update_lesson_column(id, "UPDATE lessons SET title = ?1 WHERE id = ?2", title)
    }

    pub fn update_lesson_description(&self, id: LessonId, description: &str) -> DbResult<()> {
        self.update_lesson_column(
            id,
            "UPDATE lessons SET description = ?1 WHERE id = ?2",
            description,
        )
    }

    pub fn update_lesson_video(&self, id: LessonId, video_ref: &str) -> DbResult<()> {
        self.update_lesson_column(id, "UPDATE lessons SET video_ref = ?1 WHERE id = ?2", video_ref)
    }

    fn update_lesson_column(&self, id: LessonId, sql: &str, value: &str) -> DbResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(sql, params![value, id])?;
        if updated == 0 {
            return Err(DbError::LessonNotFound(id));
        }
        Ok(())
    }

    /// Delete a lesson; its questions and answers go with it
    pub fn delete_lesson(&self, id: LessonId) -> DbResult<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM lessons WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::LessonNotFound(id));
        }
        Ok(())
    }

    // ==================== Question Operations ====================

    /// Get a question with its answers
    pub fn get_question(&self, id: QuestionId) -> DbResult<Question> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, lesson_id, text FROM questions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, QuestionId>(0)?,
                        row.get::<_, LessonId>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let (id, lesson_id, text) = row.ok_or(DbError::QuestionNotFound(id))?;
        let answers = load_answers(&conn, id)?;
        Ok(Question {
            id,
            lesson_id,
            text,
            answers,
        })
    }

    /// Questions of a lesson in creation order, answers loaded
    pub fn list_questions(&self, lesson_id: LessonId) -> DbResult<Vec<Question>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, text FROM questions WHERE lesson_id = ?1 ORDER BY id ASC")?;
        let rows = stmt
            .query_map(params![lesson_id], |row| {
                Ok((row.get::<_, QuestionId>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, text)| {
                Ok(Question {
                    id,
                    lesson_id,
                    text,
                    answers: load_answers(&conn, id)?,
                })
            })
            .collect()
    }

    pub fn create_question(&self, lesson_id: LessonId, text: &str) -> DbResult<Question> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO questions (lesson_id, text) VALUES (?1, ?2)",
            params![lesson_id, text],
        )?;
        Ok(Question {
            id: conn.last_insert_rowid(),
            lesson_id,
            text: text.to_string(),
            answers: Vec::new(),
        })
    }

    // ==================== Answer Operations ====================

    pub fn list_answers(&self, question_id: QuestionId) -> DbResult<Vec<Answer>> {
        let conn = self.conn()?;
        load_answers(&conn, question_id)
    }

    pub fn create_answer(
        &self,
        question_id: QuestionId,
        text: &str,
        is_correct: bool,
    ) -> DbResult<Answer> {
        let conn = self.conn()?;
        insert_answer(&conn, question_id, text, is_correct)
    }

    pub fn update_answer_text(&self, id: AnswerId, text: &str) -> DbResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE answers SET text = ?1 WHERE id = ?2",
            params![text, id],
        )?;
        if updated == 0 {
            return Err(DbError::AnswerNotFound(id));
        }
        Ok(())
    }

    /// Mark the answer at the 1-based `position` as the only correct one.
    ///
    /// The position is checked against the answers present right now, and the
    /// clear and set happen in one transaction.
    pub fn set_correct_answer(&self, question_id: QuestionId, position: usize) -> DbResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let answers = load_answers(&tx, question_id)?;
        if answers.is_empty() {
            let exists: Option<QuestionId> = tx
                .query_row(
                    "SELECT id FROM questions WHERE id = ?1",
                    params![question_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(DbError::QuestionNotFound(question_id));
            }
        }
        let target = position
            .checked_sub(1)
            .and_then(|idx| answers.get(idx))
            .ok_or(DbError::InvalidAnswerPosition {
                position,
                count: answers.len(),
            })?;

        tx.execute(
            "UPDATE answers SET is_correct = 0 WHERE question_id = ?1",
            params![question_id],
        )?;
        tx.execute(
            "UPDATE answers SET is_correct = 1 WHERE id = ?1",
            params![target.id],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ==================== Progress Operations ====================

    pub fn get_user_progress(&self, user_id: UserId) -> DbResult<Option<UserProgress>> {
        let conn = self.conn()?;
        let progress = conn
            .query_row(
                "SELECT user_id, current_lesson_id, last_answered_question_id
                 FROM user_progress WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserProgress {
                        user_id: row.get(0)?,
                        current_lesson_id: row.get(1)?,
                        last_answered_question_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(progress)
    }

    /// Insert or overwrite the single progress row for a user
    pub fn upsert_progress(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        question_id: Option<QuestionId>,
    ) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_progress (user_id, current_lesson_id, last_answered_question_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                current_lesson_id = excluded.current_lesson_id,
                last_answered_question_id = excluded.last_answered_question_id",
            params![user_id, lesson_id, question_id],
        )?;
        Ok(())
    }

    /// Point the user at a freshly opened lesson, forgetting the last answer
    pub fn set_current_lesson(&self, user_id: UserId, lesson_id: LessonId) -> DbResult<()> {
        self.upsert_progress(user_id, lesson_id, None)
    }
}

fn insert_lesson(
    conn: &Connection,
    title: &str,
    description: Option<&str>,
    video_ref: &str,
) -> DbResult<Lesson> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO lessons (title, description, video_ref, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![title, description, video_ref, now.to_rfc3339()],
    )?;
    Ok(Lesson {
        id: conn.last_insert_rowid(),
        title: title.to_string(),
        description: description.map(String::from),
        video_ref: video_ref.to_string(),
        created_at: now,
    })
}

fn insert_question_with_answers(
    tx: &Transaction<'_>,
    lesson_id: LessonId,
    question: &NewQuestion,
) -> DbResult<QuestionId> {
    tx.execute(
        "INSERT INTO questions (lesson_id, text) VALUES (?1, ?2)",
        params![lesson_id, question.text],
    )?;
    let question_id = tx.last_insert_rowid();
    for (idx, text) in question.answers.iter().enumerate() {
        insert_answer(tx, question_id, text, idx + 1 == question.correct)?;
    }
    Ok(question_id)
}

fn insert_answer(
    conn: &Connection,
    question_id: QuestionId,
    text: &str,
    is_correct: bool,
) -> DbResult<Answer> {
    conn.execute(
        "INSERT INTO answers (question_id, text, is_correct) VALUES (?1, ?2, ?3)",
        params![question_id, text, is_correct],
    )?;
    Ok(Answer {
        id: conn.last_insert_rowid(),
        question_id,
        text: text.to_string(),
        is_correct,
    })
}

fn load_answers(conn: &Connection, question_id: QuestionId) -> DbResult<Vec<Answer>> {
    let mut stmt = conn.prepare(
        "SELECT id, question_id, text, is_correct FROM answers
         WHERE question_id = ?1 ORDER BY id ASC",
    )?;
    let answers = stmt
        .query_map(params![question_id], |row| {
            Ok(Answer {
                id: row.get(0)?,
                question_id: row.get(1)?,
                text: row.get(2)?,
                is_correct: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(answers)
}

fn parse_lesson_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lesson> {
    Ok(Lesson {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        video_ref: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
