//! Trait abstractions for runtime I/O
//!
//! These traits let the router and quiz engine run against mock
//! implementations in tests.

use crate::db::{
    Answer, AnswerId, Database, DbResult, Lesson, LessonId, NewLesson, Question, QuestionId,
    UserId, UserProgress,
};
use crate::transport::{ChatId, Markup, MessageId, Reply, TransportError};
use async_trait::async_trait;

/// Access to lessons, questions, answers and per-user progress
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// All lessons in stable (creation) order
    async fn list_lessons(&self) -> DbResult<Vec<Lesson>>;
    async fn get_lesson(&self, id: LessonId) -> DbResult<Lesson>;
    async fn create_lesson(
        &self,
        title: &str,
        description: Option<&str>,
        video_ref: &str,
    ) -> DbResult<Lesson>;
    /// Create a lesson with all of its questions and answers atomically
    async fn commit_lesson(&self, draft: &NewLesson) -> DbResult<Lesson>;
    async fn update_lesson_title(&self, id: LessonId, title: &str) -> DbResult<()>;
    async fn update_lesson_description(&self, id: LessonId, description: &str) -> DbResult<()>;
    async fn update_lesson_video(&self, id: LessonId, video_ref: &str) -> DbResult<()>;
    /// Cascades to the lesson's questions and answers
    async fn delete_lesson(&self, id: LessonId) -> DbResult<()>;

    async fn get_question(&self, id: QuestionId) -> DbResult<Question>;
    /// Questions of a lesson in stable order, answers loaded
    async fn list_questions(&self, lesson_id: LessonId) -> DbResult<Vec<Question>>;
    async fn create_question(&self, lesson_id: LessonId, text: &str) -> DbResult<Question>;

    async fn list_answers(&self, question_id: QuestionId) -> DbResult<Vec<Answer>>;
    async fn create_answer(
        &self,
        question_id: QuestionId,
        text: &str,
        is_correct: bool,
    ) -> DbResult<Answer>;
    async fn update_answer_text(&self, id: AnswerId, text: &str) -> DbResult<()>;
    /// Atomic clear-then-set at a 1-based position
    async fn set_correct_answer(&self, question_id: QuestionId, position: usize) -> DbResult<()>;

    async fn get_user_progress(&self, user_id: UserId) -> DbResult<Option<UserProgress>>;
    async fn upsert_progress(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        question_id: Option<QuestionId>,
    ) -> DbResult<()>;
    async fn set_current_lesson(&self, user_id: UserId, lesson_id: LessonId) -> DbResult<()>;
}

/// Outbound side of the messaging transport
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        markup: Option<&Markup>,
    ) -> Result<MessageId, TransportError>;

    /// Send a media reference previously received from the transport
    async fn send_media(&self, chat: ChatId, media: &str) -> Result<MessageId, TransportError>;

    /// Replace the text and buttons of a message sent earlier
    async fn edit_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        markup: Option<&Markup>,
    ) -> Result<(), TransportError>;

    async fn send_reply(&self, chat: ChatId, reply: &Reply) -> Result<MessageId, TransportError> {
        self.send_text(chat, &reply.text, reply.markup.as_ref())
            .await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

#[async_trait]
impl ContentStore for Database {
    async fn list_lessons(&self) -> DbResult<Vec<Lesson>> {
        Database::list_lessons(self)
    }

    async fn get_lesson(&self, id: LessonId) -> DbResult<Lesson> {
        Database::get_lesson(self, id)
    }

    async fn create_lesson(
        &self,
        title: &str,
        description: Option<&str>,
        video_ref: &str,
    ) -> DbResult<Lesson> {
        Database::create_lesson(self, title, description, video_ref)
    }

    async fn commit_lesson(&self, draft: &NewLesson) -> DbResult<Lesson> {
        Database::commit_lesson(self, draft)
    }

    async fn update_lesson_title(&self, id: LessonId, title: &str) -> DbResult<()> {
        Database::update_lesson_title(self, id, title)
    }

    async fn update_lesson_description(&self, id: LessonId, description: &str) -> DbResult<()> {
        Database::update_lesson_description(self, id, description)
    }

    async fn update_lesson_video(&self, id: LessonId, video_ref: &str) -> DbResult<()> {
        Database::update_lesson_video(self, id, video_ref)
    }

    async fn delete_lesson(&self, id: LessonId) -> DbResult<()> {
        Database::delete_lesson(self, id)
    }

    async fn get_question(&self, id: QuestionId) -> DbResult<Question> {
        Database::get_question(self, id)
    }

    async fn list_questions(&self, lesson_id: LessonId) -> DbResult<Vec<Question>> {
        Database::list_questions(self, lesson_id)
    }

    async fn create_question(&self, lesson_id: LessonId, text: &str) -> DbResult<Question> {
        Database::create_question(self, lesson_id, text)
    }

    async fn list_answers(&self, question_id: QuestionId) -> DbResult<Vec<Answer>> {
        Database::list_answers(self, question_id)
    }

    async fn create_answer(
        &self,
        question_id: QuestionId,
        text: &str,
        is_correct: bool,
    ) -> DbResult<Answer> {
        Database::create_answer(self, question_id, text, is_correct)
    }

    async fn update_answer_text(&self, id: AnswerId, text: &str) -> DbResult<()> {
        Database::update_answer_text(self, id, text)
    }

    async fn set_correct_answer(&self, question_id: QuestionId, position: usize) -> DbResult<()> {
        Database::set_correct_answer(self, question_id, position)
    }

    async fn get_user_progress(&self, user_id: UserId) -> DbResult<Option<UserProgress>> {
        Database::get_user_progress(self, user_id)
    }

    async fn upsert_progress(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        question_id: Option<QuestionId>,
    ) -> DbResult<()> {
        Database::upsert_progress(self, user_id, lesson_id, question_id)
    }

    async fn set_current_lesson(&self, user_id: UserId, lesson_id: LessonId) -> DbResult<()> {
        Database::set_current_lesson(self, user_id, lesson_id)
    }
}
