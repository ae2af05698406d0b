//! Effects produced by session transitions

use crate::db::{LessonId, NewLesson, QuestionId};
use crate::transport::Reply;

/// Which flow a question picker feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionPurpose {
    Answers,
    Correct,
}

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send a message to the user
    Reply(Reply),

    /// Show the admin menu
    ShowAdminMenu,

    /// Write a collected lesson in one transaction and report its id
    CommitLesson(NewLesson),

    /// List lessons with `edit_lesson` buttons
    ShowEditableLessons,

    /// List the five edit actions for a lesson
    ShowActionMenu { lesson_id: LessonId },

    /// Show the current title and ask for a new one
    PromptTitle { lesson_id: LessonId },

    /// Show the current description and ask for a new one
    PromptDescription { lesson_id: LessonId },

    ShowQuestionPicker {
        lesson_id: LessonId,
        purpose: QuestionPurpose,
    },

    /// Show the question text, then prompt for its first answer
    BeginAnswerEditing { question_id: QuestionId },

    /// Prompt for the answer at a 0-based position. Past the last answer the
    /// runtime feeds `EditEvent::AnswersExhausted` back instead.
    PromptAnswer {
        question_id: QuestionId,
        position: usize,
    },

    UpdateTitle { lesson_id: LessonId, title: String },
    UpdateDescription {
        lesson_id: LessonId,
        description: String,
    },
    UpdateVideo {
        lesson_id: LessonId,
        video_ref: String,
    },

    /// Rewrite the answer at a 0-based position
    UpdateAnswerAt {
        question_id: QuestionId,
        position: usize,
        text: String,
    },

    /// List answers with the current correct one marked
    ShowCorrectPicker { question_id: QuestionId },

    /// Atomically move the correct flag to a 1-based position
    SetCorrectAnswer {
        question_id: QuestionId,
        position: usize,
    },
}

impl Effect {
    pub fn reply(text: impl Into<String>) -> Self {
        Effect::Reply(Reply::text(text))
    }

    /// Reply carrying the cancel button
    pub fn prompt(text: impl Into<String>) -> Self {
        Effect::Reply(Reply::text(text).with_cancel())
    }
}
