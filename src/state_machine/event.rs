//! Events that drive the session state machines

use super::editing::EditAction;
use crate::db::{LessonId, QuestionId};

/// Input to an open authoring session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthoringEvent {
    Text(String),
    /// A media reference (video file handle)
    Media(String),
    Cancel,
}

/// Input to an open editing session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditEvent {
    Text(String),
    Media(String),

    // Button selections
    LessonChosen(LessonId),
    ActionChosen(EditAction, LessonId),
    QuestionForAnswers(QuestionId),
    QuestionForCorrect(QuestionId),
    CorrectChosen {
        question_id: QuestionId,
        position: usize,
    },
    Cancel,
    Skip,

    /// Generated by the runtime when the answer cursor passes the last answer
    AnswersExhausted,
}
