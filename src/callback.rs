//! Typed inbound events
//!
//! Raw transport updates are decoded once here: button payloads into
//! [`Callback`], recognized command text into [`Command`]. Everything
//! downstream matches on these types exhaustively.

use crate::db::{AnswerId, LessonId, QuestionId};
use crate::state_machine::EditAction;
use crate::transport::{MessageId, UpdateKind};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Malformed callback payload: {payload}")]
pub struct CallbackParseError {
    pub payload: String,
}

/// Payload of a quiz option button.
///
/// `order` is the full display permutation; it is the only record of how the
/// options were laid out when the question was rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerPayload {
    pub lesson_id: LessonId,
    pub question_id: QuestionId,
    pub chosen: AnswerId,
    pub order: Vec<AnswerId>,
}

/// Button payload micro-protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Lesson(LessonId),
    Answer(AnswerPayload),
    EditLesson(LessonId),
    EditAction(EditAction, LessonId),
    EditQuestionAnswers(QuestionId),
    EditQuestionCorrect(QuestionId),
    /// `position` is 1-based
    EditCorrect {
        question_id: QuestionId,
        position: usize,
    },
    DeleteLesson(LessonId),
    ConfirmDelete(LessonId),
    CancelDelete(LessonId),
    NextLesson,
    ChooseLesson,
    /// Marker on finalized quiz buttons; selecting it does nothing
    Answered,
    EditCancel,
    EditSkip,
    AdminMenu,
    AdminCreateLesson,
    AdminEditLesson,
    AdminDeleteLesson,
    AdminListLessons,
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Lesson(id) => write!(f, "lesson:{id}"),
            Callback::Answer(p) => {
                let order: Vec<String> = p.order.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "answer:{}:{}:{}:{}",
                    p.lesson_id,
                    p.question_id,
                    p.chosen,
                    order.join(",")
                )
            }
            Callback::EditLesson(id) => write!(f, "edit_lesson:{id}"),
            Callback::EditAction(action, id) => write!(f, "edit_action:{action}:{id}"),
            Callback::EditQuestionAnswers(id) => write!(f, "edit_question_answers:{id}"),
            Callback::EditQuestionCorrect(id) => write!(f, "edit_question_correct:{id}"),
            Callback::EditCorrect {
                question_id,
                position,
            } => write!(f, "edit_correct:{question_id}:{position}"),
            Callback::DeleteLesson(id) => write!(f, "delete_lesson:{id}"),
            Callback::ConfirmDelete(id) => write!(f, "confirm_delete:{id}"),
            Callback::CancelDelete(id) => write!(f, "cancel_delete:{id}"),
            Callback::NextLesson => f.write_str("next_lesson"),
            Callback::ChooseLesson => f.write_str("choose_lesson"),
            Callback::Answered => f.write_str("answered"),
            Callback::EditCancel => f.write_str("edit_cancel"),
            Callback::EditSkip => f.write_str("edit_skip"),
            Callback::AdminMenu => f.write_str("admin_menu"),
            Callback::AdminCreateLesson => f.write_str("admin_create_lesson"),
            Callback::AdminEditLesson => f.write_str("admin_edit_lesson"),
            Callback::AdminDeleteLesson => f.write_str("admin_delete_lesson"),
            Callback::AdminListLessons => f.write_str("admin_list_lessons"),
        }
    }
}

impl FromStr for Callback {
    type Err = CallbackParseError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let malformed = || CallbackParseError {
            payload: payload.to_string(),
        };

        let fixed = match payload {
            "next_lesson" => Some(Callback::NextLesson),
            "choose_lesson" => Some(Callback::ChooseLesson),
            "answered" => Some(Callback::Answered),
            "edit_cancel" => Some(Callback::EditCancel),
            "edit_skip" => Some(Callback::EditSkip),
            "admin_menu" => Some(Callback::AdminMenu),
            "admin_create_lesson" => Some(Callback::AdminCreateLesson),
            "admin_edit_lesson" => Some(Callback::AdminEditLesson),
            "admin_delete_lesson" => Some(Callback::AdminDeleteLesson),
            "admin_list_lessons" => Some(Callback::AdminListLessons),
            _ => None,
        };
        if let Some(callback) = fixed {
            return Ok(callback);
        }

        let (prefix, rest) = payload.split_once(':').ok_or_else(malformed)?;
        let id = |s: &str| s.parse::<i64>().map_err(|_| malformed());

        match prefix {
            "lesson" => Ok(Callback::Lesson(id(rest)?)),
            "answer" => parse_answer(rest).ok_or_else(malformed),
            "edit_lesson" => Ok(Callback::EditLesson(id(rest)?)),
            "edit_action" => {
                let (action, lesson) = rest.split_once(':').ok_or_else(malformed)?;
                let action = action.parse::<EditAction>().map_err(|_| malformed())?;
                Ok(Callback::EditAction(action, id(lesson)?))
            }
            "edit_question_answers" => Ok(Callback::EditQuestionAnswers(id(rest)?)),
            "edit_question_correct" => Ok(Callback::EditQuestionCorrect(id(rest)?)),
            "edit_correct" => {
                let (question, position) = rest.split_once(':').ok_or_else(malformed)?;
                Ok(Callback::EditCorrect {
                    question_id: id(question)?,
                    position: position.parse().map_err(|_| malformed())?,
                })
            }
            "delete_lesson" => Ok(Callback::DeleteLesson(id(rest)?)),
            "confirm_delete" => Ok(Callback::ConfirmDelete(id(rest)?)),
            "cancel_delete" => Ok(Callback::CancelDelete(id(rest)?)),
            _ => Err(malformed()),
        }
    }
}

/// `<lessonId>:<questionId>:<chosenId>:<csv order>`; the order segment keeps
/// any further colons, matching a split limited to five parts overall.
fn parse_answer(rest: &str) -> Option<Callback> {
    let mut parts = rest.splitn(4, ':');
    let lesson_id = parts.next()?.parse().ok()?;
    let question_id = parts.next()?.parse().ok()?;
    let chosen = parts.next()?.parse().ok()?;
    let order = match parts.next() {
        None | Some("") => Vec::new(),
        Some(csv) => csv
            .split(',')
            .map(|id| id.trim().parse().ok())
            .collect::<Option<Vec<AnswerId>>>()?,
    };
    Some(Callback::Answer(AnswerPayload {
        lesson_id,
        question_id,
        chosen,
        order,
    }))
}

// ============================================================================
// Commands
// ============================================================================

pub const START_LABEL: &str = "📚 Start quiz";
pub const PROFILE_LABEL: &str = "📊 Profile";
pub const HELP_LABEL: &str = "❓ Help";
pub const ADMIN_LABEL: &str = "🔧 Admin menu";

/// Static text commands and their main-menu keyboard equivalents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    AdminMenu,
    Help,
    Profile,
    CreateLesson,
    EditLesson,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "/start" | START_LABEL => Some(Command::Start),
            "/menu" | "/admin" | ADMIN_LABEL => Some(Command::AdminMenu),
            "/help" | HELP_LABEL => Some(Command::Help),
            "/profile" | PROFILE_LABEL => Some(Command::Profile),
            "/lesson_create" => Some(Command::CreateLesson),
            "/edit_lesson" => Some(Command::EditLesson),
            _ => None,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// A decoded inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Recognized command text. `raw` is kept because an open session owns
    /// all text, commands included.
    Command { command: Command, raw: String },
    Button {
        message_id: MessageId,
        callback: Callback,
    },
    TextInput(String),
    MediaInput(String),
}

impl Event {
    pub fn decode(kind: UpdateKind) -> Result<Self, CallbackParseError> {
        match kind {
            UpdateKind::Callback {
                message_id,
                callback,
            } => Ok(Event::Button {
                message_id,
                callback: callback.parse()?,
            }),
            UpdateKind::Video { video } => Ok(Event::MediaInput(video)),
            UpdateKind::Text { text } => Ok(match Command::parse(&text) {
                Some(command) => Event::Command { command, raw: text },
                None => Event::TextInput(text),
            }),
        }
    }
}
