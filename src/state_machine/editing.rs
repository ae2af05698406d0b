//! Lesson editing dialog

use super::{check_text, EditEvent, Effect, QuestionPurpose, Transition, TransitionError};
use crate::db::{LessonId, QuestionId, MAX_ANSWER_LEN, MAX_DESCRIPTION_LEN, MAX_TITLE_LEN};
use std::fmt;
use std::str::FromStr;

/// What an editing session changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAction {
    Title,
    Video,
    Description,
    Answers,
    Correct,
}

impl EditAction {
    pub const ALL: [EditAction; 5] = [
        EditAction::Title,
        EditAction::Video,
        EditAction::Description,
        EditAction::Answers,
        EditAction::Correct,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EditAction::Title => "title",
            EditAction::Video => "video",
            EditAction::Description => "description",
            EditAction::Answers => "answers",
            EditAction::Correct => "correct",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EditAction::Title => "1️⃣ Change title",
            EditAction::Video => "2️⃣ Change video",
            EditAction::Description => "3️⃣ Change description",
            EditAction::Answers => "4️⃣ Edit answer options",
            EditAction::Correct => "5️⃣ Change correct answer",
        }
    }
}

impl fmt::Display for EditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown edit action: {s}"))
    }
}

/// An open editing dialog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditSession {
    pub step: EditStep,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EditStep {
    #[default]
    SelectLesson,
    SelectAction {
        lesson_id: LessonId,
    },
    EditTitle {
        lesson_id: LessonId,
    },
    EditVideo {
        lesson_id: LessonId,
    },
    EditDescription {
        lesson_id: LessonId,
    },
    SelectQuestionForAnswers {
        lesson_id: LessonId,
    },
    /// Bounded loop over the question's answers; `cursor` is 0-based
    EditAnswer {
        question_id: QuestionId,
        cursor: usize,
    },
    SelectQuestionForCorrect {
        lesson_id: LessonId,
    },
    SelectCorrectAnswer {
        question_id: QuestionId,
    },
}

impl EditSession {
    /// Fresh session plus the lesson picker
    pub fn begin() -> Transition<Self> {
        Transition::to(Self::default()).with_effect(Effect::ShowEditableLessons)
    }

    #[allow(dead_code)] // Used in tests
    pub fn action(&self) -> Option<EditAction> {
        match self.step {
            EditStep::SelectLesson | EditStep::SelectAction { .. } => None,
            EditStep::EditTitle { .. } => Some(EditAction::Title),
            EditStep::EditVideo { .. } => Some(EditAction::Video),
            EditStep::EditDescription { .. } => Some(EditAction::Description),
            EditStep::SelectQuestionForAnswers { .. } | EditStep::EditAnswer { .. } => {
                Some(EditAction::Answers)
            }
            EditStep::SelectQuestionForCorrect { .. } | EditStep::SelectCorrectAnswer { .. } => {
                Some(EditAction::Correct)
            }
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn question_id(&self) -> Option<QuestionId> {
        match self.step {
            EditStep::EditAnswer { question_id, .. }
            | EditStep::SelectCorrectAnswer { question_id } => Some(question_id),
            _ => None,
        }
    }
}

fn at(step: EditStep) -> EditSession {
    EditSession { step }
}

fn reprompt(
    session: &EditSession,
    text: impl Into<String>,
) -> Result<Transition<EditSession>, TransitionError> {
    Ok(Transition::to(session.clone()).with_effect(Effect::prompt(text)))
}

/// Leaf transitions end the session and return to the admin menu
fn done(effects: impl IntoIterator<Item = Effect>) -> Transition<EditSession> {
    Transition::finish()
        .with_effects(effects)
        .with_effect(Effect::ShowAdminMenu)
}

/// Pure transition function for the editing dialog
pub fn transition(
    session: &EditSession,
    event: EditEvent,
) -> Result<Transition<EditSession>, TransitionError> {
    match (&session.step, event) {
        // ============================================================
        // Global transitions
        // ============================================================
        (_, EditEvent::Cancel) => {
            Ok(Transition::finish().with_effect(Effect::reply("❌ Changes cancelled.")))
        }

        // Menu buttons carry their own ids, so an older menu still works
        (_, EditEvent::LessonChosen(lesson_id)) => {
            Ok(Transition::to(at(EditStep::SelectAction { lesson_id }))
                .with_effect(Effect::ShowActionMenu { lesson_id }))
        }

        (_, EditEvent::ActionChosen(action, lesson_id)) => Ok(choose_action(action, lesson_id)),

        (_, EditEvent::QuestionForAnswers(question_id)) => Ok(Transition::to(at(
            EditStep::EditAnswer {
                question_id,
                cursor: 0,
            },
        ))
        .with_effect(Effect::BeginAnswerEditing { question_id })),

        (_, EditEvent::QuestionForCorrect(question_id)) => {
            Ok(Transition::to(at(EditStep::SelectCorrectAnswer { question_id }))
                .with_effect(Effect::ShowCorrectPicker { question_id }))
        }

        (
            _,
            EditEvent::CorrectChosen {
                question_id,
                position,
            },
        ) => Ok(done([
            Effect::SetCorrectAnswer {
                question_id,
                position,
            },
            Effect::reply("✅ Correct answer updated!"),
        ])),

        // ============================================================
        // Free-text leaves
        // ============================================================
        (EditStep::EditTitle { lesson_id }, EditEvent::Text(title)) => {
            if let Err(msg) = check_text(&title, MAX_TITLE_LEN) {
                return reprompt(session, msg);
            }
            Ok(done([
                Effect::UpdateTitle {
                    lesson_id: *lesson_id,
                    title,
                },
                Effect::reply("✅ Title updated!"),
            ]))
        }

        (EditStep::EditDescription { lesson_id }, EditEvent::Text(description)) => {
            if let Err(msg) = check_text(&description, MAX_DESCRIPTION_LEN) {
                return reprompt(session, msg);
            }
            Ok(done([
                Effect::UpdateDescription {
                    lesson_id: *lesson_id,
                    description,
                },
                Effect::reply("✅ Description updated!"),
            ]))
        }

        (EditStep::EditVideo { lesson_id }, EditEvent::Media(video_ref)) => Ok(done([
            Effect::UpdateVideo {
                lesson_id: *lesson_id,
                video_ref,
            },
            Effect::reply("✅ Video updated!"),
        ])),

        (EditStep::EditVideo { .. }, EditEvent::Text(_)) => {
            reprompt(session, "Please send a video file.")
        }

        // ============================================================
        // Answer loop
        // ============================================================
        (
            EditStep::EditAnswer {
                question_id,
                cursor,
            },
            EditEvent::Text(text),
        ) => {
            if let Err(msg) = check_text(&text, MAX_ANSWER_LEN) {
                return reprompt(session, msg);
            }
            Ok(advance_answer(*question_id, *cursor).with_effects([
                Effect::UpdateAnswerAt {
                    question_id: *question_id,
                    position: *cursor,
                    text,
                },
                Effect::PromptAnswer {
                    question_id: *question_id,
                    position: cursor + 1,
                },
            ]))
        }

        (
            EditStep::EditAnswer {
                question_id,
                cursor,
            },
            EditEvent::Skip,
        ) => Ok(
            advance_answer(*question_id, *cursor).with_effect(Effect::PromptAnswer {
                question_id: *question_id,
                position: cursor + 1,
            }),
        ),

        (EditStep::EditAnswer { .. }, EditEvent::AnswersExhausted) => {
            Ok(done([Effect::reply("✅ Answer editing finished!")]))
        }

        (_, EditEvent::Skip) => Err(TransitionError::InvalidTransition(
            "nothing to skip outside answer editing".to_string(),
        )),

        (_, EditEvent::AnswersExhausted) => Err(TransitionError::InvalidTransition(
            "answer cursor is not active".to_string(),
        )),

        // ============================================================
        // Wrong input kind for the step
        // ============================================================
        (
            EditStep::SelectLesson
            | EditStep::SelectAction { .. }
            | EditStep::SelectQuestionForAnswers { .. }
            | EditStep::SelectQuestionForCorrect { .. }
            | EditStep::SelectCorrectAnswer { .. },
            EditEvent::Text(_) | EditEvent::Media(_),
        ) => reprompt(session, "Please choose one of the options above."),

        (
            EditStep::EditTitle { .. } | EditStep::EditDescription { .. } | EditStep::EditAnswer { .. },
            EditEvent::Media(_),
        ) => reprompt(session, "Please answer with text."),
    }
}

fn choose_action(action: EditAction, lesson_id: LessonId) -> Transition<EditSession> {
    match action {
        EditAction::Title => Transition::to(at(EditStep::EditTitle { lesson_id }))
            .with_effect(Effect::PromptTitle { lesson_id }),
        EditAction::Video => Transition::to(at(EditStep::EditVideo { lesson_id }))
            .with_effect(Effect::prompt("Send the new video for the lesson:")),
        EditAction::Description => Transition::to(at(EditStep::EditDescription { lesson_id }))
            .with_effect(Effect::PromptDescription { lesson_id }),
        EditAction::Answers => Transition::to(at(EditStep::SelectQuestionForAnswers { lesson_id }))
            .with_effect(Effect::ShowQuestionPicker {
                lesson_id,
                purpose: QuestionPurpose::Answers,
            }),
        EditAction::Correct => Transition::to(at(EditStep::SelectQuestionForCorrect { lesson_id }))
            .with_effect(Effect::ShowQuestionPicker {
                lesson_id,
                purpose: QuestionPurpose::Correct,
            }),
    }
}

fn advance_answer(question_id: QuestionId, cursor: usize) -> Transition<EditSession> {
    Transition::to(at(EditStep::EditAnswer {
        question_id,
        cursor: cursor + 1,
    }))
}
