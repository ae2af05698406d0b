//! Lesson authoring dialog
//!
//! Collects title, description, video and three questions of four answers
//! each, one step per inbound event, then emits a single commit.

use super::{check_text, AuthoringEvent, Effect, Transition, TransitionError};
use crate::db::{
    NewLesson, NewQuestion, ANSWERS_PER_QUESTION, MAX_ANSWER_LEN, MAX_DESCRIPTION_LEN,
    MAX_QUESTION_LEN, MAX_TITLE_LEN, QUESTIONS_PER_LESSON,
};

const CORRECT_INDEX_REPROMPT: &str = "Please enter a number from 1 to 4:";

/// An open authoring dialog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthoringSession {
    pub step: AuthoringStep,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthoringStep {
    #[default]
    Title,
    Description {
        title: String,
    },
    Video {
        title: String,
        description: String,
    },
    Questions {
        header: LessonHeader,
        /// Questions fully collected so far, in input order
        completed: Vec<NewQuestion>,
        current: QuestionDraft,
    },
}

/// Title, description and video, fixed once the question steps begin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonHeader {
    pub title: String,
    pub description: String,
    pub video_ref: String,
}

/// The question currently being filled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum QuestionDraft {
    #[default]
    AwaitingText,
    AwaitingAnswers {
        text: String,
        answers: Vec<String>,
    },
    AwaitingCorrect {
        text: String,
        answers: Vec<String>,
    },
}

impl AuthoringSession {
    /// Fresh session plus the opening prompt
    pub fn begin() -> Transition<Self> {
        Transition::to(Self::default())
            .with_effect(Effect::prompt("Creating a new lesson\n\nTitle?"))
    }

    /// 1-based number of the question being filled, if past the video step
    #[allow(dead_code)] // Used in tests
    pub fn question_number(&self) -> Option<usize> {
        match &self.step {
            AuthoringStep::Questions { completed, .. } => Some(completed.len() + 1),
            _ => None,
        }
    }
}

fn at(step: AuthoringStep) -> AuthoringSession {
    AuthoringSession { step }
}

/// Re-prompt without changing the session
fn reprompt(
    session: &AuthoringSession,
    text: impl Into<String>,
) -> Result<Transition<AuthoringSession>, TransitionError> {
    Ok(Transition::to(session.clone()).with_effect(Effect::prompt(text)))
}

/// Pure transition function for the authoring dialog
pub fn transition(
    session: &AuthoringSession,
    event: AuthoringEvent,
) -> Result<Transition<AuthoringSession>, TransitionError> {
    match (&session.step, event) {
        (_, AuthoringEvent::Cancel) => {
            Ok(Transition::finish().with_effect(Effect::reply("❌ Lesson creation cancelled.")))
        }

        // ============================================================
        // Title and description
        // ============================================================
        (AuthoringStep::Title, AuthoringEvent::Text(title)) => {
            if let Err(msg) = check_text(&title, MAX_TITLE_LEN) {
                return reprompt(session, msg);
            }
            Ok(Transition::to(at(AuthoringStep::Description { title }))
                .with_effect(Effect::prompt("Description?")))
        }

        (AuthoringStep::Description { title }, AuthoringEvent::Text(description)) => {
            if let Err(msg) = check_text(&description, MAX_DESCRIPTION_LEN) {
                return reprompt(session, msg);
            }
            Ok(Transition::to(at(AuthoringStep::Video {
                title: title.clone(),
                description,
            }))
            .with_effect(Effect::prompt("Send the video")))
        }

        // Media before the video step is dropped without a reply
        (
            AuthoringStep::Title | AuthoringStep::Description { .. },
            AuthoringEvent::Media(_),
        ) => Ok(Transition::to(session.clone())),

        // ============================================================
        // Video
        // ============================================================
        (AuthoringStep::Video { .. }, AuthoringEvent::Text(_)) => {
            reprompt(session, "Please send a video file.")
        }

        (AuthoringStep::Video { title, description }, AuthoringEvent::Media(video_ref)) => {
            let header = LessonHeader {
                title: title.clone(),
                description: description.clone(),
                video_ref,
            };
            Ok(Transition::to(at(AuthoringStep::Questions {
                header,
                completed: Vec::new(),
                current: QuestionDraft::AwaitingText,
            }))
            .with_effect(Effect::prompt(question_prompt(1))))
        }

        // ============================================================
        // Questions
        // ============================================================
        (AuthoringStep::Questions { .. }, AuthoringEvent::Media(_)) => {
            reprompt(session, "Please answer with text.")
        }

        (
            AuthoringStep::Questions {
                header,
                completed,
                current,
            },
            AuthoringEvent::Text(input),
        ) => question_step(session, header, completed, current, input),
    }
}

fn question_step(
    session: &AuthoringSession,
    header: &LessonHeader,
    completed: &[NewQuestion],
    current: &QuestionDraft,
    input: String,
) -> Result<Transition<AuthoringSession>, TransitionError> {
    let number = completed.len() + 1;
    let with_current = |current: QuestionDraft| {
        at(AuthoringStep::Questions {
            header: header.clone(),
            completed: completed.to_vec(),
            current,
        })
    };

    match current {
        QuestionDraft::AwaitingText => {
            if let Err(msg) = check_text(&input, MAX_QUESTION_LEN) {
                return reprompt(session, msg);
            }
            Ok(Transition::to(with_current(QuestionDraft::AwaitingAnswers {
                text: input,
                answers: Vec::new(),
            }))
            .with_effect(Effect::prompt(format!(
                "Question {number}/{QUESTIONS_PER_LESSON}\n4 answer options? \
                 (send them all comma-separated or one at a time)"
            ))))
        }

        QuestionDraft::AwaitingAnswers { text, answers } => {
            let incoming = match split_answers(&input) {
                Some(batch) => batch,
                None => vec![input],
            };
            for answer in &incoming {
                if let Err(msg) = check_text(answer, MAX_ANSWER_LEN) {
                    return reprompt(session, msg);
                }
            }

            let remaining = ANSWERS_PER_QUESTION - answers.len();
            let mut answers = answers.clone();
            answers.extend(incoming.into_iter().take(remaining));

            if answers.len() < ANSWERS_PER_QUESTION {
                let count = answers.len();
                Ok(Transition::to(with_current(QuestionDraft::AwaitingAnswers {
                    text: text.clone(),
                    answers,
                }))
                .with_effect(Effect::prompt(format!(
                    "Answers added: {count}/{ANSWERS_PER_QUESTION}. Enter the next answer:"
                ))))
            } else {
                Ok(Transition::to(with_current(QuestionDraft::AwaitingCorrect {
                    text: text.clone(),
                    answers,
                }))
                .with_effect(Effect::prompt("Which one is correct (1-4)?")))
            }
        }

        QuestionDraft::AwaitingCorrect { text, answers } => {
            let Some(correct) = parse_correct_index(&input) else {
                return reprompt(session, CORRECT_INDEX_REPROMPT);
            };

            let mut completed = completed.to_vec();
            completed.push(NewQuestion {
                text: text.clone(),
                answers: answers.clone(),
                correct,
            });

            if completed.len() < QUESTIONS_PER_LESSON {
                let next_number = completed.len() + 1;
                return Ok(Transition::to(at(AuthoringStep::Questions {
                    header: header.clone(),
                    completed,
                    current: QuestionDraft::AwaitingText,
                }))
                .with_effect(Effect::prompt(question_prompt(next_number))));
            }

            let lesson = NewLesson {
                title: header.title.clone(),
                description: header.description.clone(),
                video_ref: header.video_ref.clone(),
                questions: completed,
            };
            if lesson.is_complete() {
                Ok(Transition::finish().with_effect(Effect::CommitLesson(lesson)))
            } else {
                Ok(Transition::finish().with_effect(Effect::reply(
                    "❌ Error: some lesson data is missing. Start over with /lesson_create",
                )))
            }
        }
    }
}

fn question_prompt(number: usize) -> String {
    format!("Question {number}/{QUESTIONS_PER_LESSON}\nQuestion?")
}

/// A message with at least four comma-separated segments is a batch; the
/// first four segments are used, trimmed.
fn split_answers(input: &str) -> Option<Vec<String>> {
    let segments: Vec<&str> = input.split(',').collect();
    if segments.len() < ANSWERS_PER_QUESTION {
        return None;
    }
    Some(
        segments
            .into_iter()
            .take(ANSWERS_PER_QUESTION)
            .map(|s| s.trim().to_string())
            .collect(),
    )
}

fn parse_correct_index(input: &str) -> Option<usize> {
    input
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|idx| (1..=ANSWERS_PER_QUESTION).contains(idx))
}
