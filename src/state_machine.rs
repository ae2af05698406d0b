//! Session state machines
//!
//! Authoring and editing dialogs follow the Elm Architecture: a pure
//! `transition` maps the current session and one event to the next session
//! (or none, when the dialog ends) plus a list of effects for the runtime to
//! execute.

pub mod authoring;
mod effect;
pub mod editing;
pub mod event;


pub use authoring::AuthoringSession;
pub use editing::{EditAction, EditSession};
pub use effect::{Effect, QuestionPurpose};
pub use event::{AuthoringEvent, EditEvent};

use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct Transition<S> {
    /// `None` ends the session
    pub next: Option<S>,
    pub effects: Vec<Effect>,
}

impl<S> Transition<S> {
    pub fn to(state: S) -> Self {
        Self {
            next: Some(state),
            effects: vec![],
        }
    }

    pub fn finish() -> Self {
        Self {
            next: None,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_finished(&self) -> bool {
        self.next.is_none()
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Check free text against a length bound. Returns the re-prompt on failure.
pub(crate) fn check_text(text: &str, max_len: usize) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("The text cannot be empty. Try again:".to_string());
    }
    let len = text.chars().count();
    if len > max_len {
        return Err(format!(
            "Too long ({len} characters, at most {max_len} allowed). Try again:"
        ));
    }
    Ok(())
}
