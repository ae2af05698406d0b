//! Dialog router
//!
//! Decides which flow owns an inbound event and executes the effects the
//! session state machines produce. An open authoring session owns all text
//! and media, then an open editing session does; only after that are static
//! commands and buttons matched.

mod dispatch;
mod traits;
pub mod views;

#[cfg(test)]
mod testing;

pub use dispatch::Dispatcher;
pub use traits::{ContentStore, Transport};

use crate::callback::{Callback, CallbackParseError, Command, Event};
use crate::config::BotConfig;
use crate::db::{DbError, LessonId, QuestionId, UserId};
use crate::quiz::QuizEngine;
use crate::session::SessionRegistry;
use crate::state_machine::{
    authoring, editing, AuthoringEvent, AuthoringSession, EditEvent, EditSession, Effect,
    QuestionPurpose, Transition, TransitionError,
};
use crate::transport::{ChatId, MessageId, Reply, TransportError, Update};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Callback(#[from] CallbackParseError),
}

impl BotError {
    /// Message for failures the user can act on; `None` for unexpected ones
    fn user_message(&self) -> Option<String> {
        match self {
            BotError::Db(DbError::LessonNotFound(_)) => Some("❌ Lesson not found.".to_string()),
            BotError::Db(DbError::QuestionNotFound(_)) => {
                Some("❌ Question not found.".to_string())
            }
            BotError::Db(DbError::AnswerNotFound(_)) => Some("❌ Answer not found.".to_string()),
            BotError::Db(DbError::InvalidAnswerPosition { position, count }) => Some(format!(
                "❌ There is no answer number {position}; the question has {count} answers."
            )),
            _ => None,
        }
    }
}

/// Which flow an event was routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Authoring,
    Editing,
    Static,
}

/// The bot: routes events for every user
pub struct Bot<S, T> {
    config: BotConfig,
    store: Arc<S>,
    transport: Arc<T>,
    authoring: SessionRegistry<AuthoringSession>,
    editing: SessionRegistry<EditSession>,
    quiz: QuizEngine<S, T>,
}

impl<S, T> Bot<S, T>
where
    S: ContentStore + 'static,
    T: Transport + 'static,
{
    pub fn new(config: BotConfig, store: Arc<S>, transport: Arc<T>) -> Self {
        let quiz = QuizEngine::new(Arc::clone(&store), Arc::clone(&transport), config.pacing);
        Self {
            config,
            store,
            transport,
            authoring: SessionRegistry::new(),
            editing: SessionRegistry::new(),
            quiz,
        }
    }

    /// Decode and dispatch one transport update
    pub async fn handle(&self, update: Update) {
        let user = update.user;
        match Event::decode(update.kind) {
            Ok(event) => self.dispatch(user, event).await,
            Err(e) => {
                tracing::warn!(user_id = user, error = %e, "Dropping malformed button payload");
                self.report_failure(user, Flow::Static, &BotError::from(e))
                    .await;
            }
        }
    }

    pub async fn dispatch(&self, user: UserId, event: Event) {
        let flow = self.route(user, &event);
        tracing::debug!(user_id = user, ?flow, ?event, "Routing event");

        let result = match flow {
            Flow::Authoring => self.handle_authoring(user, event).await,
            Flow::Editing => self.handle_editing(user, event).await,
            Flow::Static => self.handle_static(user, event).await,
        };
        if let Err(e) = result {
            self.report_failure(user, flow, &e).await;
        }
    }

    fn route(&self, user: UserId, event: &Event) -> Flow {
        let is_input = matches!(
            event,
            Event::Command { .. } | Event::TextInput(_) | Event::MediaInput(_)
        );
        let is_cancel = matches!(
            event,
            Event::Button {
                callback: Callback::EditCancel,
                ..
            }
        );

        if (is_input || is_cancel) && self.authoring.has_active(user) {
            Flow::Authoring
        } else if is_input && self.editing.has_active(user) {
            Flow::Editing
        } else if let Event::Button { callback, .. } = event {
            if is_edit_callback(callback) {
                Flow::Editing
            } else {
                Flow::Static
            }
        } else {
            Flow::Static
        }
    }

    // ========================================================================
    // Authoring
    // ========================================================================

    async fn handle_authoring(&self, user: UserId, event: Event) -> Result<(), BotError> {
        let input = match event {
            Event::Command { raw, .. } => AuthoringEvent::Text(raw),
            Event::TextInput(text) => AuthoringEvent::Text(text),
            Event::MediaInput(media) => AuthoringEvent::Media(media),
            Event::Button { .. } => AuthoringEvent::Cancel,
        };
        let Some(result) = self
            .authoring
            .apply(user, |session| authoring::transition(session, input))
        else {
            return Ok(());
        };
        self.execute_effects(user, result?).await
    }

    async fn start_authoring(&self, user: UserId) -> Result<(), BotError> {
        if !self.config.is_admin(user) {
            return self
                .reply(user, "❌ You do not have permission to create lessons.")
                .await;
        }
        self.editing.clear(user);
        let Transition { next, effects } = AuthoringSession::begin();
        if let Some(session) = next {
            if self.authoring.start(user, session) {
                tracing::info!(user_id = user, "Replaced unfinished authoring session");
            }
        }
        tracing::info!(user_id = user, "Authoring session started");
        self.execute_effects(user, effects).await
    }

    // ========================================================================
    // Editing
    // ========================================================================

    async fn handle_editing(&self, user: UserId, event: Event) -> Result<(), BotError> {
        let (input, create) = match event {
            Event::Command { raw, .. } => (EditEvent::Text(raw), false),
            Event::TextInput(text) => (EditEvent::Text(text), false),
            Event::MediaInput(media) => (EditEvent::Media(media), false),
            Event::Button { callback, .. } => match callback {
                Callback::EditCancel => (EditEvent::Cancel, false),
                Callback::EditSkip => (EditEvent::Skip, false),
                other => {
                    if !self.config.is_admin(user) {
                        return self
                            .reply(user, "❌ You do not have permission to edit lessons.")
                            .await;
                    }
                    let Some(input) = edit_event_for(other) else {
                        return Ok(());
                    };
                    // One dialog per user: an edit menu button ends authoring
                    if self.authoring.clear(user) {
                        tracing::info!(user_id = user, "Authoring session abandoned for editing");
                    }
                    (input, true)
                }
            },
        };
        self.run_edit(user, input, create).await
    }

    /// Feed an event through the editing machine, plus any events its
    /// effects generate.
    async fn run_edit(&self, user: UserId, event: EditEvent, create: bool) -> Result<(), BotError> {
        let mut pending = vec![event];
        let mut create = create;

        while let Some(event) = pending.pop() {
            let step = |session: &EditSession| editing::transition(session, event);
            let effects = if create {
                self.editing.apply_or_create(user, step)?
            } else if let Some(result) = self.editing.apply(user, step) {
                result?
            } else {
                tracing::debug!(user_id = user, "No editing session, ignoring event");
                return Ok(());
            };
            create = false;

            for effect in effects {
                if let Some(generated) = self.execute_effect(user, effect).await? {
                    pending.push(generated);
                }
            }
        }
        Ok(())
    }

    async fn start_editing(&self, user: UserId) -> Result<(), BotError> {
        if !self.config.is_admin(user) {
            return self
                .reply(user, "❌ You do not have permission to edit lessons.")
                .await;
        }
        self.authoring.clear(user);
        let Transition { next, effects } = EditSession::begin();
        if let Some(session) = next {
            self.editing.start(user, session);
        }
        tracing::info!(user_id = user, "Editing session started");
        self.execute_effects(user, effects).await
    }

    // ========================================================================
    // Effects
    // ========================================================================

    async fn execute_effects(&self, user: UserId, effects: Vec<Effect>) -> Result<(), BotError> {
        for effect in effects {
            // Only the editing answer loop generates events
            if let Some(generated) = self.execute_effect(user, effect).await? {
                self.run_edit(user, generated, false).await?;
            }
        }
        Ok(())
    }

    async fn execute_effect(
        &self,
        user: UserId,
        effect: Effect,
    ) -> Result<Option<EditEvent>, BotError> {
        match effect {
            Effect::Reply(reply) => {
                self.transport.send_reply(user, &reply).await?;
            }

            Effect::ShowAdminMenu => {
                self.transport.send_reply(user, &views::admin_menu()).await?;
            }

            Effect::CommitLesson(draft) => {
                let lesson = self.store.commit_lesson(&draft).await?;
                tracing::info!(user_id = user, lesson_id = lesson.id, "Lesson created");
                self.reply(
                    user,
                    format!("✅ Lesson \"{}\" created! (ID: {})", lesson.title, lesson.id),
                )
                .await?;
                if self.config.is_admin(user) {
                    self.transport.send_reply(user, &views::admin_menu()).await?;
                }
            }

            Effect::ShowEditableLessons => {
                let lessons = self.store.list_lessons().await?;
                if lessons.is_empty() {
                    self.editing.clear(user);
                    self.reply(user, views::NO_LESSONS).await?;
                } else {
                    let reply = views::admin_lesson_list(
                        "Choose a lesson to edit:",
                        &lessons,
                        Callback::EditLesson,
                    );
                    self.transport.send_reply(user, &reply).await?;
                }
            }

            Effect::ShowActionMenu { lesson_id } => {
                let lesson = self.store.get_lesson(lesson_id).await?;
                self.transport
                    .send_reply(user, &views::action_menu(&lesson))
                    .await?;
            }

            Effect::PromptTitle { lesson_id } => {
                let lesson = self.store.get_lesson(lesson_id).await?;
                let reply = Reply::text(format!(
                    "Current title:\n{}\n\nEnter the new title:",
                    lesson.title
                ))
                .with_cancel();
                self.transport.send_reply(user, &reply).await?;
            }

            Effect::PromptDescription { lesson_id } => {
                let lesson = self.store.get_lesson(lesson_id).await?;
                let reply = Reply::text(format!(
                    "Current description:\n{}\n\nEnter the new description:",
                    lesson.description.as_deref().unwrap_or("(no description)")
                ))
                .with_cancel();
                self.transport.send_reply(user, &reply).await?;
            }

            Effect::ShowQuestionPicker { lesson_id, purpose } => {
                self.show_question_picker(user, lesson_id, purpose).await?;
            }

            Effect::BeginAnswerEditing { question_id } => {
                let question = self.store.get_question(question_id).await?;
                self.reply(user, format!("Question:\n{}", question.text))
                    .await?;
                return self.prompt_answer(user, question_id, 0).await;
            }

            Effect::PromptAnswer {
                question_id,
                position,
            } => return self.prompt_answer(user, question_id, position).await,

            Effect::UpdateTitle { lesson_id, title } => {
                self.store.update_lesson_title(lesson_id, &title).await?;
                tracing::info!(user_id = user, lesson_id, "Lesson title updated");
            }

            Effect::UpdateDescription {
                lesson_id,
                description,
            } => {
                self.store
                    .update_lesson_description(lesson_id, &description)
                    .await?;
                tracing::info!(user_id = user, lesson_id, "Lesson description updated");
            }

            Effect::UpdateVideo {
                lesson_id,
                video_ref,
            } => {
                self.store.update_lesson_video(lesson_id, &video_ref).await?;
                tracing::info!(user_id = user, lesson_id, "Lesson video updated");
            }

            Effect::UpdateAnswerAt {
                question_id,
                position,
                text,
            } => {
                let answers = self.store.list_answers(question_id).await?;
                let answer = answers.get(position).ok_or(DbError::InvalidAnswerPosition {
                    position: position + 1,
                    count: answers.len(),
                })?;
                self.store.update_answer_text(answer.id, &text).await?;
                tracing::info!(user_id = user, question_id, position, "Answer text updated");
            }

            Effect::ShowCorrectPicker { question_id } => {
                let question = self.store.get_question(question_id).await?;
                self.transport
                    .send_reply(user, &views::correct_picker(&question))
                    .await?;
            }

            Effect::SetCorrectAnswer {
                question_id,
                position,
            } => {
                self.store.set_correct_answer(question_id, position).await?;
                tracing::info!(user_id = user, question_id, position, "Correct answer moved");
            }
        }
        Ok(None)
    }

    /// Prompt for the answer at `position`, or report the loop exhausted
    async fn prompt_answer(
        &self,
        user: UserId,
        question_id: QuestionId,
        position: usize,
    ) -> Result<Option<EditEvent>, BotError> {
        let question = self.store.get_question(question_id).await?;
        let Some(answer) = question.answers.get(position) else {
            return Ok(Some(EditEvent::AnswersExhausted));
        };
        let reply = Reply::text(format!(
            "Answer {}:\n{}\n\nEnter the new text:",
            position + 1,
            answer.text
        ))
        .with_skip();
        self.transport.send_reply(user, &reply).await?;
        Ok(None)
    }

    async fn show_question_picker(
        &self,
        user: UserId,
        lesson_id: LessonId,
        purpose: QuestionPurpose,
    ) -> Result<(), BotError> {
        // Resolve the lesson first so a deleted one reports as such
        let lesson = self.store.get_lesson(lesson_id).await?;
        let questions = self.store.list_questions(lesson.id).await?;
        if questions.is_empty() {
            self.editing.clear(user);
            self.reply(user, "This lesson has no questions.").await?;
            self.transport.send_reply(user, &views::admin_menu()).await?;
            return Ok(());
        }
        self.transport
            .send_reply(user, &views::question_picker(&questions, purpose))
            .await?;
        Ok(())
    }

    // ========================================================================
    // Static commands and buttons
    // ========================================================================

    async fn handle_static(&self, user: UserId, event: Event) -> Result<(), BotError> {
        match event {
            Event::Command { command, .. } => self.handle_command(user, command).await,
            Event::Button {
                message_id,
                callback,
            } => self.handle_button(user, message_id, callback).await,
            Event::TextInput(_) => {
                let reply = Reply::text(views::NAVIGATION_HINT)
                    .with_markup(views::main_menu(self.config.is_admin(user)));
                self.transport.send_reply(user, &reply).await?;
                Ok(())
            }
            Event::MediaInput(_) => {
                tracing::debug!(user_id = user, "Ignoring media outside of a session");
                Ok(())
            }
        }
    }

    async fn handle_command(&self, user: UserId, command: Command) -> Result<(), BotError> {
        let admin = self.config.is_admin(user);
        match command {
            Command::Start if admin => self.show_admin_menu(user).await,
            Command::Start => self.quiz.start(user).await,
            Command::AdminMenu => self.show_admin_menu(user).await,
            Command::Help => {
                self.transport.send_reply(user, &views::help(admin)).await?;
                Ok(())
            }
            Command::Profile => self.show_profile(user).await,
            Command::CreateLesson => self.start_authoring(user).await,
            Command::EditLesson => self.start_editing(user).await,
        }
    }

    async fn handle_button(
        &self,
        user: UserId,
        message_id: MessageId,
        callback: Callback,
    ) -> Result<(), BotError> {
        match callback {
            Callback::Lesson(lesson_id) => self.quiz.open_lesson(user, lesson_id).await,
            Callback::Answer(payload) => self.quiz.answer(user, message_id, payload).await,
            Callback::NextLesson => self.quiz.next_lesson(user).await,
            Callback::ChooseLesson => self.quiz.show_lessons(user).await,
            Callback::Answered => Ok(()),

            Callback::AdminMenu => self.show_admin_menu(user).await,
            Callback::AdminCreateLesson => self.start_authoring(user).await,
            Callback::AdminEditLesson => self.start_editing(user).await,
            Callback::AdminListLessons => {
                self.admin_list(user, "📚 Choose a lesson:", Callback::Lesson)
                    .await
            }
            Callback::AdminDeleteLesson => {
                self.admin_list(user, "Choose a lesson to delete:", Callback::DeleteLesson)
                    .await
            }
            Callback::DeleteLesson(lesson_id) => self.confirm_delete(user, lesson_id).await,
            Callback::ConfirmDelete(lesson_id) => self.delete_lesson(user, lesson_id).await,
            Callback::CancelDelete(_) => {
                if !self.config.is_admin(user) {
                    return self.reply(user, views::ACCESS_DENIED).await;
                }
                self.reply(user, "❌ Deletion cancelled.").await
            }

            // Cancel and skip with no open session
            Callback::EditCancel | Callback::EditSkip => {
                tracing::debug!(user_id = user, "No session to cancel or skip");
                Ok(())
            }
            Callback::EditLesson(_)
            | Callback::EditAction(..)
            | Callback::EditQuestionAnswers(_)
            | Callback::EditQuestionCorrect(_)
            | Callback::EditCorrect { .. } => {
                self.handle_editing(
                    user,
                    Event::Button {
                        message_id,
                        callback,
                    },
                )
                .await
            }
        }
    }

    async fn show_admin_menu(&self, user: UserId) -> Result<(), BotError> {
        if !self.config.is_admin(user) {
            return self.reply(user, views::ACCESS_DENIED).await;
        }
        self.transport.send_reply(user, &views::admin_menu()).await?;
        Ok(())
    }

    async fn admin_list(
        &self,
        user: UserId,
        header: &str,
        action: fn(LessonId) -> Callback,
    ) -> Result<(), BotError> {
        if !self.config.is_admin(user) {
            return self.reply(user, views::ACCESS_DENIED).await;
        }
        let lessons = self.store.list_lessons().await?;
        if lessons.is_empty() {
            return self.reply(user, views::NO_LESSONS).await;
        }
        self.transport
            .send_reply(user, &views::admin_lesson_list(header, &lessons, action))
            .await?;
        Ok(())
    }

    async fn confirm_delete(&self, user: UserId, lesson_id: LessonId) -> Result<(), BotError> {
        if !self.config.is_admin(user) {
            return self.reply(user, views::ACCESS_DENIED).await;
        }
        let lesson = self.store.get_lesson(lesson_id).await?;
        self.transport
            .send_reply(user, &views::delete_confirmation(&lesson))
            .await?;
        Ok(())
    }

    async fn delete_lesson(&self, user: UserId, lesson_id: LessonId) -> Result<(), BotError> {
        if !self.config.is_admin(user) {
            return self.reply(user, views::ACCESS_DENIED).await;
        }
        let lesson = self.store.get_lesson(lesson_id).await?;
        self.store.delete_lesson(lesson.id).await?;
        tracing::info!(user_id = user, lesson_id, "Lesson deleted");
        self.reply(user, format!("✅ Lesson \"{}\" deleted!", lesson.title))
            .await?;
        self.show_admin_menu(user).await
    }

    async fn show_profile(&self, user: UserId) -> Result<(), BotError> {
        let current = match self.store.get_user_progress(user).await? {
            Some(progress) => match progress.current_lesson_id {
                // A lesson deleted since is reported as no progress
                Some(id) => match self.store.get_lesson(id).await {
                    Ok(lesson) => Some(lesson),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => return Err(e.into()),
                },
                None => None,
            },
            None => None,
        };
        let reply = views::profile(current.as_ref(), self.config.is_admin(user));
        self.transport.send_reply(user, &reply).await?;
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn reply(&self, chat: ChatId, text: impl Into<String>) -> Result<(), BotError> {
        self.transport
            .send_reply(chat, &Reply::text(text))
            .await?;
        Ok(())
    }

    /// Report a failed event and tear down the session that produced it
    async fn report_failure(&self, user: UserId, flow: Flow, error: &BotError) {
        let message = if let BotError::Transition(e) = error {
            // Stale button on a live session; the session stays as it was
            tracing::warn!(user_id = user, error = %e, "Rejected button");
            "⚠️ This button is no longer active.".to_string()
        } else if let Some(message) = error.user_message() {
            tracing::warn!(user_id = user, ?flow, error = %error, "Operation failed");
            self.clear_session(user, flow);
            message
        } else {
            tracing::error!(user_id = user, ?flow, error = %error, "Unexpected failure");
            self.clear_session(user, flow);
            match flow {
                Flow::Authoring => "Something went wrong. Start over with /lesson_create",
                Flow::Editing => "Something went wrong. Start over with /edit_lesson",
                Flow::Static => views::GENERIC_FAILURE,
            }
            .to_string()
        };

        if let Err(e) = self.reply(user, message).await {
            tracing::error!(user_id = user, error = %e, "Failed to report failure");
        }
    }

    fn clear_session(&self, user: UserId, flow: Flow) {
        let cleared = match flow {
            Flow::Authoring => self.authoring.clear(user),
            Flow::Editing => self.editing.clear(user),
            Flow::Static => false,
        };
        if cleared {
            tracing::info!(user_id = user, ?flow, "Session destroyed after failure");
        }
    }
}

fn is_edit_callback(callback: &Callback) -> bool {
    matches!(
        callback,
        Callback::EditLesson(_)
            | Callback::EditAction(..)
            | Callback::EditQuestionAnswers(_)
            | Callback::EditQuestionCorrect(_)
            | Callback::EditCorrect { .. }
            | Callback::EditCancel
            | Callback::EditSkip
    )
}

/// Editing machine input for a menu button
fn edit_event_for(callback: Callback) -> Option<EditEvent> {
    match callback {
        Callback::EditLesson(lesson_id) => Some(EditEvent::LessonChosen(lesson_id)),
        Callback::EditAction(action, lesson_id) => Some(EditEvent::ActionChosen(action, lesson_id)),
        Callback::EditQuestionAnswers(question_id) => {
            Some(EditEvent::QuestionForAnswers(question_id))
        }
        Callback::EditQuestionCorrect(question_id) => {
            Some(EditEvent::QuestionForCorrect(question_id))
        }
        Callback::EditCorrect {
            question_id,
            position,
        } => Some(EditEvent::CorrectChosen {
            question_id,
            position,
        }),
        _ => None,
    }
}
