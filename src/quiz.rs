//! Quiz delivery engine
//!
//! Presents lesson questions with shuffled options, scores the selected
//! option, rewrites the question message with the verdict and moves on to the
//! next question or lesson after a short, non-blocking pause.

use crate::callback::{AnswerPayload, Callback};
use crate::config::QuizPacing;
use crate::db::{Answer, AnswerId, DbError, LessonId, Question, QuestionId, ANSWERS_PER_QUESTION};
use crate::runtime::views;
use crate::runtime::{BotError, ContentStore, Transport};
use crate::transport::{Button, ChatId, Markup, MessageId, Reply};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

const OPTION_LABELS: [char; ANSWERS_PER_QUESTION] = ['A', 'B', 'C', 'D'];

/// Scored messages remembered per chat. Older ones already carry only
/// inert buttons, so forgetting them cannot lead to a second score.
const FINALIZED_PER_CHAT: usize = 64;

/// What to deliver once the verdict has had time to sink in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowUp {
    Question(QuestionId),
    NextLesson,
}

pub struct QuizEngine<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    pacing: QuizPacing,
    /// Most recently scored question messages, oldest first
    finalized: Arc<DashMap<ChatId, VecDeque<MessageId>>>,
}

impl<S, T> Clone for QuizEngine<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
            pacing: self.pacing,
            finalized: Arc::clone(&self.finalized),
        }
    }
}

impl<S, T> QuizEngine<S, T>
where
    S: ContentStore + 'static,
    T: Transport + 'static,
{
    pub fn new(store: Arc<S>, transport: Arc<T>, pacing: QuizPacing) -> Self {
        Self {
            store,
            transport,
            pacing,
            finalized: Arc::new(DashMap::new()),
        }
    }

    /// Learner entry point: open the first lesson
    pub async fn start(&self, chat: ChatId) -> Result<(), BotError> {
        let lessons = self.store.list_lessons().await?;
        match lessons.first() {
            Some(lesson) => self.open_lesson(chat, lesson.id).await,
            None => {
                let reply = Reply::text(views::NO_LESSONS).with_markup(views::main_menu(false));
                self.transport.send_reply(chat, &reply).await?;
                Ok(())
            }
        }
    }

    pub async fn show_lessons(&self, chat: ChatId) -> Result<(), BotError> {
        let lessons = self.store.list_lessons().await?;
        let reply = if lessons.is_empty() {
            Reply::text(views::NO_LESSONS)
        } else {
            views::lesson_list(&lessons)
        };
        self.transport.send_reply(chat, &reply).await?;
        Ok(())
    }

    /// Make the lesson current, then send its video, description and first
    /// question.
    pub async fn open_lesson(&self, chat: ChatId, lesson_id: LessonId) -> Result<(), BotError> {
        let lesson = self.store.get_lesson(lesson_id).await?;
        self.store.set_current_lesson(chat, lesson.id).await?;
        tracing::info!(user_id = chat, lesson_id, "Opening lesson");

        self.transport.send_media(chat, &lesson.video_ref).await?;
        let intro = format!(
            "📝 {}\n\n{}",
            lesson.title,
            lesson.description.as_deref().unwrap_or_default()
        );
        self.transport.send_text(chat, &intro, None).await?;

        let questions = self.store.list_questions(lesson.id).await?;
        match questions.first() {
            Some(question) => self.send_question(chat, question).await,
            None => {
                self.transport
                    .send_text(chat, "There are no questions for this lesson yet.", None)
                    .await?;
                self.transport
                    .send_reply(chat, &views::navigation())
                    .await?;
                Ok(())
            }
        }
    }

    pub async fn send_question(&self, chat: ChatId, question: &Question) -> Result<(), BotError> {
        if question.answers.len() != ANSWERS_PER_QUESTION {
            tracing::warn!(
                question_id = question.id,
                answers = question.answers.len(),
                "Question does not have four answers"
            );
            self.transport
                .send_text(chat, "A question must have 4 answer options.", None)
                .await?;
            return Ok(());
        }

        let order = shuffled_order(&question.answers, &mut rand::thread_rng());
        let reply = render_question(question, &order);
        self.transport.send_reply(chat, &reply).await?;
        Ok(())
    }

    /// Score a selected option and rewrite the question message in place.
    ///
    /// A second selection on the same message is a no-op.
    pub async fn answer(
        &self,
        chat: ChatId,
        message_id: MessageId,
        payload: AnswerPayload,
    ) -> Result<(), BotError> {
        if !self.mark_finalized(chat, message_id) {
            tracing::debug!(user_id = chat, message_id, "Question already answered");
            return Ok(());
        }
        let result = self.score(chat, message_id, &payload).await;
        if result.is_err() {
            self.unmark_finalized(chat, message_id);
        }
        result
    }

    /// Claim a message for scoring; false if it was already claimed
    fn mark_finalized(&self, chat: ChatId, message_id: MessageId) -> bool {
        let mut recent = self.finalized.entry(chat).or_default();
        if recent.contains(&message_id) {
            return false;
        }
        if recent.len() >= FINALIZED_PER_CHAT {
            recent.pop_front();
        }
        recent.push_back(message_id);
        true
    }

    fn unmark_finalized(&self, chat: ChatId, message_id: MessageId) {
        if let Some(mut recent) = self.finalized.get_mut(&chat) {
            recent.retain(|id| *id != message_id);
        }
    }

    async fn score(
        &self,
        chat: ChatId,
        message_id: MessageId,
        payload: &AnswerPayload,
    ) -> Result<(), BotError> {
        let question = self.store.get_question(payload.question_id).await?;
        let chosen = question
            .answer(payload.chosen)
            .ok_or(DbError::AnswerNotFound(payload.chosen))?;

        self.store
            .upsert_progress(chat, question.lesson_id, Some(question.id))
            .await?;

        let result = render_result(&question, &payload.order, chosen);
        self.transport
            .edit_message(chat, message_id, &result.text, result.markup.as_ref())
            .await?;
        tracing::info!(
            user_id = chat,
            question_id = question.id,
            correct = chosen.is_correct,
            "Answer scored"
        );

        let questions = self.store.list_questions(question.lesson_id).await?;
        let next = questions
            .iter()
            .skip_while(|q| q.id != question.id)
            .nth(1)
            .map(|q| q.id);
        match next {
            Some(next) => self.schedule(chat, self.pacing.next_question, FollowUp::Question(next)),
            None => self.schedule(chat, self.pacing.next_lesson, FollowUp::NextLesson),
        }
        Ok(())
    }

    /// Move on from the user's current lesson: open the next one, or
    /// congratulate and offer the lesson list when none remain.
    pub async fn next_lesson(&self, chat: ChatId) -> Result<(), BotError> {
        let current = self
            .store
            .get_user_progress(chat)
            .await?
            .and_then(|p| p.current_lesson_id);
        let Some(current) = current else {
            return self.show_lessons(chat).await;
        };

        let lessons = self.store.list_lessons().await?;
        match lessons.iter().find(|l| l.id > current) {
            Some(next) => self.open_lesson(chat, next.id).await,
            None => {
                self.transport
                    .send_text(chat, "🎉 Congratulations! You have completed all lessons!", None)
                    .await?;
                self.show_lessons(chat).await
            }
        }
    }

    /// Deliver a follow-up after `delay` on a separate task. Nothing is
    /// locked while waiting.
    fn schedule(&self, chat: ChatId, delay: Duration, follow_up: FollowUp) {
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result = match follow_up {
                FollowUp::Question(question_id) => {
                    match engine.store.get_question(question_id).await {
                        Ok(question) => engine.send_question(chat, &question).await,
                        Err(e) => Err(e.into()),
                    }
                }
                FollowUp::NextLesson => engine.next_lesson(chat).await,
            };
            if let Err(e) = result {
                tracing::error!(user_id = chat, error = %e, ?follow_up, "Deferred quiz step failed");
                if let Err(e) = engine
                    .transport
                    .send_text(chat, views::GENERIC_FAILURE, None)
                    .await
                {
                    tracing::error!(user_id = chat, error = %e, "Failed to report deferred failure");
                }
            }
        });
    }
}

/// Uniformly random display order of a question's answers
pub fn shuffled_order<R: Rng + ?Sized>(answers: &[Answer], rng: &mut R) -> Vec<AnswerId> {
    let mut order: Vec<AnswerId> = answers.iter().map(|a| a.id).collect();
    order.shuffle(rng);
    order
}

/// Options labeled A-D in display order; each payload carries the whole order
pub fn render_question(question: &Question, order: &[AnswerId]) -> Reply {
    let rows = order
        .iter()
        .filter_map(|id| question.answer(*id))
        .zip(OPTION_LABELS)
        .map(|(answer, label)| {
            let callback = Callback::Answer(AnswerPayload {
                lesson_id: question.lesson_id,
                question_id: question.id,
                chosen: answer.id,
                order: order.to_vec(),
            });
            vec![Button::new(format!("{label}. {}", answer.text), &callback)]
        })
        .collect();
    Reply::text(format!("❓ {}", question.text)).with_markup(Markup::inline(rows))
}

/// The scored version of a question message.
///
/// Options keep the order they were shown in; if the round-tripped order no
/// longer matches the question's answers, natural order is used instead.
pub fn render_result(question: &Question, order: &[AnswerId], chosen: &Answer) -> Reply {
    let mut shown: Vec<&Answer> = order.iter().filter_map(|id| question.answer(*id)).collect();
    if shown.len() != question.answers.len() {
        shown = question.answers.iter().collect();
    }

    let rows = shown
        .into_iter()
        .zip(OPTION_LABELS)
        .map(|(answer, label)| {
            let prefix = if answer.is_correct {
                "✅ "
            } else if answer.id == chosen.id {
                "❌ "
            } else {
                ""
            };
            vec![Button::new(
                format!("{prefix}{label}. {}", answer.text),
                &Callback::Answered,
            )]
        })
        .collect();

    let verdict = if chosen.is_correct {
        "\n\n✅ Correct!"
    } else {
        "\n\n❌ Wrong"
    };
    Reply::text(format!("❓ {}{verdict}", question.text)).with_markup(Markup::inline(rows))
}
