//! Mock implementations for testing
//!
//! These mocks drive the router end to end against an in-memory database
//! without a real transport.

use super::traits::*;
use super::Bot;
use crate::callback::Callback;
use crate::config::BotConfig;
use crate::db::{
    Answer, AnswerId, Database, DbError, DbResult, Lesson, LessonId, NewLesson, NewQuestion,
    Question, QuestionId, UserId, UserProgress,
};
use crate::transport::{ChatId, Markup, MessageId, TransportError, Update, UpdateKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock Transport
// ============================================================================

/// One outbound operation as seen by the mock transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat: ChatId,
        message_id: MessageId,
        text: String,
        payloads: Vec<String>,
    },
    Media {
        chat: ChatId,
        media: String,
    },
    Edit {
        chat: ChatId,
        message_id: MessageId,
        text: String,
        payloads: Vec<String>,
    },
}

impl Sent {
    fn chat(&self) -> ChatId {
        match self {
            Sent::Text { chat, .. } | Sent::Media { chat, .. } | Sent::Edit { chat, .. } => *chat,
        }
    }
}

fn payloads(markup: Option<&Markup>) -> Vec<String> {
    markup
        .map(|m| m.buttons().map(|b| b.payload.clone()).collect())
        .unwrap_or_default()
}

/// Records every outbound operation
pub struct MockTransport {
    log: Mutex<Vec<Sent>>,
    next_message_id: AtomicI64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(100),
        }
    }

    pub fn sent(&self, chat: ChatId) -> Vec<Sent> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.chat() == chat)
            .cloned()
            .collect()
    }

    /// Texts of sent (not edited) messages
    pub fn texts(&self, chat: ChatId) -> Vec<String> {
        self.sent(chat)
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self, chat: ChatId) -> Option<String> {
        self.texts(chat).pop()
    }

    pub fn edits(&self, chat: ChatId) -> Vec<(MessageId, String)> {
        self.sent(chat)
            .into_iter()
            .filter_map(|s| match s {
                Sent::Edit {
                    message_id, text, ..
                } => Some((message_id, text)),
                _ => None,
            })
            .collect()
    }

    /// Quiz question messages: id plus their answer buttons
    pub fn questions(&self, chat: ChatId) -> Vec<(MessageId, Vec<String>)> {
        self.sent(chat)
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text {
                    message_id,
                    payloads,
                    ..
                } if payloads.iter().any(|p| p.starts_with("answer:")) => {
                    Some((message_id, payloads))
                }
                _ => None,
            })
            .collect()
    }

    pub fn contains_text(&self, chat: ChatId, needle: &str) -> bool {
        self.texts(chat).iter().any(|t| t.contains(needle))
    }

    fn record(&self, sent: Sent) {
        self.log.lock().unwrap().push(sent);
    }

    fn allocate_id(&self) -> MessageId {
        self.next_message_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        markup: Option<&Markup>,
    ) -> Result<MessageId, TransportError> {
        let message_id = self.allocate_id();
        self.record(Sent::Text {
            chat,
            message_id,
            text: text.to_string(),
            payloads: payloads(markup),
        });
        Ok(message_id)
    }

    async fn send_media(&self, chat: ChatId, media: &str) -> Result<MessageId, TransportError> {
        self.record(Sent::Media {
            chat,
            media: media.to_string(),
        });
        Ok(self.allocate_id())
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        markup: Option<&Markup>,
    ) -> Result<(), TransportError> {
        self.record(Sent::Edit {
            chat,
            message_id,
            text: text.to_string(),
            payloads: payloads(markup),
        });
        Ok(())
    }
}

// ============================================================================
// Failing Store
// ============================================================================

/// Wraps a database and fails every write while `fail_writes` is set
pub struct FailingStore {
    inner: Database,
    fail_writes: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> DbResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::LockPoisoned);
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for FailingStore {
    async fn list_lessons(&self) -> DbResult<Vec<Lesson>> {
        self.inner.list_lessons()
    }

    async fn get_lesson(&self, id: LessonId) -> DbResult<Lesson> {
        self.inner.get_lesson(id)
    }

    async fn create_lesson(
        &self,
        title: &str,
        description: Option<&str>,
        video_ref: &str,
    ) -> DbResult<Lesson> {
        self.check_write()?;
        self.inner.create_lesson(title, description, video_ref)
    }

    async fn commit_lesson(&self, draft: &NewLesson) -> DbResult<Lesson> {
        self.check_write()?;
        self.inner.commit_lesson(draft)
    }

    async fn update_lesson_title(&self, id: LessonId, title: &str) -> DbResult<()> {
        self.check_write()?;
        self.inner.update_lesson_title(id, title)
    }

    async fn update_lesson_description(&self, id: LessonId, description: &str) -> DbResult<()> {
        self.check_write()?;
        self.inner.update_lesson_description(id, description)
    }

    async fn update_lesson_video(&self, id: LessonId, video_ref: &str) -> DbResult<()> {
        self.check_write()?;
        self.inner.update_lesson_video(id, video_ref)
    }

    async fn delete_lesson(&self, id: LessonId) -> DbResult<()> {
        self.check_write()?;
        self.inner.delete_lesson(id)
    }

    async fn get_question(&self, id: QuestionId) -> DbResult<Question> {
        self.inner.get_question(id)
    }

    async fn list_questions(&self, lesson_id: LessonId) -> DbResult<Vec<Question>> {
        self.inner.list_questions(lesson_id)
    }

    async fn create_question(&self, lesson_id: LessonId, text: &str) -> DbResult<Question> {
        self.check_write()?;
        self.inner.create_question(lesson_id, text)
    }

    async fn list_answers(&self, question_id: QuestionId) -> DbResult<Vec<Answer>> {
        self.inner.list_answers(question_id)
    }

    async fn create_answer(
        &self,
        question_id: QuestionId,
        text: &str,
        is_correct: bool,
    ) -> DbResult<Answer> {
        self.check_write()?;
        self.inner.create_answer(question_id, text, is_correct)
    }

    async fn update_answer_text(&self, id: AnswerId, text: &str) -> DbResult<()> {
        self.check_write()?;
        self.inner.update_answer_text(id, text)
    }

    async fn set_correct_answer(&self, question_id: QuestionId, position: usize) -> DbResult<()> {
        self.check_write()?;
        self.inner.set_correct_answer(question_id, position)
    }

    async fn get_user_progress(&self, user_id: UserId) -> DbResult<Option<UserProgress>> {
        self.inner.get_user_progress(user_id)
    }

    async fn upsert_progress(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        question_id: Option<QuestionId>,
    ) -> DbResult<()> {
        self.check_write()?;
        self.inner.upsert_progress(user_id, lesson_id, question_id)
    }

    async fn set_current_lesson(&self, user_id: UserId, lesson_id: LessonId) -> DbResult<()> {
        self.check_write()?;
        self.inner.set_current_lesson(user_id, lesson_id)
    }
}

// ============================================================================
// Test Bot
// ============================================================================

pub const ADMIN: UserId = 1;
pub const LEARNER: UserId = 42;

/// A bot wired to a mock transport, with helpers to feed it updates
pub struct TestBot<S> {
    pub bot: Arc<Bot<S, MockTransport>>,
    pub store: Arc<S>,
    pub transport: Arc<MockTransport>,
}

impl TestBot<Database> {
    pub fn new() -> Self {
        Self::with_store(Database::open_in_memory().unwrap())
    }
}

impl<S: ContentStore + 'static> TestBot<S> {
    pub fn with_store(store: S) -> Self {
        Self::with_admins(store, vec![ADMIN])
    }

    pub fn with_admins(store: S, admins: Vec<UserId>) -> Self {
        Self::with_config(store, BotConfig::for_tests(admins))
    }

    pub fn with_config(store: S, config: BotConfig) -> Self {
        let store = Arc::new(store);
        let transport = Arc::new(MockTransport::new());
        let bot = Arc::new(Bot::new(config, Arc::clone(&store), Arc::clone(&transport)));
        Self {
            bot,
            store,
            transport,
        }
    }

    pub async fn text(&self, user: UserId, text: &str) {
        self.bot
            .handle(Update {
                user,
                kind: UpdateKind::Text {
                    text: text.to_string(),
                },
            })
            .await;
    }

    pub async fn video(&self, user: UserId, video: &str) {
        self.bot
            .handle(Update {
                user,
                kind: UpdateKind::Video {
                    video: video.to_string(),
                },
            })
            .await;
    }

    pub async fn press_raw(&self, user: UserId, message_id: MessageId, payload: &str) {
        self.bot
            .handle(Update {
                user,
                kind: UpdateKind::Callback {
                    message_id,
                    callback: payload.to_string(),
                },
            })
            .await;
    }

    pub async fn press(&self, user: UserId, callback: &Callback) {
        self.press_raw(user, 1, &callback.to_string()).await;
    }

    /// Walk a complete authoring dialog; every question has answers A-D
    /// with `correct` (1-based) marked.
    pub async fn author_lesson(&self, user: UserId, title: &str, correct: usize) {
        self.text(user, "/lesson_create").await;
        self.text(user, title).await;
        self.text(user, "desc").await;
        self.video(user, "v1").await;
        for n in 1..=3 {
            self.text(user, &format!("{title} question {n}")).await;
            self.text(user, "A, B, C, D").await;
            self.text(user, &correct.to_string()).await;
        }
    }
}

pub fn sample_lesson(title: &str) -> NewLesson {
    NewLesson {
        title: title.to_string(),
        description: "desc".to_string(),
        video_ref: "v1".to_string(),
        questions: (1..=3)
            .map(|n| NewQuestion {
                text: format!("{title} question {n}"),
                answers: ["A", "B", "C", "D"].map(String::from).to_vec(),
                correct: 2,
            })
            .collect(),
    }
}

/// Poll until `condition` holds, for at most two seconds
pub async fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::AnswerPayload;
    use crate::config::QuizPacing;
    use crate::runtime::{views, Dispatcher};
    use crate::state_machine::EditAction;

    fn answer_callback(payload: &str, chosen: AnswerId) -> String {
        let Ok(Callback::Answer(p)) = payload.parse::<Callback>() else {
            panic!("not an answer payload: {payload}");
        };
        Callback::Answer(AnswerPayload { chosen, ..p }).to_string()
    }

    fn seed(t: &TestBot<Database>, title: &str) -> Lesson {
        t.store.commit_lesson(&sample_lesson(title)).unwrap()
    }

    // ------------------------------------------------------------------------
    // Authoring
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_authoring_commits_lesson() {
        let t = TestBot::new();
        t.author_lesson(ADMIN, "Intro", 2).await;

        let lessons = t.store.list_lessons().unwrap();
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].title, "Intro");
        assert_eq!(lessons[0].video_ref, "v1");

        let questions = t.store.list_questions(lessons[0].id).unwrap();
        assert_eq!(questions.len(), 3);
        for q in &questions {
            let texts: Vec<_> = q.answers.iter().map(|a| a.text.as_str()).collect();
            assert_eq!(texts, vec!["A", "B", "C", "D"]);
            assert_eq!(q.correct_answer().map(|a| a.text.as_str()), Some("B"));
        }

        assert!(!t.bot.authoring.has_active(ADMIN));
        assert!(t
            .transport
            .contains_text(ADMIN, &format!("✅ Lesson \"Intro\" created! (ID: {})", lessons[0].id)));
        assert!(t.transport.last_text(ADMIN).unwrap().contains("Admin menu"));
    }

    #[tokio::test]
    async fn test_command_text_during_authoring_is_input() {
        let t = TestBot::new();
        t.text(ADMIN, "/lesson_create").await;
        t.text(ADMIN, "/start").await;

        assert_eq!(t.transport.last_text(ADMIN).as_deref(), Some("Description?"));
        t.text(ADMIN, "desc").await;
        t.video(ADMIN, "v1").await;
        t.text(ADMIN, "Q1").await;
        t.text(ADMIN, "1,2,3,4").await;
        assert_eq!(
            t.transport.last_text(ADMIN).as_deref(),
            Some("Which one is correct (1-4)?")
        );
    }

    #[tokio::test]
    async fn test_authoring_cancel_button() {
        let t = TestBot::new();
        t.text(ADMIN, "/lesson_create").await;
        t.text(ADMIN, "Draft").await;
        t.press(ADMIN, &Callback::EditCancel).await;

        assert!(!t.bot.authoring.has_active(ADMIN));
        assert_eq!(
            t.transport.last_text(ADMIN).as_deref(),
            Some("❌ Lesson creation cancelled.")
        );
        assert!(t.store.list_lessons().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_admin_denied() {
        let t = TestBot::new();
        t.text(LEARNER, "/lesson_create").await;
        assert!(!t.bot.authoring.has_active(LEARNER));
        assert_eq!(
            t.transport.last_text(LEARNER).as_deref(),
            Some("❌ You do not have permission to create lessons.")
        );

        t.press(LEARNER, &Callback::AdminMenu).await;
        assert_eq!(
            t.transport.last_text(LEARNER).as_deref(),
            Some(views::ACCESS_DENIED)
        );

        t.press(LEARNER, &Callback::EditLesson(1)).await;
        assert!(!t.bot.editing.has_active(LEARNER));
    }

    #[tokio::test]
    async fn test_commit_failure_destroys_session() {
        let t = TestBot::with_store(FailingStore::new(Database::open_in_memory().unwrap()));
        t.store.fail_writes(true);
        t.author_lesson(ADMIN, "Broken", 1).await;

        assert!(!t.bot.authoring.has_active(ADMIN));
        assert_eq!(
            t.transport.last_text(ADMIN).as_deref(),
            Some("Something went wrong. Start over with /lesson_create")
        );
        assert!(t.store.list_lessons().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_authoring_sessions() {
        let t = TestBot::with_admins(Database::open_in_memory().unwrap(), vec![ADMIN, 7]);
        tokio::join!(
            t.author_lesson(ADMIN, "First", 1),
            t.author_lesson(7, "Second", 4),
        );

        let mut titles: Vec<_> = t
            .store
            .list_lessons()
            .unwrap()
            .into_iter()
            .map(|l| l.title)
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["First", "Second"]);
        assert!(!t.bot.authoring.has_active(ADMIN));
        assert!(!t.bot.authoring.has_active(7));
    }

    // ------------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_edit_title() {
        let t = TestBot::new();
        let lesson = seed(&t, "Old");

        t.text(ADMIN, "/edit_lesson").await;
        assert!(t.transport.contains_text(ADMIN, "Choose a lesson to edit:"));
        t.press(ADMIN, &Callback::EditLesson(lesson.id)).await;
        t.press(ADMIN, &Callback::EditAction(EditAction::Title, lesson.id))
            .await;
        assert!(t.transport.contains_text(ADMIN, "Current title:\nOld"));
        t.text(ADMIN, "New Title").await;

        assert_eq!(t.store.get_lesson(lesson.id).unwrap().title, "New Title");
        assert!(!t.bot.editing.has_active(ADMIN));
        assert!(t.transport.contains_text(ADMIN, "✅ Title updated!"));
    }

    #[tokio::test]
    async fn test_edit_button_ends_authoring() {
        let t = TestBot::new();
        let lesson = seed(&t, "Old");

        t.text(ADMIN, "/lesson_create").await;
        assert!(t.bot.authoring.has_active(ADMIN));
        t.press(ADMIN, &Callback::EditLesson(lesson.id)).await;
        assert!(!t.bot.authoring.has_active(ADMIN));

        t.press(ADMIN, &Callback::EditAction(EditAction::Title, lesson.id))
            .await;
        assert!(t.bot.editing.has_active(ADMIN));
        t.text(ADMIN, "New Title").await;

        // The text went to the edit, not to a lesson draft
        assert_eq!(t.store.get_lesson(lesson.id).unwrap().title, "New Title");
        assert_eq!(t.store.list_lessons().unwrap().len(), 1);
        assert!(!t.bot.authoring.has_active(ADMIN));
        assert!(!t.bot.editing.has_active(ADMIN));
    }

    #[tokio::test]
    async fn test_edit_video_rejects_text() {
        let t = TestBot::new();
        let lesson = seed(&t, "Vid");
        t.press(ADMIN, &Callback::EditAction(EditAction::Video, lesson.id))
            .await;
        t.text(ADMIN, "not a video").await;
        assert_eq!(
            t.transport.last_text(ADMIN).as_deref(),
            Some("Please send a video file.")
        );
        t.video(ADMIN, "v2").await;
        assert_eq!(t.store.get_lesson(lesson.id).unwrap().video_ref, "v2");
    }

    #[tokio::test]
    async fn test_edit_answers_with_skip() {
        let t = TestBot::new();
        let lesson = seed(&t, "Answers");
        let question = t.store.list_questions(lesson.id).unwrap().remove(0);

        t.press(ADMIN, &Callback::EditAction(EditAction::Answers, lesson.id))
            .await;
        assert!(t.transport.contains_text(ADMIN, "Choose a question:"));
        t.press(ADMIN, &Callback::EditQuestionAnswers(question.id))
            .await;
        assert!(t.transport.contains_text(ADMIN, "Answer 1:\nA"));

        t.text(ADMIN, "X").await;
        t.press(ADMIN, &Callback::EditSkip).await;
        t.text(ADMIN, "Y").await;
        t.text(ADMIN, "Z").await;

        let texts: Vec<_> = t
            .store
            .list_answers(question.id)
            .unwrap()
            .into_iter()
            .map(|a| a.text)
            .collect();
        assert_eq!(texts, vec!["X", "B", "Y", "Z"]);
        assert!(!t.bot.editing.has_active(ADMIN));
        assert!(t.transport.contains_text(ADMIN, "✅ Answer editing finished!"));
    }

    #[tokio::test]
    async fn test_change_correct_answer() {
        let t = TestBot::new();
        let lesson = seed(&t, "Correct");
        let question = t.store.list_questions(lesson.id).unwrap().remove(1);

        t.press(ADMIN, &Callback::EditAction(EditAction::Correct, lesson.id))
            .await;
        t.press(ADMIN, &Callback::EditQuestionCorrect(question.id))
            .await;
        assert!(t.transport.contains_text(ADMIN, "Current correct answer: 2"));
        t.press(
            ADMIN,
            &Callback::EditCorrect {
                question_id: question.id,
                position: 4,
            },
        )
        .await;

        let correct: Vec<_> = t
            .store
            .list_answers(question.id)
            .unwrap()
            .into_iter()
            .map(|a| a.is_correct)
            .collect();
        assert_eq!(correct, vec![false, false, false, true]);
        assert!(t.transport.contains_text(ADMIN, "✅ Correct answer updated!"));
    }

    #[tokio::test]
    async fn test_stale_skip_keeps_session() {
        let t = TestBot::new();
        let lesson = seed(&t, "Stale");
        t.press(ADMIN, &Callback::EditLesson(lesson.id)).await;
        t.press(ADMIN, &Callback::EditSkip).await;

        assert!(t.bot.editing.has_active(ADMIN));
        assert_eq!(
            t.transport.last_text(ADMIN).as_deref(),
            Some("⚠️ This button is no longer active.")
        );
    }

    #[tokio::test]
    async fn test_deleted_lesson_during_edit() {
        let t = TestBot::new();
        let lesson = seed(&t, "Gone");
        t.press(ADMIN, &Callback::EditLesson(lesson.id)).await;
        t.store.delete_lesson(lesson.id).unwrap();
        t.press(ADMIN, &Callback::EditAction(EditAction::Title, lesson.id))
            .await;

        assert!(!t.bot.editing.has_active(ADMIN));
        assert_eq!(
            t.transport.last_text(ADMIN).as_deref(),
            Some("❌ Lesson not found.")
        );
    }

    #[tokio::test]
    async fn test_text_while_editing_goes_to_session() {
        let t = TestBot::new();
        let lesson = seed(&t, "Owned");
        t.press(ADMIN, &Callback::EditAction(EditAction::Description, lesson.id))
            .await;
        t.text(ADMIN, "/help").await;

        assert_eq!(
            t.store.get_lesson(lesson.id).unwrap().description.as_deref(),
            Some("/help")
        );
    }

    // ------------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_delete_flow() {
        let t = TestBot::new();
        let keep = seed(&t, "Keep");
        let drop = seed(&t, "Drop");

        t.press(ADMIN, &Callback::AdminDeleteLesson).await;
        assert!(t.transport.contains_text(ADMIN, "Choose a lesson to delete:"));
        t.press(ADMIN, &Callback::DeleteLesson(drop.id)).await;
        assert!(t.transport.contains_text(ADMIN, "⚠️ WARNING!"));
        t.press(ADMIN, &Callback::CancelDelete(drop.id)).await;
        assert_eq!(t.store.list_lessons().unwrap().len(), 2);

        t.press(ADMIN, &Callback::ConfirmDelete(drop.id)).await;
        let remaining = t.store.list_lessons().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep.id);
        let texts = t.transport.texts(ADMIN);
        assert_eq!(texts[texts.len() - 2], "✅ Lesson \"Drop\" deleted!");
        assert_eq!(
            t.transport.last_text(ADMIN),
            Some(views::admin_menu().text)
        );

        t.press(ADMIN, &Callback::ConfirmDelete(drop.id)).await;
        assert_eq!(
            t.transport.last_text(ADMIN).as_deref(),
            Some("❌ Lesson not found.")
        );
    }

    // ------------------------------------------------------------------------
    // Quiz
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_quiz_progress() {
        let t = TestBot::new();
        let lesson = seed(&t, "Quiz");
        let questions = t.store.list_questions(lesson.id).unwrap();

        t.text(LEARNER, "/start").await;
        assert!(t
            .transport
            .sent(LEARNER)
            .iter()
            .any(|s| matches!(s, Sent::Media { media, .. } if media == "v1")));

        let (first_id, first_buttons) = t.transport.questions(LEARNER).remove(0);
        let wrong = questions[0].answers[0].id;
        t.press_raw(LEARNER, first_id, &answer_callback(&first_buttons[0], wrong))
            .await;

        let edits = t.transport.edits(LEARNER);
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].0, first_id);
        assert!(edits[0].1.ends_with("❌ Wrong"));

        assert!(wait_for(|| t.transport.questions(LEARNER).len() == 2).await);
        let (second_id, second_buttons) = t.transport.questions(LEARNER).remove(1);
        let right = questions[1].correct_answer().unwrap().id;
        t.press_raw(LEARNER, second_id, &answer_callback(&second_buttons[0], right))
            .await;
        assert!(t.transport.edits(LEARNER)[1].1.ends_with("✅ Correct!"));

        let progress = t.store.get_user_progress(LEARNER).unwrap().unwrap();
        assert_eq!(progress.current_lesson_id, Some(lesson.id));
        assert_eq!(progress.last_answered_question_id, Some(questions[1].id));
    }

    #[tokio::test]
    async fn test_reanswer_is_noop() {
        let t = TestBot::new();
        seed(&t, "Once");
        t.text(LEARNER, "/start").await;

        let (message_id, buttons) = t.transport.questions(LEARNER).remove(0);
        t.press_raw(LEARNER, message_id, &buttons[0]).await;
        t.press_raw(LEARNER, message_id, &buttons[1]).await;
        assert_eq!(t.transport.edits(LEARNER).len(), 1);

        // The finalized message only carries inert buttons
        let Sent::Edit { payloads, .. } = t
            .transport
            .sent(LEARNER)
            .into_iter()
            .find(|s| matches!(s, Sent::Edit { .. }))
            .unwrap()
        else {
            unreachable!()
        };
        assert!(payloads.iter().all(|p| p == "answered"));
    }

    #[tokio::test]
    async fn test_last_lesson_congratulates() {
        let t = TestBot::new();
        seed(&t, "Only");
        t.text(LEARNER, "/start").await;

        for n in 0..3 {
            assert!(wait_for(|| t.transport.questions(LEARNER).len() > n).await);
            let (message_id, buttons) = t.transport.questions(LEARNER).remove(n);
            t.press_raw(LEARNER, message_id, &buttons[0]).await;
        }
        assert!(
            wait_for(|| t.transport.contains_text(LEARNER, "🎉 Congratulations")).await
        );
        assert!(wait_for(|| t.transport.contains_text(LEARNER, "📚 Choose a lesson:")).await);
    }

    #[tokio::test]
    async fn test_next_lesson_button_opens_following_lesson() {
        let t = TestBot::new();
        let first = seed(&t, "First");
        seed(&t, "Second");
        t.store.set_current_lesson(LEARNER, first.id).unwrap();

        t.press(LEARNER, &Callback::NextLesson).await;
        assert!(t.transport.contains_text(LEARNER, "📝 Second"));
    }

    #[tokio::test]
    async fn test_lesson_built_piecewise() {
        let t = TestBot::with_store(FailingStore::new(Database::open_in_memory().unwrap()));
        let empty = t.store.create_lesson("Empty", None, "v0").await.unwrap();

        t.press(LEARNER, &Callback::Lesson(empty.id)).await;
        assert!(t
            .transport
            .contains_text(LEARNER, "There are no questions for this lesson yet."));
        assert_eq!(t.transport.last_text(LEARNER).as_deref(), Some("What next?"));

        let question = t.store.create_question(empty.id, "Short?").await.unwrap();
        for (text, correct) in [("yes", true), ("no", false), ("maybe", false)] {
            t.store
                .create_answer(question.id, text, correct)
                .await
                .unwrap();
        }

        // Three answers cannot be presented as a four-option question
        t.press(LEARNER, &Callback::Lesson(empty.id)).await;
        assert!(t.transport.questions(LEARNER).is_empty());
        assert_eq!(
            t.transport.last_text(LEARNER).as_deref(),
            Some("A question must have 4 answer options.")
        );

        // The correct-answer picker validates against the live count
        t.press(ADMIN, &Callback::EditQuestionCorrect(question.id))
            .await;
        t.press(
            ADMIN,
            &Callback::EditCorrect {
                question_id: question.id,
                position: 4,
            },
        )
        .await;
        assert!(t
            .transport
            .last_text(ADMIN)
            .unwrap()
            .contains("There is no answer number 4"));
        assert!(!t.bot.editing.has_active(ADMIN));
    }

    #[tokio::test]
    async fn test_start_without_lessons() {
        let t = TestBot::new();
        t.text(LEARNER, "/start").await;
        assert_eq!(
            t.transport.last_text(LEARNER).as_deref(),
            Some(views::NO_LESSONS)
        );
    }

    // ------------------------------------------------------------------------
    // Static routing
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_free_text_gets_navigation_hint() {
        let t = TestBot::new();
        t.text(LEARNER, "hello?").await;
        assert_eq!(
            t.transport.last_text(LEARNER).as_deref(),
            Some(views::NAVIGATION_HINT)
        );
    }

    #[tokio::test]
    async fn test_malformed_callback_reports_failure() {
        let t = TestBot::new();
        t.press_raw(LEARNER, 1, "answer:x:y").await;
        assert_eq!(
            t.transport.last_text(LEARNER).as_deref(),
            Some(views::GENERIC_FAILURE)
        );
    }

    #[tokio::test]
    async fn test_profile_tracks_current_lesson() {
        let t = TestBot::new();
        let lesson = seed(&t, "Profiled");
        t.text(LEARNER, "/profile").await;
        assert!(t.transport.contains_text(LEARNER, "not started any lessons"));

        t.press(LEARNER, &Callback::Lesson(lesson.id)).await;
        t.text(LEARNER, "📊 Profile").await;
        assert!(t.transport.contains_text(LEARNER, "Current lesson: Profiled"));
    }

    #[tokio::test]
    async fn test_start_for_admin_shows_admin_menu() {
        let t = TestBot::new();
        t.text(ADMIN, "/start").await;
        assert!(t.transport.last_text(ADMIN).unwrap().contains("Admin menu"));
    }

    // ------------------------------------------------------------------------
    // Pacing and dispatch
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_paced_follow_up_does_not_block() {
        let delay = Duration::from_millis(400);
        let mut config = BotConfig::for_tests(vec![ADMIN]);
        config.pacing = QuizPacing {
            next_question: delay,
            next_lesson: delay,
        };
        let t = TestBot::with_config(Database::open_in_memory().unwrap(), config);
        seed(&t, "Paced");
        t.text(LEARNER, "/start").await;
        let (first_id, buttons) = t.transport.questions(LEARNER).remove(0);

        let started = std::time::Instant::now();
        t.press_raw(LEARNER, first_id, &buttons[0]).await;
        assert!(started.elapsed() < delay);
        assert_eq!(t.transport.edits(LEARNER).len(), 1);

        // Another user is served while the follow-up waits
        t.text(7, "/help").await;
        assert!(t.transport.contains_text(7, "📖 Help"));
        assert!(started.elapsed() < delay);
        assert_eq!(t.transport.questions(LEARNER).len(), 1);

        assert!(wait_for(|| t.transport.questions(LEARNER).len() == 2).await);
        assert!(started.elapsed() >= delay);

        let (second_id, _) = t.transport.questions(LEARNER).remove(1);
        let sent = t.transport.sent(LEARNER);
        let verdict = sent
            .iter()
            .position(|s| matches!(s, Sent::Edit { message_id, .. } if *message_id == first_id))
            .unwrap();
        let next = sent
            .iter()
            .position(|s| matches!(s, Sent::Text { message_id, .. } if *message_id == second_id))
            .unwrap();
        assert!(verdict < next);
    }

    #[tokio::test]
    async fn test_dispatcher_keeps_per_user_order() {
        let t = TestBot::new();
        let mut dispatcher = Dispatcher::new(Arc::clone(&t.bot));
        let text = |user: UserId, text: &str| Update {
            user,
            kind: UpdateKind::Text {
                text: text.to_string(),
            },
        };

        let mut script = vec![
            text(ADMIN, "/lesson_create"),
            text(ADMIN, "Ordered"),
            text(ADMIN, "desc"),
            Update {
                user: ADMIN,
                kind: UpdateKind::Video {
                    video: "v1".to_string(),
                },
            },
        ];
        for n in 1..=3 {
            script.push(text(ADMIN, &format!("Ordered question {n}")));
            script.push(text(ADMIN, "A, B, C, D"));
            script.push(text(ADMIN, "2"));
        }

        let steps = script.len();
        for update in script {
            dispatcher.dispatch(update).await;
            dispatcher.dispatch(text(LEARNER, "/help")).await;
        }
        dispatcher.shutdown().await;

        let lessons = t.store.list_lessons().unwrap();
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].title, "Ordered");
        assert_eq!(t.store.list_questions(lessons[0].id).unwrap().len(), 3);
        assert!(!t.bot.authoring.has_active(ADMIN));

        let helps = t
            .transport
            .texts(LEARNER)
            .iter()
            .filter(|text| text.starts_with("📖 Help"))
            .count();
        assert_eq!(helps, steps);
    }
}
