//! Conversation engine: owns the per-session turn loop.
//!
//! A turn appends the user message, resolves onboarding or generates an
//! assistant reply, then runs the extraction pipeline and persists what it
//! found. Every append is durable before the turn returns; extraction
//! failures degrade silently and never break a turn.

use crate::extraction;
use crate::keywords::{self, Occupation};
use crate::logging;
use crate::notify::{self, Notifier};
use crate::openai::{ChatMessage, CompletionClient};
use crate::prompts;
use crate::store::{
    ChatSession, Memory, MemoryKind, MemoryMeta, OnboardingStep, Sender, Store, StoredMessage,
    Task, UserProfile,
};
use chrono::{Local, Utc};
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type EngineResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on every extraction call to the collaborator.
    pub request_timeout: Duration,
    /// Message count at which automatic title generation kicks in.
    pub title_threshold: usize,
    /// How many opening messages the title is generated from.
    pub title_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(12),
            title_threshold: 10,
            title_window: 10,
        }
    }
}

/// What one `send_message` turn produced.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Assistant reply appended this turn; None for a no-op (empty input).
    pub reply: Option<String>,
    /// Tasks extracted this turn, awaiting explicit confirmation.
    pub pending_tasks: Vec<Task>,
    /// Notification scheduled from an extracted date, if any.
    pub scheduled_notification: Option<String>,
}

pub struct ConversationEngine {
    store: Store,
    client: Arc<dyn CompletionClient>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    /// Extracted-but-unconfirmed tasks per session. Written to the task
    /// store only on explicit confirmation.
    pending: Mutex<HashMap<String, Vec<Task>>>,
}

impl ConversationEngine {
    pub fn new(
        store: Store,
        client: Arc<dyn CompletionClient>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            client,
            notifier,
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ============ Sessions ============

    /// Start a new session. The onboarding step is derived from what the
    /// stored profile already knows, and the opening scripted question (if
    /// any) is appended before the user says anything.
    pub fn start_session(&self) -> EngineResult<ChatSession> {
        let profile = self.store.profile()?;
        let step = if profile.name.is_none() {
            OnboardingStep::AwaitingName
        } else if profile.job.is_none() {
            OnboardingStep::AwaitingOccupation
        } else {
            OnboardingStep::FreeChat
        };

        let session = self.store.create_session(step)?;
        match step {
            OnboardingStep::AwaitingName => {
                self.store
                    .append_message(&session.id, StoredMessage::new(Sender::Ai, prompts::ASK_NAME))?;
            }
            OnboardingStep::AwaitingOccupation => {
                let name = profile.name.as_deref().unwrap_or_default();
                self.store.append_message(
                    &session.id,
                    StoredMessage::new(Sender::Ai, &prompts::greet_with_name(name)),
                )?;
            }
            _ => {}
        }
        logging::log_conversation(Some(&session.id), &format!("session started ({:?})", step));
        Ok(session)
    }

    /// Sessions sorted by recency, `last` refreshed from each log's tail.
    pub fn sessions(&self) -> EngineResult<Vec<ChatSession>> {
        let mut sessions = self.store.all_sessions()?;
        for session in &mut sessions {
            if let Some(tail) = self.store.messages(&session.id)?.last() {
                session.last = tail.timestamp.clone();
            }
        }
        sessions.sort_by(|a, b| b.last.cmp(&a.last));
        Ok(sessions)
    }

    pub fn messages(&self, session_id: &str) -> EngineResult<Vec<StoredMessage>> {
        Ok(self.store.messages(session_id)?)
    }

    /// Manual rename; a distinct codepath from automatic title generation
    /// and deliberately not guarded by `title_generated`.
    pub fn rename_session(&self, session_id: &str, title: &str) -> EngineResult<bool> {
        let title = title.to_string();
        Ok(self.store.update_session(session_id, |s| s.title = title)?)
    }

    pub fn delete_session(&self, session_id: &str) -> EngineResult<()> {
        self.delete_sessions(&[session_id.to_string()])
    }

    pub fn delete_sessions(&self, ids: &[String]) -> EngineResult<()> {
        self.store.delete_sessions(ids)?;
        let mut pending = self.pending.lock().unwrap();
        for id in ids {
            pending.remove(id);
        }
        Ok(())
    }

    // ============ Turn loop ============

    /// Process one user turn. Appends exactly one user message and exactly
    /// one assistant message across every branch; empty input is a no-op.
    pub async fn send_message(&self, session_id: &str, text: &str) -> EngineResult<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(TurnOutcome::default());
        }

        let session = self
            .store
            .session(session_id)?
            .ok_or_else(|| format!("unknown session: {}", session_id))?;

        self.store
            .append_message(session_id, StoredMessage::new(Sender::User, text))?;

        match session.onboarding {
            OnboardingStep::AwaitingName => self.handle_name(session_id, text),
            OnboardingStep::AwaitingOccupation => self.handle_occupation(session_id, text).await,
            OnboardingStep::AwaitingStudentLevel => self.handle_student_level(session_id, text),
            OnboardingStep::FreeChat => self.free_chat_turn(session_id, text).await,
        }
    }

    /// The next user message is the display name, verbatim. Also becomes the
    /// session title (once).
    fn handle_name(&self, session_id: &str, text: &str) -> EngineResult<TurnOutcome> {
        let profile = self.store.merge_profile(UserProfile {
            name: Some(text.to_string()),
            ..Default::default()
        })?;
        logging::log_conversation(Some(session_id), "onboarding: name captured");

        let (next, reply) = if profile.job.is_none() {
            (OnboardingStep::AwaitingOccupation, prompts::greet_with_name(text))
        } else {
            (OnboardingStep::FreeChat, prompts::greet_returning(text))
        };

        let title = text.to_string();
        self.store.update_session(session_id, |s| {
            s.title = title;
            s.onboarding = next;
        })?;
        self.scripted_reply(session_id, &reply)
    }

    /// Occupation slot: a match asks the scripted follow-up or records the
    /// job; anything else falls through silently into free chat.
    async fn handle_occupation(&self, session_id: &str, text: &str) -> EngineResult<TurnOutcome> {
        match keywords::match_occupation(text) {
            Some(Occupation::Student) => {
                self.store.update_session(session_id, |s| {
                    s.onboarding = OnboardingStep::AwaitingStudentLevel;
                })?;
                self.scripted_reply(session_id, prompts::ASK_STUDENT_LEVEL)
            }
            Some(Occupation::Worker) => {
                self.store.merge_profile(UserProfile {
                    job: Some("직장인".to_string()),
                    ..Default::default()
                })?;
                self.store.update_session(session_id, |s| {
                    s.onboarding = OnboardingStep::FreeChat;
                })?;
                self.scripted_reply(session_id, prompts::ACK_WORKER)
            }
            None => {
                self.store.update_session(session_id, |s| {
                    s.onboarding = OnboardingStep::FreeChat;
                })?;
                self.free_chat_turn(session_id, text).await
            }
        }
    }

    /// Student-level slot: always transitions to free chat, recording the
    /// level only when one matched.
    fn handle_student_level(&self, session_id: &str, text: &str) -> EngineResult<TurnOutcome> {
        if let Some(level) = keywords::match_student_level(text) {
            self.store.merge_profile(UserProfile {
                job: Some("학생".to_string()),
                level: Some(level.to_string()),
                ..Default::default()
            })?;
        }
        self.store.update_session(session_id, |s| {
            s.onboarding = OnboardingStep::FreeChat;
        })?;
        self.scripted_reply(session_id, prompts::ACK_STUDENT_LEVEL)
    }

    fn scripted_reply(&self, session_id: &str, reply: &str) -> EngineResult<TurnOutcome> {
        self.store
            .append_message(session_id, StoredMessage::new(Sender::Ai, reply))?;
        Ok(TurnOutcome {
            reply: Some(reply.to_string()),
            ..Default::default()
        })
    }

    /// Steady-state turn: reply, then extraction, persistence, notification
    /// and (conditionally) title generation.
    async fn free_chat_turn(&self, session_id: &str, user_text: &str) -> EngineResult<TurnOutcome> {
        let transcript = self.store.messages(session_id)?;
        let reply = self.generate_reply(session_id, &transcript).await;
        self.store
            .append_message(session_id, StoredMessage::new(Sender::Ai, &reply))?;

        let client = self.client.as_ref();
        let timeout = self.config.request_timeout;
        let today = Local::now().date_naive();

        let full_transcript = self.store.messages(session_id)?;
        let (extracted, summary, date, time) = tokio::join!(
            extraction::extract_tasks(client, timeout, &full_transcript),
            extraction::summarize_user_info(client, timeout, user_text),
            extraction::extract_date(client, timeout, user_text, today),
            extraction::extract_time(client, timeout, user_text),
        );
        logging::log_extraction(
            Some(session_id),
            &format!(
                "turn extracted: {} tasks, summary={}, date={:?}, time={:?}",
                extracted.len(),
                !summary.is_empty(),
                date,
                time
            ),
        );

        let pending: Vec<Task> = extracted
            .into_iter()
            .map(|t| Task {
                id: uuid::Uuid::new_v4().to_string(),
                content: t.content,
                due_date: t.due_date,
                priority: t.priority,
                completed: false,
                created_at: Utc::now().to_rfc3339(),
            })
            .collect();
        self.pending
            .lock()
            .unwrap()
            .insert(session_id.to_string(), pending.clone());

        let event = (!summary.is_empty()).then(|| summary.clone());
        let notification_id = notify::schedule_notification(
            self.notifier.as_ref(),
            event.as_deref().unwrap_or(user_text),
            date,
            time,
        )
        .await;

        let kind = if !pending.is_empty() {
            MemoryKind::TodayTask
        } else if keywords::contains_worry(user_text) {
            MemoryKind::Worry
        } else if keywords::detect_emotion(user_text).is_some() {
            MemoryKind::Emotion
        } else {
            MemoryKind::Normal
        };

        // A pair memory is kept only when the turn yielded something worth
        // resurfacing; a personal fact additionally lands as its own record.
        if kind != MemoryKind::Normal || date.is_some() || time.is_some() {
            let mut memory = Memory::pair(kind, session_id, user_text, &reply);
            if kind == MemoryKind::TodayTask {
                memory.tasks = Some(pending.iter().map(|t| t.content.clone()).collect());
            }
            if date.is_some() || time.is_some() || notification_id.is_some() {
                memory.meta = Some(MemoryMeta {
                    date: date.map(|d| d.format("%Y-%m-%d").to_string()),
                    time: time.map(|t| t.format("%H:%M").to_string()),
                    event: event.clone(),
                    notification_id: notification_id.clone(),
                });
            }
            self.store.append_memory(memory)?;
        }
        if !summary.is_empty() {
            self.store.append_memory(Memory::fact(session_id, &summary))?;
        }

        self.maybe_generate_title(session_id, &full_transcript).await?;

        Ok(TurnOutcome {
            reply: Some(reply),
            pending_tasks: pending,
            scheduled_notification: notification_id,
        })
    }

    async fn generate_reply(&self, session_id: &str, transcript: &[StoredMessage]) -> String {
        let mut messages = vec![ChatMessage::system(prompts::ASSISTANT_PERSONA)];
        messages.extend(transcript.iter().map(|m| match m.sender {
            Sender::User => ChatMessage::user(m.text.clone()),
            Sender::Ai => ChatMessage::assistant(m.text.clone()),
        }));

        let call = self.client.complete(messages, 0.7);
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(Ok(reply)) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(Ok(_)) => prompts::REPLY_FALLBACK.to_string(),
            Ok(Err(e)) => {
                logging::log_error(Some(session_id), &format!("reply generation failed: {}", e));
                prompts::REPLY_FALLBACK.to_string()
            }
            Err(_) => {
                logging::log_error(Some(session_id), "reply generation timed out");
                prompts::REPLY_FALLBACK.to_string()
            }
        }
    }

    /// Automatic title generation: runs once the log first reaches the
    /// threshold, guarded by `title_generated`. An empty generation leaves
    /// the guard false so a later turn retries.
    async fn maybe_generate_title(
        &self,
        session_id: &str,
        transcript: &[StoredMessage],
    ) -> EngineResult<()> {
        let Some(session) = self.store.session(session_id)? else {
            return Ok(());
        };
        if session.title_generated || transcript.len() < self.config.title_threshold {
            return Ok(());
        }

        let window = &transcript[..self.config.title_window.min(transcript.len())];
        let title = extraction::generate_title(
            self.client.as_ref(),
            self.config.request_timeout,
            window,
        )
        .await;
        if title.is_empty() {
            logging::log_extraction(Some(session_id), "title generation empty, will retry");
            return Ok(());
        }

        logging::log_conversation(Some(session_id), &format!("title set to {}", title));
        self.store.update_session(session_id, |s| {
            s.title = title;
            s.title_generated = true;
        })?;
        Ok(())
    }

    // ============ Task confirmation ============

    pub fn pending_tasks(&self, session_id: &str) -> Vec<Task> {
        self.pending
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Commit the pending tasks to the task store. Ids are reassigned here;
    /// nothing the collaborator produced is trusted to be unique.
    pub fn confirm_tasks(&self, session_id: &str) -> EngineResult<Vec<Task>> {
        let mut pending = self
            .pending
            .lock()
            .unwrap()
            .remove(session_id)
            .unwrap_or_default();
        for task in &mut pending {
            task.id = uuid::Uuid::new_v4().to_string();
        }
        if !pending.is_empty() {
            self.store.add_tasks(&pending)?;
            logging::log_store(
                Some(session_id),
                &format!("{} confirmed tasks persisted", pending.len()),
            );
        }
        Ok(pending)
    }

    pub fn discard_tasks(&self, session_id: &str) {
        self.pending.lock().unwrap().remove(session_id);
    }

    // ============ Memory maintenance ============

    /// Delete the memory at `index` and cancel its notification, if one was
    /// scheduled. The record's id is pinned from the snapshot that resolved
    /// the index, so mutations interleaved at the cancel suspension point
    /// cannot shift which record the delete removes.
    pub async fn cancel_scheduled(&self, index: usize) -> EngineResult<bool> {
        let memories = self.store.memories()?;
        let Some(memory) = memories.get(index) else {
            return Ok(false);
        };
        let memory_id = memory.id.clone();
        if let Some(notification_id) = memory
            .meta
            .as_ref()
            .and_then(|meta| meta.notification_id.as_deref())
        {
            self.notifier.cancel(notification_id).await;
            logging::log_notify(None, &format!("cancelled {}", notification_id));
        }
        Ok(self.store.delete_memory(&memory_id)?)
    }

    /// Today's dashboard views over the current memory collection.
    pub fn dashboard_summary(&self) -> EngineResult<crate::dashboard::DashboardSummary> {
        let memories = self.store.memories()?;
        Ok(crate::dashboard::summarize(
            &memories,
            Local::now().date_naive(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LocalNotifier;
    use crate::store::{MemoryKind, Priority};
    use async_trait::async_trait;

    #[derive(Clone)]
    struct FakeReplies {
        reply: String,
        summary: String,
        date: String,
        time: String,
        tasks: String,
        title: String,
        fail_reply: bool,
    }

    impl Default for FakeReplies {
        fn default() -> Self {
            Self {
                reply: "응, 기억해둘게!".to_string(),
                summary: String::new(),
                date: "null".to_string(),
                time: "null".to_string(),
                tasks: "[]".to_string(),
                title: String::new(),
                fail_reply: false,
            }
        }
    }

    #[derive(Default)]
    struct FakeClient {
        replies: Mutex<FakeReplies>,
    }

    impl FakeClient {
        fn set<F: FnOnce(&mut FakeReplies)>(&self, f: F) {
            f(&mut self.replies.lock().unwrap());
        }
    }

    #[async_trait]
    impl CompletionClient for FakeClient {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            _temperature: f32,
        ) -> Result<String, Box<dyn Error + Send + Sync>> {
            let replies = self.replies.lock().unwrap().clone();
            let system = messages
                .first()
                .map(|m| m.content.clone())
                .unwrap_or_default();

            if system == prompts::TASK_EXTRACTION {
                Ok(replies.tasks)
            } else if system == prompts::USER_INFO_SUMMARY {
                Ok(replies.summary)
            } else if system == prompts::TIME_EXTRACTION {
                Ok(replies.time)
            } else if system == prompts::TITLE_GENERATION {
                Ok(replies.title)
            } else if system.starts_with("오늘 날짜는") {
                Ok(replies.date)
            } else if replies.fail_reply {
                Err("connection refused".into())
            } else {
                Ok(replies.reply)
            }
        }
    }

    struct Fixture {
        engine: ConversationEngine,
        client: Arc<FakeClient>,
        notifier: Arc<LocalNotifier>,
    }

    fn fixture_with(config: EngineConfig) -> Fixture {
        let client = Arc::new(FakeClient::default());
        let notifier = Arc::new(LocalNotifier::new());
        let engine = ConversationEngine::new(
            Store::open_in_memory().unwrap(),
            client.clone(),
            notifier.clone(),
            config,
        );
        Fixture {
            engine,
            client,
            notifier,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(EngineConfig::default())
    }

    /// Fill the profile so new sessions start in free chat.
    fn complete_onboarding(engine: &ConversationEngine) {
        engine
            .store()
            .merge_profile(UserProfile {
                name: Some("민준".to_string()),
                job: Some("직장인".to_string()),
                ..Default::default()
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_input_is_a_noop() {
        let f = fixture();
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();

        let outcome = f.engine.send_message(&session.id, "   ").await.unwrap();
        assert_eq!(outcome.reply, None);
        assert!(f.engine.messages(&session.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_turns_append_user_then_assistant_in_order() {
        let f = fixture();
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();

        f.engine.send_message(&session.id, "안녕").await.unwrap();
        f.engine.send_message(&session.id, "오늘 잘 지냈어").await.unwrap();

        let log = f.engine.messages(&session.id).unwrap();
        let senders: Vec<Sender> = log.iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![Sender::User, Sender::Ai, Sender::User, Sender::Ai]);
        assert_eq!(log[0].text, "안녕");
        assert_eq!(log[2].text, "오늘 잘 지냈어");
    }

    #[tokio::test]
    async fn test_onboarding_name_capture() {
        let f = fixture();
        let session = f.engine.start_session().unwrap();

        // The session opens with the scripted name question.
        let log = f.engine.messages(&session.id).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sender, Sender::Ai);
        assert_eq!(log[0].text, prompts::ASK_NAME);

        f.engine.send_message(&session.id, "민준").await.unwrap();

        let profile = f.engine.store().profile().unwrap();
        assert_eq!(profile.name.as_deref(), Some("민준"));

        let session = f.engine.store().session(&session.id).unwrap().unwrap();
        assert_eq!(session.title, "민준");
        assert_eq!(session.onboarding, OnboardingStep::AwaitingOccupation);

        // Exactly one assistant message for the turn.
        let log = f.engine.messages(&session.id).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2].sender, Sender::Ai);
    }

    #[tokio::test]
    async fn test_onboarding_worker_path() {
        let f = fixture();
        let session = f.engine.start_session().unwrap();
        f.engine.send_message(&session.id, "민준").await.unwrap();

        let outcome = f.engine.send_message(&session.id, "직장 다니고 있어").await.unwrap();
        assert_eq!(outcome.reply.as_deref(), Some(prompts::ACK_WORKER));

        let profile = f.engine.store().profile().unwrap();
        assert_eq!(profile.job.as_deref(), Some("직장인"));
        let session = f.engine.store().session(&session.id).unwrap().unwrap();
        assert_eq!(session.onboarding, OnboardingStep::FreeChat);
    }

    #[tokio::test]
    async fn test_onboarding_student_path() {
        let f = fixture();
        let session = f.engine.start_session().unwrap();
        f.engine.send_message(&session.id, "민준").await.unwrap();

        let outcome = f.engine.send_message(&session.id, "나 학생이야").await.unwrap();
        assert_eq!(outcome.reply.as_deref(), Some(prompts::ASK_STUDENT_LEVEL));

        f.engine.send_message(&session.id, "대학생!").await.unwrap();
        let profile = f.engine.store().profile().unwrap();
        assert_eq!(profile.job.as_deref(), Some("학생"));
        assert_eq!(profile.level.as_deref(), Some("대학생"));

        let session = f.engine.store().session(&session.id).unwrap().unwrap();
        assert_eq!(session.onboarding, OnboardingStep::FreeChat);
    }

    #[tokio::test]
    async fn test_occupation_nonmatch_falls_through_to_free_chat() {
        let f = fixture();
        let session = f.engine.start_session().unwrap();
        f.engine.send_message(&session.id, "민준").await.unwrap();

        let outcome = f.engine.send_message(&session.id, "요즘 그냥 쉬고 있어").await.unwrap();
        // Answered as free chat, not with a scripted line or an error.
        assert_eq!(outcome.reply.as_deref(), Some("응, 기억해둘게!"));
        assert_eq!(f.engine.store().profile().unwrap().job, None);

        let session = f.engine.store().session(&session.id).unwrap().unwrap();
        assert_eq!(session.onboarding, OnboardingStep::FreeChat);
    }

    #[tokio::test]
    async fn test_reply_failure_substitutes_apology() {
        let f = fixture();
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();
        f.client.set(|r| r.fail_reply = true);

        let outcome = f.engine.send_message(&session.id, "안녕").await.unwrap();
        assert_eq!(outcome.reply.as_deref(), Some(prompts::REPLY_FALLBACK));

        let log = f.engine.messages(&session.id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].text, prompts::REPLY_FALLBACK);
    }

    #[tokio::test]
    async fn test_title_generated_once_then_frozen() {
        let mut config = EngineConfig::default();
        config.title_threshold = 4;
        config.title_window = 4;
        let f = fixture_with(config);
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();
        f.client.set(|r| r.title = "하루 기록".to_string());

        f.engine.send_message(&session.id, "안녕").await.unwrap();
        let s = f.engine.store().session(&session.id).unwrap().unwrap();
        assert!(!s.title_generated); // below threshold

        f.engine.send_message(&session.id, "오늘 이야기 하자").await.unwrap();
        let s = f.engine.store().session(&session.id).unwrap().unwrap();
        assert_eq!(s.title, "하루 기록");
        assert!(s.title_generated);

        // A later turn must not overwrite the generated title.
        f.client.set(|r| r.title = "다른 제목".to_string());
        f.engine.send_message(&session.id, "그리고 또").await.unwrap();
        let s = f.engine.store().session(&session.id).unwrap().unwrap();
        assert_eq!(s.title, "하루 기록");
    }

    #[tokio::test]
    async fn test_empty_title_retries_on_a_later_turn() {
        let mut config = EngineConfig::default();
        config.title_threshold = 2;
        config.title_window = 2;
        let f = fixture_with(config);
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();

        f.engine.send_message(&session.id, "안녕").await.unwrap();
        let s = f.engine.store().session(&session.id).unwrap().unwrap();
        assert!(!s.title_generated);
        assert_eq!(s.title, "새 대화");

        f.client.set(|r| r.title = "짧은 제목".to_string());
        f.engine.send_message(&session.id, "다시 왔어").await.unwrap();
        let s = f.engine.store().session(&session.id).unwrap().unwrap();
        assert_eq!(s.title, "짧은 제목");
        assert!(s.title_generated);
    }

    #[tokio::test]
    async fn test_manual_rename_is_exempt_from_title_guard() {
        let f = fixture();
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();
        f.engine
            .store()
            .update_session(&session.id, |s| s.title_generated = true)
            .unwrap();

        assert!(f.engine.rename_session(&session.id, "내가 정한 제목").unwrap());
        let s = f.engine.store().session(&session.id).unwrap().unwrap();
        assert_eq!(s.title, "내가 정한 제목");
    }

    #[tokio::test]
    async fn test_meeting_tomorrow_schedules_notification_and_memory() {
        let f = fixture();
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();

        let tomorrow = Local::now().date_naive().succ_opt().unwrap();
        let tomorrow_str = tomorrow.format("%Y-%m-%d").to_string();
        f.client.set(|r| {
            r.date = tomorrow_str.clone();
            r.time = "15:00".to_string();
        });

        let outcome = f
            .engine
            .send_message(&session.id, "내일 오후 3시에 회의 있어")
            .await
            .unwrap();
        let notification_id = outcome.scheduled_notification.expect("notification scheduled");

        let memories = f.engine.store().memories().unwrap();
        assert_eq!(memories.len(), 1);
        let meta = memories[0].meta.as_ref().unwrap();
        assert_eq!(meta.date.as_deref(), Some(tomorrow_str.as_str()));
        assert_eq!(meta.time.as_deref(), Some("15:00"));
        assert_eq!(meta.notification_id.as_deref(), Some(notification_id.as_str()));

        let scheduled = f.notifier.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(
            scheduled[0].trigger,
            tomorrow.and_hms_opt(15, 0, 0).unwrap()
        );

        // The dashboard's scheduled view picks the record up.
        let summary = f.engine.dashboard_summary().unwrap();
        assert_eq!(summary.scheduled.len(), 1);
        assert_eq!(summary.scheduled[0].notification_id, notification_id);
        assert_eq!(summary.scheduled[0].time, "15:00");
    }

    #[tokio::test]
    async fn test_tasks_held_pending_until_confirmed() {
        let f = fixture();
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();
        f.client.set(|r| {
            // Duplicate collaborator ids are not trusted.
            r.tasks = r#"[
                {"id": "1", "content": "회의 준비", "priority": "high"},
                {"id": "1", "content": "보고서 제출"}
            ]"#
            .to_string();
        });

        let outcome = f.engine.send_message(&session.id, "내일 할 일 많아").await.unwrap();
        assert_eq!(outcome.pending_tasks.len(), 2);
        assert_eq!(outcome.pending_tasks[0].priority, Priority::High);
        assert_eq!(outcome.pending_tasks[1].priority, Priority::Medium);

        // Nothing persisted before confirmation.
        assert!(f.engine.store().all_tasks().unwrap().is_empty());
        assert_eq!(f.engine.pending_tasks(&session.id).len(), 2);

        let confirmed = f.engine.confirm_tasks(&session.id).unwrap();
        assert_eq!(confirmed.len(), 2);
        assert_ne!(confirmed[0].id, confirmed[1].id);

        let stored = f.engine.store().all_tasks().unwrap();
        assert_eq!(stored.len(), 2);
        assert!(f.engine.pending_tasks(&session.id).is_empty());

        // The turn also left a today-task memory carrying the contents.
        let memories = f.engine.store().memories().unwrap();
        assert_eq!(memories[0].kind, MemoryKind::TodayTask);
        assert_eq!(
            memories[0].tasks.as_deref(),
            Some(["회의 준비".to_string(), "보고서 제출".to_string()].as_slice())
        );
    }

    #[tokio::test]
    async fn test_discarded_tasks_never_reach_the_store() {
        let f = fixture();
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();
        f.client
            .set(|r| r.tasks = r#"[{"id": "x", "content": "운동"}]"#.to_string());

        f.engine.send_message(&session.id, "운동해야 해").await.unwrap();
        f.engine.discard_tasks(&session.id);

        assert!(f.engine.pending_tasks(&session.id).is_empty());
        assert!(f.engine.store().all_tasks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_personal_fact_lands_as_user_info_memory() {
        let f = fixture();
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();
        f.client.set(|r| r.summary = "사용자는 부산에 산다.".to_string());

        f.engine.send_message(&session.id, "나 부산 살아").await.unwrap();

        let memories = f.engine.store().memories().unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].kind, MemoryKind::UserInfo);
        assert_eq!(memories[0].display_text(), "사용자는 부산에 산다.");
    }

    #[tokio::test]
    async fn test_worry_turn_is_kept_as_worry_memory() {
        let f = fixture();
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();

        f.engine.send_message(&session.id, "시험이 너무 걱정돼").await.unwrap();

        let memories = f.engine.store().memories().unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].kind, MemoryKind::Worry);
        assert_eq!(memories[0].user.as_deref(), Some("시험이 너무 걱정돼"));
    }

    #[tokio::test]
    async fn test_cancel_scheduled_removes_memory_and_notification() {
        let f = fixture();
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();
        let tomorrow = Local::now().date_naive().succ_opt().unwrap();
        f.client.set(|r| {
            r.date = tomorrow.format("%Y-%m-%d").to_string();
            r.time = "09:00".to_string();
        });
        f.engine.send_message(&session.id, "내일 아침에 병원 가").await.unwrap();
        assert_eq!(f.notifier.scheduled().len(), 1);

        assert!(f.engine.cancel_scheduled(0).await.unwrap());

        assert!(f.engine.store().memories().unwrap().is_empty());
        assert!(f.notifier.scheduled().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_sorted_by_recency() {
        let f = fixture();
        complete_onboarding(&f.engine);
        let old = f.engine.start_session().unwrap();
        let recent = f.engine.start_session().unwrap();

        f.engine.send_message(&recent.id, "먼저 얘기").await.unwrap();
        f.engine.send_message(&old.id, "나중 얘기").await.unwrap();

        let sessions = f.engine.sessions().unwrap();
        assert_eq!(sessions[0].id, old.id);
        assert_eq!(sessions[1].id, recent.id);
    }

    #[tokio::test]
    async fn test_deleting_session_drops_pending_tasks() {
        let f = fixture();
        complete_onboarding(&f.engine);
        let session = f.engine.start_session().unwrap();
        f.client
            .set(|r| r.tasks = r#"[{"id": "x", "content": "청소"}]"#.to_string());
        f.engine.send_message(&session.id, "청소해야지").await.unwrap();
        assert_eq!(f.engine.pending_tasks(&session.id).len(), 1);

        f.engine.delete_session(&session.id).unwrap();
        assert!(f.engine.pending_tasks(&session.id).is_empty());
        assert!(f.engine.store().session(&session.id).unwrap().is_none());
    }
}
