//! Durable collections over the key-value backend.
//!
//! Each logical collection lives under one fixed key as a JSON string:
//! sessions, per-session message logs, memories, tasks, user profile and the
//! dashboard task-completion checklist. Mutations go through `Kv::update`, so
//! a whole snapshot-then-write cycle runs as one critical section.

use crate::logging;
use crate::storage::Kv;
use chrono::{Local, Utc};
use rusqlite::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const SESSIONS_KEY: &str = "chatSessions";
const MEMORIES_KEY: &str = "chat_memories";
const TASKS_KEY: &str = "storedTasks";
const USER_INFO_KEY: &str = "user_info";
const TASK_COMPLETION_KEY: &str = "taskCompletion";

fn messages_key(session_id: &str) -> String {
    format!("chatMessages:{}", session_id)
}

// ============ Entity Types ============

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Sender {
    User,
    Ai,
}

/// Per-session slot-filling progress, persisted with the session record so
/// the flow survives restarts.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum OnboardingStep {
    AwaitingName,
    AwaitingOccupation,
    AwaitingStudentLevel,
    #[default]
    FreeChat,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub start: String,
    pub title: String,
    pub last: String,
    pub title_generated: bool,
    #[serde(default)]
    pub onboarding: OnboardingStep,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    pub timestamp: String,
}

impl StoredMessage {
    pub fn new(sender: Sender, text: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender,
            text: text.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum MemoryKind {
    #[default]
    Normal,
    TodayTask,
    UserInfo,
    Worry,
    Emotion,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
}

/// One extracted fact. Either a conversational pair (`user`/`ai`) or a
/// standalone fact (`info`), sharing the envelope fields.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Stable id assigned at creation; index addressing is translated to it.
    #[serde(default)]
    pub id: String,
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub kind: MemoryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<MemoryMeta>,
}

impl Memory {
    pub fn pair(kind: MemoryKind, session_id: &str, user: &str, ai: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            // Local clock, not UTC: the dashboard partitions "today" by the
            // device-local date prefix of this stamp.
            timestamp: Local::now().to_rfc3339(),
            kind,
            session_id: Some(session_id.to_string()),
            user: Some(user.to_string()),
            ai: Some(ai.to_string()),
            tasks: None,
            info: None,
            meta: None,
        }
    }

    pub fn fact(session_id: &str, info: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Local::now().to_rfc3339(),
            kind: MemoryKind::UserInfo,
            session_id: Some(session_id.to_string()),
            user: None,
            ai: None,
            tasks: None,
            info: Some(info.to_string()),
            meta: None,
        }
    }

    /// The user-facing text of this memory: the stated fact for the
    /// standalone shape, otherwise the user's utterance.
    pub fn display_text(&self) -> &str {
        self.info
            .as_deref()
            .or(self.user.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
    pub created_at: String,
}

/// One record per install, shallow-merged on every save.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl UserProfile {
    fn merge(&mut self, patch: UserProfile) {
        if patch.name.is_some() {
            self.name = patch.name;
        }
        if patch.job.is_some() {
            self.job = patch.job;
        }
        if patch.level.is_some() {
            self.level = patch.level;
        }
    }
}

// ============ Store ============

#[derive(Clone)]
pub struct Store {
    kv: Kv,
}

fn decode<T: DeserializeOwned + Default>(key: &str, raw: Option<String>) -> T {
    match raw {
        None => T::default(),
        Some(s) => match serde_json::from_str(&s) {
            Ok(v) => v,
            Err(e) => {
                logging::log_error(None, &format!("corrupt collection {}: {} (recovering as empty)", key, e));
                T::default()
            }
        },
    }
}

fn encode<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

impl Store {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Kv::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Kv::open_in_memory()?))
    }

    fn read<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        Ok(decode(key, self.kv.get(key)?))
    }

    // ============ Sessions ============

    /// Create a session with a creation-time id, a placeholder title and an
    /// empty message log, both written immediately.
    pub fn create_session(&self, onboarding: OnboardingStep) -> Result<ChatSession> {
        let now = Utc::now();
        let mut session = ChatSession {
            id: now.timestamp_millis().to_string(),
            start: now.to_rfc3339(),
            title: "새 대화".to_string(),
            last: now.to_rfc3339(),
            title_generated: false,
            onboarding,
        };
        let created = &mut session;
        self.kv.update(SESSIONS_KEY, |raw| {
            let mut sessions: Vec<ChatSession> = decode(SESSIONS_KEY, raw);
            // Millisecond ids can collide when sessions are created back to
            // back; suffix until unique.
            while sessions.iter().any(|s| s.id == created.id) {
                created.id = format!("{}-{}", created.id, sessions.len());
            }
            sessions.push(created.clone());
            Some(encode(&sessions))
        })?;
        self.kv.put(&messages_key(&session.id), "[]")?;
        logging::log_store(Some(&session.id), "session created");
        Ok(session)
    }

    pub fn all_sessions(&self) -> Result<Vec<ChatSession>> {
        self.read(SESSIONS_KEY)
    }

    pub fn session(&self, id: &str) -> Result<Option<ChatSession>> {
        Ok(self.all_sessions()?.into_iter().find(|s| s.id == id))
    }

    /// Apply an in-place edit to one session record. Returns false when the
    /// id is unknown.
    pub fn update_session<F>(&self, id: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut ChatSession),
    {
        let mut found = false;
        self.kv.update(SESSIONS_KEY, |raw| {
            let mut sessions: Vec<ChatSession> = decode(SESSIONS_KEY, raw);
            if let Some(session) = sessions.iter_mut().find(|s| s.id == id) {
                f(session);
                found = true;
            }
            Some(encode(&sessions))
        })?;
        Ok(found)
    }

    /// Delete sessions and cascade to their message logs.
    pub fn delete_sessions(&self, ids: &[String]) -> Result<()> {
        let ids: HashSet<&String> = ids.iter().collect();
        self.kv.update(SESSIONS_KEY, |raw| {
            let mut sessions: Vec<ChatSession> = decode(SESSIONS_KEY, raw);
            sessions.retain(|s| !ids.contains(&s.id));
            Some(encode(&sessions))
        })?;
        for id in &ids {
            self.kv.remove(&messages_key(id))?;
            logging::log_store(Some(id), "session deleted");
        }
        Ok(())
    }

    // ============ Messages ============

    pub fn messages(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        self.read(&messages_key(session_id))
    }

    /// Append one message to the session log and refresh the session's
    /// recency timestamp. The log is flushed before this returns.
    pub fn append_message(&self, session_id: &str, message: StoredMessage) -> Result<()> {
        let key = messages_key(session_id);
        let timestamp = message.timestamp.clone();
        self.kv.update(&key, |raw| {
            let mut messages: Vec<StoredMessage> = decode(&key, raw);
            messages.push(message);
            Some(encode(&messages))
        })?;
        self.update_session(session_id, |s| s.last = timestamp)?;
        Ok(())
    }

    // ============ Memories ============

    pub fn memories(&self) -> Result<Vec<Memory>> {
        self.read(MEMORIES_KEY)
    }

    pub fn append_memory(&self, memory: Memory) -> Result<()> {
        self.kv.update(MEMORIES_KEY, |raw| {
            let mut memories: Vec<Memory> = decode(MEMORIES_KEY, raw);
            memories.push(memory);
            Some(encode(&memories))
        })
    }

    /// Edit the memory at `index` in place. Indices address the full
    /// collection snapshot, never a filtered view.
    pub fn update_memory_at<F>(&self, index: usize, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Memory),
    {
        let mut found = false;
        self.kv.update(MEMORIES_KEY, |raw| {
            let mut memories: Vec<Memory> = decode(MEMORIES_KEY, raw);
            if let Some(memory) = memories.get_mut(index) {
                f(memory);
                found = true;
            }
            Some(encode(&memories))
        })?;
        Ok(found)
    }

    pub fn delete_memory_at(&self, index: usize) -> Result<bool> {
        Ok(self.delete_memories_at(&[index])? == 1)
    }

    /// Delete one memory by its stable id. The right call when the record
    /// was identified on an earlier snapshot and the collection may have
    /// shifted since.
    pub fn delete_memory(&self, id: &str) -> Result<bool> {
        let mut removed = false;
        self.kv.update(MEMORIES_KEY, |raw| {
            let mut memories: Vec<Memory> = decode(MEMORIES_KEY, raw);
            let before = memories.len();
            memories.retain(|m| m.id != id);
            removed = memories.len() != before;
            removed.then(|| encode(&memories))
        })?;
        Ok(removed)
    }

    /// Delete the memories at the given snapshot positions. The indices are
    /// translated to the stable ids of the records they address inside the
    /// same critical section, so survivors keep their relative order and a
    /// stale filtered-view index can never hit the wrong record.
    pub fn delete_memories_at(&self, indices: &[usize]) -> Result<usize> {
        let mut removed = 0;
        self.kv.update(MEMORIES_KEY, |raw| {
            let mut memories: Vec<Memory> = decode(MEMORIES_KEY, raw);
            let doomed: HashSet<String> = indices
                .iter()
                .filter_map(|&i| memories.get(i).map(|m| m.id.clone()))
                .collect();
            let before = memories.len();
            memories.retain(|m| !doomed.contains(&m.id));
            removed = before - memories.len();
            Some(encode(&memories))
        })?;
        Ok(removed)
    }

    // ============ Tasks ============

    /// Read all tasks, self-healing duplicate ids by rewriting them. The
    /// healed list is persisted before it is returned; a clean read writes
    /// nothing back.
    pub fn all_tasks(&self) -> Result<Vec<Task>> {
        let mut result = Vec::new();
        self.kv.update(TASKS_KEY, |raw| {
            let mut tasks: Vec<Task> = decode(TASKS_KEY, raw);
            let mut seen: HashSet<String> = HashSet::new();
            let mut healed = false;
            for (idx, task) in tasks.iter_mut().enumerate() {
                if !seen.insert(task.id.clone()) {
                    let new_id = format!("{}-{}-{}", task.id, idx, Utc::now().timestamp_millis());
                    logging::log_store(
                        None,
                        &format!("duplicate task id {} rewritten to {}", task.id, new_id),
                    );
                    seen.insert(new_id.clone());
                    task.id = new_id;
                    healed = true;
                }
            }
            result = tasks.clone();
            healed.then(|| encode(&tasks))
        })?;
        Ok(result)
    }

    pub fn add_tasks(&self, new_tasks: &[Task]) -> Result<()> {
        self.kv.update(TASKS_KEY, |raw| {
            let mut tasks: Vec<Task> = decode(TASKS_KEY, raw);
            tasks.extend_from_slice(new_tasks);
            Some(encode(&tasks))
        })
    }

    /// Full-record replace by id. Returns false when the id is unknown.
    pub fn update_task(&self, updated: &Task) -> Result<bool> {
        let mut found = false;
        self.kv.update(TASKS_KEY, |raw| {
            let mut tasks: Vec<Task> = decode(TASKS_KEY, raw);
            if let Some(task) = tasks.iter_mut().find(|t| t.id == updated.id) {
                *task = updated.clone();
                found = true;
            }
            Some(encode(&tasks))
        })?;
        Ok(found)
    }

    pub fn delete_task(&self, id: &str) -> Result<()> {
        self.delete_tasks(&[id.to_string()])
    }

    pub fn delete_tasks(&self, ids: &[String]) -> Result<()> {
        let ids: HashSet<&String> = ids.iter().collect();
        self.kv.update(TASKS_KEY, |raw| {
            let mut tasks: Vec<Task> = decode(TASKS_KEY, raw);
            tasks.retain(|t| !ids.contains(&t.id));
            Some(encode(&tasks))
        })
    }

    // ============ User Profile ============

    pub fn profile(&self) -> Result<UserProfile> {
        self.read(USER_INFO_KEY)
    }

    /// Shallow-merge the given fields over the stored profile and return the
    /// merged record.
    pub fn merge_profile(&self, patch: UserProfile) -> Result<UserProfile> {
        let mut merged = UserProfile::default();
        self.kv.update(USER_INFO_KEY, |raw| {
            let mut profile: UserProfile = decode(USER_INFO_KEY, raw);
            profile.merge(patch);
            merged = profile.clone();
            Some(encode(&profile))
        })?;
        Ok(merged)
    }

    // ============ Task Completion Checklist ============

    pub fn task_completion(&self) -> Result<Vec<bool>> {
        self.read(TASK_COMPLETION_KEY)
    }

    pub fn set_task_completion(&self, completion: &[bool]) -> Result<()> {
        self.kv.put(TASK_COMPLETION_KEY, &encode(&completion))
    }
}
