//! Haru - Journaling Companion Core
//!
//! The conversational core of a journaling companion: chat sessions with a
//! scripted onboarding flow, an LLM collaborator for replies and structured
//! extraction (personal facts, tasks, dates, times, titles), a layered
//! key-value store over SQLite, local notification scheduling and the
//! dashboard read side.
//!
//! [`engine::ConversationEngine`] is the entry point; everything else
//! supports it.

pub mod dashboard;
pub mod engine;
pub mod extraction;
pub mod keywords;
pub mod logging;
pub mod notify;
pub mod openai;
pub mod prompts;
pub mod storage;
pub mod store;

pub use dashboard::{summarize, DashboardSummary};
pub use engine::{ConversationEngine, EngineConfig, TurnOutcome};
pub use notify::{LocalNotifier, Notifier};
pub use openai::{CompletionClient, OpenAiClient, DEFAULT_MODEL};
pub use storage::Kv;
pub use store::{ChatSession, Memory, MemoryKind, Store, StoredMessage, Task, UserProfile};
