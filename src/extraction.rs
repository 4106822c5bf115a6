//! Extraction contracts against the text-completion collaborator.
//!
//! Every service here is best-effort: a network error, a timeout or an
//! unparseable response degrades to the empty/null value and logs a warning.
//! Nothing in this module surfaces an error to the conversation turn.

use crate::logging;
use crate::openai::{ChatMessage, CompletionClient};
use crate::prompts;
use crate::store::{Priority, Sender, StoredMessage};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::time::Duration;

/// One task as reported by the collaborator. The id is untrusted; callers
/// assign fresh ids before persisting.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTask {
    #[serde(default)]
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

/// One bounded collaborator call; None on failure or timeout.
async fn ask(
    client: &dyn CompletionClient,
    timeout: Duration,
    messages: Vec<ChatMessage>,
    temperature: f32,
) -> Option<String> {
    match tokio::time::timeout(timeout, client.complete(messages, temperature)).await {
        Ok(Ok(text)) => Some(text),
        Ok(Err(e)) => {
            logging::log_error(None, &format!("collaborator call failed: {}", e));
            None
        }
        Err(_) => {
            logging::log_error(None, "collaborator call timed out");
            None
        }
    }
}

fn transcript_messages(system: &str, history: &[StoredMessage]) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system)];
    messages.extend(history.iter().map(|m| match m.sender {
        Sender::User => ChatMessage::user(m.text.clone()),
        Sender::Ai => ChatMessage::assistant(m.text.clone()),
    }));
    messages
}

// ============ Personal-info summary ============

/// Declarative "사용자는 ..." sentence, or empty when the utterance holds no
/// personal fact.
pub async fn summarize_user_info(
    client: &dyn CompletionClient,
    timeout: Duration,
    text: &str,
) -> String {
    let messages = vec![
        ChatMessage::system(prompts::USER_INFO_SUMMARY),
        ChatMessage::user(text),
    ];
    match ask(client, timeout, messages, 0.2).await {
        Some(raw) => normalize_summary(&raw),
        None => String::new(),
    }
}

/// The collaborator sometimes answers the literal "빈 문자열" or quoted
/// emptiness instead of an empty response; all of those normalize to "".
fn normalize_summary(raw: &str) -> String {
    let text = raw.trim();
    if text == "빈 문자열" || text == "\"\"" {
        return String::new();
    }
    let stripped: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '"')
        .collect();
    if stripped.is_empty() {
        return String::new();
    }
    text.to_string()
}

// ============ Date / time ============

pub async fn extract_date(
    client: &dyn CompletionClient,
    timeout: Duration,
    text: &str,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let messages = vec![
        ChatMessage::system(prompts::date_extraction(&today.format("%Y-%m-%d").to_string())),
        ChatMessage::user(text),
    ];
    let raw = ask(client, timeout, messages, 0.0).await?;
    parse_date(&raw)
}

pub async fn extract_time(
    client: &dyn CompletionClient,
    timeout: Duration,
    text: &str,
) -> Option<NaiveTime> {
    let messages = vec![
        ChatMessage::system(prompts::TIME_EXTRACTION),
        ChatMessage::user(text),
    ];
    let raw = ask(client, timeout, messages, 0.0).await?;
    parse_time(&raw)
}

fn strip_quotes(raw: &str) -> &str {
    raw.trim().trim_matches('"').trim()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(strip_quotes(raw), "%Y-%m-%d").ok()
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(strip_quotes(raw), "%H:%M").ok()
}

// ============ Tasks ============

/// Extract task records from the whole transcript. Any parse failure or a
/// non-array response means "no tasks found".
pub async fn extract_tasks(
    client: &dyn CompletionClient,
    timeout: Duration,
    history: &[StoredMessage],
) -> Vec<ExtractedTask> {
    let messages = transcript_messages(prompts::TASK_EXTRACTION, history);
    match ask(client, timeout, messages, 0.0).await {
        Some(raw) => parse_task_json(&raw),
        None => Vec::new(),
    }
}

fn parse_task_json(raw: &str) -> Vec<ExtractedTask> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str::<Vec<ExtractedTask>>(cleaned) {
        Ok(tasks) => tasks,
        Err(e) => {
            logging::log_extraction(
                None,
                &format!(
                    "task JSON parse failed ({}); treating as no tasks. Response: {}",
                    e,
                    &cleaned.chars().take(120).collect::<String>()
                ),
            );
            Vec::new()
        }
    }
}

// ============ Title ============

/// Short label for the session's opening messages; empty means "do not
/// update the title now".
pub async fn generate_title(
    client: &dyn CompletionClient,
    timeout: Duration,
    history: &[StoredMessage],
) -> String {
    let transcript: String = history
        .iter()
        .map(|m| {
            let who = match m.sender {
                Sender::User => "User",
                Sender::Ai => "AI",
            };
            format!("{}: {}", who, m.text)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let messages = vec![
        ChatMessage::system(prompts::TITLE_GENERATION),
        ChatMessage::user(transcript),
    ];
    match ask(client, timeout, messages, 0.5).await {
        Some(raw) => truncate_title(&raw),
        None => String::new(),
    }
}

/// Newlines removed, hard cap of 30 characters.
fn truncate_title(raw: &str) -> String {
    raw.trim().replace('\n', "").chars().take(30).collect()
}
