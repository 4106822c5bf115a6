//! Read-side dashboard views over the memory collection.
//!
//! Pure functions: nothing here is persisted, so the summary is safe to
//! recompute on every read.

use crate::keywords;
use crate::store::{Memory, MemoryKind};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingEvent {
    pub event: Option<String>,
    pub date: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledReminder {
    /// Position in the full memory collection, usable for index-addressed
    /// deletion against the same snapshot.
    pub index: usize,
    pub notification_id: String,
    pub event: String,
    pub date: String,
    pub time: String,
}

#[derive(Debug, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub today_tasks: Vec<String>,
    pub upcoming: Vec<UpcomingEvent>,
    pub worries: Vec<String>,
    pub emotions: Vec<String>,
    pub scheduled: Vec<ScheduledReminder>,
}

/// Partition the memory collection into the dashboard views for `today`.
pub fn summarize(memories: &[Memory], today: NaiveDate) -> DashboardSummary {
    let today_str = today.format("%Y-%m-%d").to_string();
    let mut summary = DashboardSummary::default();

    for (index, memory) in memories.iter().enumerate() {
        let meta = memory.meta.as_ref();
        let meta_date = meta.and_then(|m| m.date.as_deref());

        if memory.kind == MemoryKind::TodayTask && memory.timestamp.starts_with(&today_str) {
            if let Some(tasks) = &memory.tasks {
                summary.today_tasks.extend(tasks.iter().cloned());
            }
        }

        if let Some(date) = meta_date {
            if date > today_str.as_str() {
                summary.upcoming.push(UpcomingEvent {
                    event: meta.and_then(|m| m.event.clone()),
                    date: date.to_string(),
                });
            }
        }

        if let (Some(date), Some(time), Some(notification_id)) = (
            meta_date,
            meta.and_then(|m| m.time.as_deref()),
            meta.and_then(|m| m.notification_id.as_deref()),
        ) {
            summary.scheduled.push(ScheduledReminder {
                index,
                notification_id: notification_id.to_string(),
                event: meta
                    .and_then(|m| m.event.clone())
                    .unwrap_or_else(|| memory.display_text().to_string()),
                date: date.to_string(),
                time: time.to_string(),
            });
        }

        let text = memory.display_text();
        if keywords::contains_worry(text) {
            summary.worries.push(text.to_string());
        }
        if let Some(tag) = keywords::detect_emotion(text) {
            // De-duplicated, first occurrence order.
            if !summary.emotions.iter().any(|t| t == tag) {
                summary.emotions.push(tag.to_string());
            }
        }
    }

    // Ascending by trigger timestamp; ISO date + HH:mm sort lexicographically.
    summary
        .scheduled
        .sort_by(|a, b| (&a.date, &a.time).cmp(&(&b.date, &b.time)));

    summary
}

/// Percentage of checked entries in the today-task checklist, rounded.
pub fn completion_rate(completion: &[bool]) -> u32 {
    if completion.is_empty() {
        return 0;
    }
    let done = completion.iter().filter(|&&c| c).count();
    ((done as f64 / completion.len() as f64) * 100.0).round() as u32
}
