//! Local notification scheduling.
//!
//! The platform notification subsystem is an external collaborator behind the
//! `Notifier` trait: register a timed notification, get an opaque id back,
//! cancel by id later. `LocalNotifier` is the in-process implementation a
//! host shell can drain.

use crate::logging;
use crate::store::Store;
use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledNotification {
    pub id: String,
    pub trigger: NaiveDateTime,
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Register a notification for the given local wall-clock instant and
    /// return a scheduler-assigned identifier.
    async fn register(
        &self,
        trigger: NaiveDateTime,
        title: &str,
        body: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;

    /// Cancel by identifier. Unknown or already-fired ids are a no-op.
    async fn cancel(&self, id: &str);
}

#[derive(Default)]
pub struct LocalNotifier {
    scheduled: Mutex<HashMap<String, ScheduledNotification>>,
}

impl LocalNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<ScheduledNotification> {
        let mut all: Vec<ScheduledNotification> =
            self.scheduled.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.trigger.cmp(&b.trigger));
        all
    }

    /// Remove and return every notification whose trigger has passed.
    pub fn due(&self, now: NaiveDateTime) -> Vec<ScheduledNotification> {
        let mut scheduled = self.scheduled.lock().unwrap();
        let due_ids: Vec<String> = scheduled
            .values()
            .filter(|n| n.trigger <= now)
            .map(|n| n.id.clone())
            .collect();
        let mut fired: Vec<ScheduledNotification> = due_ids
            .iter()
            .filter_map(|id| scheduled.remove(id))
            .collect();
        fired.sort_by(|a, b| a.trigger.cmp(&b.trigger));
        fired
    }
}

#[async_trait]
impl Notifier for LocalNotifier {
    async fn register(
        &self,
        trigger: NaiveDateTime,
        title: &str,
        body: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let id = uuid::Uuid::new_v4().to_string();
        let notification = ScheduledNotification {
            id: id.clone(),
            trigger,
            title: title.to_string(),
            body: body.to_string(),
        };
        self.scheduled.lock().unwrap().insert(id.clone(), notification);
        Ok(id)
    }

    async fn cancel(&self, id: &str) {
        self.scheduled.lock().unwrap().remove(id);
    }
}

/// Trigger instant for an extracted date: local midnight, or the given
/// time of day.
pub fn trigger_at(date: NaiveDate, time: Option<NaiveTime>) -> NaiveDateTime {
    match time {
        Some(time) => date.and_time(time),
        None => date.and_hms_opt(0, 0, 0).expect("midnight is a valid time"),
    }
}

/// Schedule a reminder for an extracted date/time. No date means no
/// notification (returns None); a registration failure degrades to None.
pub async fn schedule_notification(
    notifier: &dyn Notifier,
    text: &str,
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
) -> Option<String> {
    let date = date?;
    let trigger = trigger_at(date, time);
    let body = format!("\"{}\" 할 시간이야.", text);
    match notifier.register(trigger, "알림", &body).await {
        Ok(id) => {
            logging::log_notify(None, &format!("scheduled {} at {}", id, trigger));
            Some(id)
        }
        Err(e) => {
            logging::log_error(None, &format!("notification registration failed: {}", e));
            None
        }
    }
}

/// Fire an immediate reminder for every memory stamped with today's date.
/// Run on startup, mirroring the app-launch reminder sweep.
pub async fn fire_today_reminders(
    store: &Store,
    notifier: &dyn Notifier,
    today: NaiveDate,
) -> usize {
    let memories = match store.memories() {
        Ok(memories) => memories,
        Err(e) => {
            logging::log_error(None, &format!("reminder sweep read failed: {}", e));
            return 0;
        }
    };

    let today_str = today.format("%Y-%m-%d").to_string();
    let now = Local::now().naive_local();
    let mut fired = 0;

    for memory in &memories {
        let is_today = memory
            .meta
            .as_ref()
            .and_then(|meta| meta.date.as_deref())
            .is_some_and(|date| date == today_str);
        if !is_today {
            continue;
        }
        let body = format!("\"{}\" 기억나? 오늘 그날이야!", memory.display_text());
        if notifier.register(now, "📌 오늘 일정", &body).await.is_ok() {
            fired += 1;
        }
    }

    if fired > 0 {
        logging::log_notify(None, &format!("fired {} same-day reminders", fired));
    }
    fired
}
