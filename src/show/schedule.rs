use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatPolicy {
    None,
    Daily,
    Weekly,
}

/// One timed auto-start: play `media_id` in `room_id` when `next_run` passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: Uuid,
    pub room_id: String,
    pub media_id: String,
    pub next_run: DateTime<Utc>,
    pub repeat: RepeatPolicy,
    pub enabled: bool,
    pub last_triggered: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
    pub fn new(room_id: &str, media_id: &str, next_run: DateTime<Utc>, repeat: RepeatPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id: room_id.to_string(),
            media_id: media_id.to_string(),
            next_run,
            repeat,
            enabled: true,
            last_triggered: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run <= now
    }

    /// Advance past `now` for repeating entries; disable one-shots.
    pub fn mark_triggered(&mut self, now: DateTime<Utc>) {
        self.last_triggered = Some(now);
        let step = match self.repeat {
            RepeatPolicy::None => {
                self.enabled = false;
                return;
            }
            RepeatPolicy::Daily => Duration::days(1),
            RepeatPolicy::Weekly => Duration::weeks(1),
        };
        while self.next_run <= now {
            self.next_run += step;
        }
    }
}
