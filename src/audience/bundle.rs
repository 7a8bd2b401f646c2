use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

use crate::UserId;

/// Client acknowledgment of an asset bundle offer. DECLINED is terminal
/// until the user's record is cleared on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Unknown,
    Accepted,
    Declined,
    Failed,
}

#[derive(Debug, Clone)]
struct DeliveryRecord {
    url: String,
    hash: String,
    sent_at: Instant,
    status: DeliveryStatus,
}

/// Per-user asset bundle delivery memory: avoids redundant re-downloads,
/// respects declines, and rate-limits retries.
pub struct AssetBundleTracker {
    records: HashMap<UserId, DeliveryRecord>,
    cooldown: Duration,
}

impl AssetBundleTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            records: HashMap::new(),
            cooldown,
        }
    }

    /// Whether the bundle at (url, hash) should be offered to this user now.
    pub fn should_send(&self, user: &UserId, url: &str, hash: &str, now: Instant) -> bool {
        match self.records.get(user) {
            None => true,
            Some(rec) => {
                if rec.status == DeliveryStatus::Declined {
                    return false;
                }
                if now.duration_since(rec.sent_at) < self.cooldown {
                    return false;
                }
                rec.url != url || rec.hash != hash || rec.status != DeliveryStatus::Accepted
            }
        }
    }

    /// Record a send attempt. New content resets the status to Unknown;
    /// re-sends of the same content keep the previous acknowledgment.
    pub fn mark_sent(&mut self, user: UserId, url: &str, hash: &str, now: Instant) {
        let status = match self.records.get(&user) {
            Some(rec) if rec.url == url && rec.hash == hash => rec.status,
            _ => DeliveryStatus::Unknown,
        };
        self.records.insert(
            user,
            DeliveryRecord {
                url: url.to_string(),
                hash: hash.to_string(),
                sent_at: now,
                status,
            },
        );
    }

    /// Apply an asynchronous client acknowledgment.
    pub fn record_status(&mut self, user: &UserId, status: DeliveryStatus) {
        if let Some(rec) = self.records.get_mut(user) {
            rec.status = status;
        }
    }

    /// Drop one user's state (disconnect).
    pub fn clear(&mut self, user: &UserId) {
        self.records.remove(user);
    }

    /// Drop state for users no longer connected.
    pub fn retain_online(&mut self, online: &HashSet<UserId>) {
        self.records.retain(|user, _| online.contains(user));
    }

    pub fn status(&self, user: &UserId) -> DeliveryStatus {
        self.records
            .get(user)
            .map(|r| r.status)
            .unwrap_or(DeliveryStatus::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const URL: &str = "http://host/pack.zip";

    fn tracker() -> AssetBundleTracker {
        AssetBundleTracker::new(Duration::from_secs(20))
    }

    #[test]
    fn first_contact_sends() {
        let t = tracker();
        let user = Uuid::new_v4();
        assert!(t.should_send(&user, URL, "h1", Instant::now()));
    }

    #[test]
    fn decline_is_terminal_until_clear() {
        let mut t = tracker();
        let user = Uuid::new_v4();
        let now = Instant::now();
        t.mark_sent(user, URL, "h1", now);
        t.record_status(&user, DeliveryStatus::Declined);

        // Even new content and an elapsed cooldown do not override a decline.
        let later = now + Duration::from_secs(3600);
        assert!(!t.should_send(&user, URL, "h2", later));

        t.clear(&user);
        assert!(t.should_send(&user, URL, "h2", later));
    }

    #[test]
    fn cooldown_gates_resends() {
        let mut t = tracker();
        let user = Uuid::new_v4();
        let now = Instant::now();
        t.mark_sent(user, URL, "h1", now);

        assert!(!t.should_send(&user, URL, "h1", now + Duration::from_secs(5)));
        // Not yet accepted, cooldown elapsed: try again.
        assert!(t.should_send(&user, URL, "h1", now + Duration::from_secs(25)));
    }

    #[test]
    fn accepted_same_content_never_resends() {
        let mut t = tracker();
        let user = Uuid::new_v4();
        let now = Instant::now();
        t.mark_sent(user, URL, "h1", now);
        t.record_status(&user, DeliveryStatus::Accepted);

        let later = now + Duration::from_secs(3600);
        assert!(!t.should_send(&user, URL, "h1", later));
        // Content changed: deliver the new bundle.
        assert!(t.should_send(&user, URL, "h2", later));
    }

    #[test]
    fn retain_online_drops_disconnected() {
        let mut t = tracker();
        let staying = Uuid::new_v4();
        let leaving = Uuid::new_v4();
        let now = Instant::now();
        t.mark_sent(staying, URL, "h1", now);
        t.mark_sent(leaving, URL, "h1", now);
        t.record_status(&leaving, DeliveryStatus::Declined);

        t.retain_online(&[staying].into_iter().collect());
        assert_eq!(t.status(&leaving), DeliveryStatus::Unknown);
        assert!(t.should_send(&leaving, URL, "h1", now + Duration::from_secs(30)));
    }
}
