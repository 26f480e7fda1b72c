// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! In-memory queue of transaction notifications.
//!
//! A notification starts PENDING and moves once to SUCCESS, ERROR or REJECTED. Entries flagged
//! `auto_close` count down one second at a time on a background task, whatever their status,
//! and remove themselves when the countdown hits zero. Every countdown hangs off the tracker's
//! cancellation token, so removing an entry or shutting the tracker down stops its timer before
//! it can touch state that is gone.

use crate::utils::{counters::NOTIFICATIONS_COUNT, util::unix_now_millis};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Seconds an auto-closing notification stays visible.
pub const AUTO_CLOSE_SECS: u32 = 5;
const TICK: Duration = Duration::from_secs(1);

pub const DEFAULT_PENDING_MESSAGE: &str = "Processing transaction...";
pub const DEFAULT_EXPLORER_URL: &str = "https://sepolia.basescan.org";

pub type NotificationId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    Pending,
    Success,
    Error,
    Rejected,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Success => "success",
            TxStatus::Error => "error",
            TxStatus::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionNotification {
    pub id: NotificationId,
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
    pub message: String,
    pub hash: Option<String>,
    pub auto_close: bool,
    /// Seconds until removal, while a countdown runs.
    pub time_left: Option<u32>,
}

/// Fields for a new notification. Unset fields take the pending defaults.
#[derive(Clone, Debug, Default)]
pub struct NewNotification {
    pub status: Option<TxStatus>,
    pub message: Option<String>,
    pub hash: Option<String>,
    pub auto_close: Option<bool>,
}

impl NewNotification {
    pub fn pending(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Partial update, merged into an existing entry.
#[derive(Clone, Debug, Default)]
pub struct NotificationUpdate {
    pub status: Option<TxStatus>,
    pub message: Option<String>,
    pub hash: Option<String>,
    pub auto_close: Option<bool>,
}

impl NotificationUpdate {
    pub fn finished(status: TxStatus, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }
}

#[derive(Default)]
struct TrackerState {
    /// Newest first.
    notifications: Vec<TransactionNotification>,
    timers: HashMap<NotificationId, CancellationToken>,
    last_id: NotificationId,
}

#[derive(Clone)]
pub struct NotificationTracker {
    state: Arc<Mutex<TrackerState>>,
    cancel: CancellationToken,
    explorer_url: String,
}

impl Default for NotificationTracker {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl NotificationTracker {
    /// Countdowns stop when `cancel` fires.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState::default())),
            cancel,
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
        }
    }

    pub fn with_explorer_url(mut self, explorer_url: impl Into<String>) -> Self {
        self.explorer_url = explorer_url.into().trim_end_matches('/').to_string();
        self
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ids are creation times in milliseconds, bumped forward when two land in the same
    /// millisecond.
    pub fn add(&self, new: NewNotification) -> NotificationId {
        let status = new.status.unwrap_or(TxStatus::Pending);
        let auto_close = new.auto_close.unwrap_or(true);
        let id = {
            let mut state = self.lock();
            let id = unix_now_millis().max(state.last_id + 1);
            state.last_id = id;
            state.notifications.insert(0, TransactionNotification {
                id,
                timestamp: Utc::now(),
                status,
                message: new
                    .message
                    .unwrap_or_else(|| DEFAULT_PENDING_MESSAGE.to_string()),
                hash: new.hash,
                auto_close,
                time_left: None,
            });
            id
        };
        NOTIFICATIONS_COUNT.with_label_values(&[status.as_str()]).inc();
        debug!(notification_id = id, status = status.as_str(), "[Notifications] Added");
        if auto_close {
            self.start_countdown(id);
        }
        id
    }

    /// Merge `update` into the entry. Absent ids are ignored, and a terminal status is never
    /// replaced.
    pub fn update(&self, id: NotificationId, update: NotificationUpdate) {
        let start_countdown = {
            let mut state = self.lock();
            let has_timer = state.timers.contains_key(&id);
            let Some(entry) = state.notifications.iter_mut().find(|n| n.id == id) else {
                debug!(notification_id = id, "[Notifications] Update for unknown id ignored");
                return;
            };
            if let Some(status) = update.status {
                if entry.status.is_terminal() && status != entry.status {
                    warn!(
                        notification_id = id,
                        from = entry.status.as_str(),
                        to = status.as_str(),
                        "[Notifications] Ignoring transition out of a terminal status"
                    );
                } else if status != entry.status {
                    entry.status = status;
                    NOTIFICATIONS_COUNT.with_label_values(&[status.as_str()]).inc();
                }
            }
            if let Some(message) = update.message {
                entry.message = message;
            }
            if update.hash.is_some() {
                entry.hash = update.hash;
            }
            if let Some(auto_close) = update.auto_close {
                entry.auto_close = auto_close;
            }
            if !entry.auto_close {
                entry.time_left = None;
                if let Some(timer) = state.timers.remove(&id) {
                    timer.cancel();
                }
                false
            } else {
                !has_timer
            }
        };
        if start_countdown {
            self.start_countdown(id);
        }
    }

    /// Drop the entry and stop its countdown.
    pub fn remove(&self, id: NotificationId) {
        let mut state = self.lock();
        state.notifications.retain(|n| n.id != id);
        if let Some(timer) = state.timers.remove(&id) {
            timer.cancel();
        }
    }

    pub fn list(&self) -> Vec<TransactionNotification> {
        self.lock().notifications.clone()
    }

    pub fn get(&self, id: NotificationId) -> Option<TransactionNotification> {
        self.lock().notifications.iter().find(|n| n.id == id).cloned()
    }

    pub fn explorer_link(&self, hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url, hash)
    }

    /// Stop every countdown. Entries stay where they are.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.lock().timers.clear();
    }

    fn start_countdown(&self, id: NotificationId) {
        if self.cancel.is_cancelled() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(notification_id = id, "[Notifications] No runtime, auto close disabled");
            return;
        };
        let token = self.cancel.child_token();
        {
            let mut state = self.lock();
            let Some(entry) = state.notifications.iter_mut().find(|n| n.id == id) else {
                return;
            };
            entry.time_left = Some(AUTO_CLOSE_SECS);
            state.timers.insert(id, token.clone());
        }
        let tracker = self.clone();
        handle.spawn(async move {
            for remaining in (0..AUTO_CLOSE_SECS).rev() {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(TICK) => {},
                }
                let mut state = tracker.lock();
                match state.notifications.iter_mut().find(|n| n.id == id) {
                    Some(entry) => entry.time_left = Some(remaining),
                    None => return,
                }
            }
            if !token.is_cancelled() {
                tracker.remove(id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(status: TxStatus) -> NotificationUpdate {
        NotificationUpdate::finished(status, "done")
    }

    #[test]
    fn test_add_defaults_and_unique_ids() {
        let tracker = NotificationTracker::default();
        let first = tracker.add(NewNotification {
            auto_close: Some(false),
            ..Default::default()
        });
        let second = tracker.add(NewNotification {
            auto_close: Some(false),
            ..Default::default()
        });
        assert!(second > first);
        let entry = tracker.get(first).unwrap();
        assert_eq!(entry.status, TxStatus::Pending);
        assert_eq!(entry.message, DEFAULT_PENDING_MESSAGE);
        assert_eq!(tracker.list()[0].id, second);
    }

    #[test]
    fn test_terminal_status_is_final() {
        let tracker = NotificationTracker::default();
        let id = tracker.add(NewNotification {
            auto_close: Some(false),
            ..Default::default()
        });
        tracker.update(id, finished(TxStatus::Rejected));
        tracker.update(id, finished(TxStatus::Success));
        assert_eq!(tracker.get(id).unwrap().status, TxStatus::Rejected);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let tracker = NotificationTracker::default();
        tracker.update(42, finished(TxStatus::Success));
        assert!(tracker.list().is_empty());
    }

    #[test]
    fn test_explorer_link() {
        let tracker = NotificationTracker::default().with_explorer_url("https://basescan.org/");
        assert_eq!(tracker.explorer_link("0xab"), "https://basescan.org/tx/0xab");
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_close_removes_within_countdown() {
        let tracker = NotificationTracker::default();
        let id = tracker.add(NewNotification::default());
        assert_eq!(tracker.get(id).unwrap().time_left, Some(AUTO_CLOSE_SECS));
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(tracker.get(id).unwrap().time_left, Some(AUTO_CLOSE_SECS - 2));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(tracker.get(id).is_none());

        // Never resurrected.
        tracker.update(id, finished(TxStatus::Error));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(tracker.get(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_starts_when_auto_close_is_switched_on() {
        let tracker = NotificationTracker::default();
        let id = tracker.add(NewNotification {
            auto_close: Some(false),
            ..NewNotification::pending("Buying")
        });
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(tracker.get(id).is_some());

        tracker.update(id, NotificationUpdate {
            auto_close: Some(true),
            ..finished(TxStatus::Success)
        });
        tokio::time::sleep(Duration::from_secs(AUTO_CLOSE_SECS as u64 + 1)).await;
        assert!(tracker.get(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_countdowns() {
        let tracker = NotificationTracker::default();
        let id = tracker.add(NewNotification {
            status: Some(TxStatus::Success),
            ..Default::default()
        });
        tracker.shutdown();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(tracker.get(id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_remove_stops_timer() {
        let tracker = NotificationTracker::default();
        let id = tracker.add(NewNotification {
            status: Some(TxStatus::Success),
            ..Default::default()
        });
        tracker.remove(id);
        assert!(tracker.list().is_empty());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(tracker.list().is_empty());
    }
}
