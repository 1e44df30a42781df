//! Transient toast channel.
//!
//! Stores and the auth gate push messages through a [`Notifier`]; whatever
//! surface displays them owns the matching [`NotificationQueue`]. The queue
//! holds at most [`MAX_QUEUED`] toasts; once full, the oldest are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::{debug, warn};

/// Toasts kept for a surface that is not reading.
pub const MAX_QUEUED: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub message: String,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Display time per notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToastDurations {
    pub success_ms: u64,
    pub error_ms: u64,
    pub info_ms: u64,
}

impl Default for ToastDurations {
    fn default() -> Self {
        Self {
            success_ms: 3000,
            error_ms: 5000,
            info_ms: 4000,
        }
    }
}

impl ToastDurations {
    pub fn for_kind(&self, kind: NotificationKind) -> u64 {
        match kind {
            NotificationKind::Success => self.success_ms,
            NotificationKind::Error => self.error_ms,
            NotificationKind::Info => self.info_ms,
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
    next_id: Arc<AtomicU64>,
    durations: ToastDurations,
}

pub struct NotificationQueue {
    rx: broadcast::Receiver<Notification>,
}

/// Creates a connected sender/queue pair.
pub fn channel(durations: ToastDurations) -> (Notifier, NotificationQueue) {
    let (tx, rx) = broadcast::channel(MAX_QUEUED);
    (
        Notifier {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
            durations,
        },
        NotificationQueue { rx },
    )
}

impl Notifier {
    pub fn success(&self, message: impl Into<String>) {
        self.push(NotificationKind::Success, message.into(), None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(NotificationKind::Error, message.into(), None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(NotificationKind::Info, message.into(), None);
    }

    /// Pushes a message with an explicit display time.
    pub fn with_duration(&self, kind: NotificationKind, message: impl Into<String>, duration_ms: u64) {
        self.push(kind, message.into(), Some(duration_ms));
    }

    fn push(&self, kind: NotificationKind, message: String, duration_ms: Option<u64>) {
        let notification = Notification {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            duration_ms: duration_ms.unwrap_or_else(|| self.durations.for_kind(kind)),
            message,
            created_at: Utc::now(),
        };
        // A dropped queue just means nobody is displaying toasts.
        if self.tx.send(notification).is_err() {
            debug!("notification queue closed, dropping toast");
        }
    }
}

impl NotificationQueue {
    /// Takes every queued notification without waiting.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(n) => out.push(n),
                Err(TryRecvError::Lagged(skipped)) => warn!("dropped {skipped} stale toasts"),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        out
    }

    /// Waits for the next notification. `None` once every notifier is gone.
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(n) => return Some(n),
                Err(RecvError::Lagged(skipped)) => warn!("dropped {skipped} stale toasts"),
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order_and_default_durations() {
        let (notifier, mut queue) = channel(ToastDurations::default());
        notifier.success("saved");
        notifier.error("boom");
        notifier.info("fyi");

        let drained = queue.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].message, "saved");
        assert_eq!(drained[0].duration_ms, 3000);
        assert_eq!(drained[1].kind, NotificationKind::Error);
        assert_eq!(drained[1].duration_ms, 5000);
        assert_eq!(drained[2].duration_ms, 4000);
        assert!(drained[0].id < drained[1].id && drained[1].id < drained[2].id);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_explicit_duration_overrides_default() {
        let (notifier, mut queue) = channel(ToastDurations::default());
        notifier.with_duration(NotificationKind::Info, "slow", 10_000);
        assert_eq!(queue.drain()[0].duration_ms, 10_000);
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let (notifier, mut queue) = channel(ToastDurations::default());
        for i in 0..MAX_QUEUED + 10 {
            notifier.info(format!("toast {i}"));
        }

        let drained = queue.drain();
        assert_eq!(drained.len(), MAX_QUEUED);
        assert_eq!(drained[0].message, "toast 10");
        assert_eq!(
            drained.last().map(|n| n.message.as_str()),
            Some(format!("toast {}", MAX_QUEUED + 9).as_str())
        );

        notifier.info("fresh");
        assert_eq!(queue.drain()[0].message, "fresh");
    }

    #[tokio::test]
    async fn test_next_skips_past_dropped_toasts() {
        let (notifier, mut queue) = channel(ToastDurations::default());
        for i in 0..MAX_QUEUED + 1 {
            notifier.info(format!("toast {i}"));
        }
        assert_eq!(queue.next().await.map(|n| n.message), Some("toast 1".to_string()));
    }

    #[tokio::test]
    async fn test_next_returns_none_after_senders_drop() {
        let (notifier, mut queue) = channel(ToastDurations::default());
        notifier.info("last");
        drop(notifier);
        assert_eq!(queue.next().await.map(|n| n.message), Some("last".to_string()));
        assert!(queue.next().await.is_none());
    }
}
