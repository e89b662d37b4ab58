//! Outbound seams of the core: notifications and re-rendering.
//!
//! The core never draws anything itself. After every mutation it hands a full
//! [`LedgerView`] to a [`RenderSink`] and fires `(message, severity)` pairs at a
//! [`Notifier`]; hosts decide what to do with them.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::model::{display_timestamp, Block};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
}

/// Fire-and-forget user notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Consumer of full re-renders; no diffing contract.
pub trait RenderSink: Send + Sync {
    fn render(&self, view: &LedgerView);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub step: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub status: StageStatus,
}

/// Everything a host needs to redraw the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerView {
    pub batch_id: String,
    pub current_step: u8,
    pub stage: String,
    pub stages: Vec<StageView>,
    pub block_count: usize,
    pub blocks: Vec<Block>,
    pub qr_payload: String,
}

/// Logs notifications at a level matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        log_notification(message, severity);
    }
}

/// Logs a one-line summary of each render.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRender;

impl RenderSink for TracingRender {
    fn render(&self, view: &LedgerView) {
        debug!(
            batch = %view.batch_id,
            step = view.current_step,
            blocks = view.block_count,
            "ledger view refreshed"
        );
    }
}

/// Publishes each render to a watch channel; readers always see the latest view.
impl RenderSink for watch::Sender<LedgerView> {
    fn render(&self, view: &LedgerView) {
        self.send_replace(view.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub at: String,
}

/// Bounded feed of the most recent notifications, oldest dropped first.
#[derive(Debug)]
pub struct NotificationFeed {
    capacity: usize,
    entries: Mutex<VecDeque<Notification>>,
}

impl NotificationFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Oldest first.
    pub fn recent(&self) -> Vec<Notification> {
        let guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        guard.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<Notification> {
        let guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        guard.back().cloned()
    }
}

impl Notifier for NotificationFeed {
    fn notify(&self, message: &str, severity: Severity) {
        log_notification(message, severity);
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(Notification {
            message: message.to_string(),
            severity,
            at: display_timestamp(OffsetDateTime::now_utc()),
        });
    }
}

fn log_notification(message: &str, severity: Severity) {
    match severity {
        Severity::Warning => warn!(%message, "notification"),
        Severity::Info | Severity::Success => info!(?severity, %message, "notification"),
    }
}
