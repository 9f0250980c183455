//! Busy indicator and user alerts.
//!
//! [`FeedbackController`] owns the single busy flag. [`FeedbackController::begin`]
//! refuses to start while another operation holds the flag, so overlapping
//! operations cannot clear each other's indicator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

/// Where feedback is displayed.
pub trait FeedbackSink: Send + Sync {
    fn show_busy(&self, label: &str);
    fn hide_busy(&self);
    fn alert(&self, title: &str, message: &str);
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("another operation is already in progress")]
pub struct Busy;

pub struct FeedbackController {
    sink: Arc<dyn FeedbackSink>,
    in_flight: AtomicBool,
}

impl FeedbackController {
    pub fn new(sink: Arc<dyn FeedbackSink>) -> Self {
        FeedbackController {
            sink,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Show the busy indicator with `message`. The indicator is hidden when the
    /// returned guard is dropped.
    pub fn begin(&self, message: &str) -> Result<BusyGuard<'_>, Busy> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Busy)?;
        self.sink.show_busy(message);
        Ok(BusyGuard { controller: self })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn alert(&self, title: &str, message: &str) {
        self.sink.alert(title, message);
    }
}

/// Proof that the busy indicator is shown. Dropping it hides the indicator.
#[must_use = "dropping the guard hides the busy indicator immediately"]
pub struct BusyGuard<'a> {
    controller: &'a FeedbackController,
}

impl BusyGuard<'_> {
    /// Replace the displayed label.
    pub fn relabel(&self, message: &str) {
        self.controller.sink.show_busy(message);
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.controller.sink.hide_busy();
        self.controller.in_flight.store(false, Ordering::Release);
    }
}

/// Feedback on the terminal.
#[derive(Debug, Default)]
pub struct TerminalFeedback {
    pub quiet: bool,
}

impl FeedbackSink for TerminalFeedback {
    fn show_busy(&self, label: &str) {
        debug!(label, "busy");
        if !self.quiet {
            eprintln!("{}", label);
        }
    }

    fn hide_busy(&self) {
        debug!("idle");
    }

    fn alert(&self, title: &str, message: &str) {
        info!(title, "alert shown");
        eprintln!("{}: {}", title, message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackEvent {
    BusyShown(String),
    BusyHidden,
    Alert { title: String, message: String },
}

/// Records feedback in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct RecordingFeedback {
    events: Mutex<Vec<FeedbackEvent>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FeedbackEvent> {
        self.lock().clone()
    }

    pub fn alerts(&self) -> Vec<(String, String)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                FeedbackEvent::Alert { title, message } => Some((title.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FeedbackEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, event: FeedbackEvent) {
        self.lock().push(event);
    }
}

impl FeedbackSink for RecordingFeedback {
    fn show_busy(&self, label: &str) {
        self.push(FeedbackEvent::BusyShown(label.to_string()));
    }

    fn hide_busy(&self) {
        self.push(FeedbackEvent::BusyHidden);
    }

    fn alert(&self, title: &str, message: &str) {
        self.push(FeedbackEvent::Alert {
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}
