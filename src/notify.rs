// src/notify.rs - Progress / notification sink

use std::sync::Mutex;

/// Severity attached to a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Receives coarse progress messages. Return values are never consulted.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Forwards notifications to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => log::info!("{}", message),
            Severity::Warning => log::warn!("{}", message),
            Severity::Error => log::error!("{}", message),
        }
    }
}

/// Keeps every notification in memory, used by tests and batch reports
#[derive(Debug, Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<(String, Severity)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, Severity)> {
        match self.messages.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.messages().iter().filter(|(_, s)| *s == severity).count()
    }
}

impl ProgressSink for CollectingSink {
    fn notify(&self, message: &str, severity: Severity) {
        let mut guard = match self.messages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push((message.to_string(), severity));
    }
}
