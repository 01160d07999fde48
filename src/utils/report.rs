// src/utils/report.rs

//! Diagnostics sink handed to every pipeline component.
//!
//! Components never log through process-wide state. They receive a
//! `&dyn Reporter`: the binary passes [`LogReporter`], which forwards to the
//! `log` facade, and tests pass [`MemoryReporter`] to inspect what was said.

use std::sync::Mutex;

use log::Level;

/// Receiver of diagnostic events.
pub trait Reporter: Send + Sync {
    /// Record a single event.
    fn event(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.event(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.event(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.event(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.event(Level::Error, message);
    }

    /// Log a header
    fn header(&self, title: &str) {
        let border = "═".repeat(60);
        self.info(&border);
        self.info(&format!("  {title}"));
        self.info(&border);
    }

    /// Log a step in a process
    fn step(&self, step_num: usize, total: usize, message: &str) {
        self.info(&format!("[STEP {step_num}/{total}] {message}"));
    }

    /// Log a summary section
    fn summary(&self, title: &str, items: &[(&str, String)]) {
        self.info(&format!("[SUMMARY] {title}"));
        for (key, value) in items {
            self.info(&format!("    {key}: {value}"));
        }
    }
}

/// Forwards events to the `log` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn event(&self, level: Level, message: &str) {
        log::log!(target: "ticket_crawler", level, "{}", message);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<(Level, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far.
    pub fn events(&self) -> Vec<(Level, String)> {
        self.lock().clone()
    }

    /// Messages recorded at exactly `level`.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Whether any message at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.lock()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Level, String)>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Reporter for MemoryReporter {
    fn event(&self, level: Level, message: &str) {
        self.lock().push((level, message.to_string()));
    }
}
