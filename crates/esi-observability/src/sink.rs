//! Line sinks.

use std::sync::Mutex;

use crate::logging::LogLevel;

/// Destination for formatted diagnostic lines.
///
/// A sink only writes what it is given; filtering and formatting happen in
/// `StructuredLogger` before a line reaches it.
pub trait LogSink: Send + Sync {
    /// Write one formatted line.
    fn write_line(&self, level: LogLevel, line: &str);
}

/// Forwards lines to `tracing` events under the `esi` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_line(&self, level: LogLevel, line: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(target: "esi", "{}", line),
            LogLevel::Debug => tracing::debug!(target: "esi", "{}", line),
            LogLevel::Info => tracing::info!(target: "esi", "{}", line),
            LogLevel::Warn => tracing::warn!(target: "esi", "{}", line),
            LogLevel::Error => tracing::error!(target: "esi", "{}", line),
        }
    }
}

/// Writes lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write_line(&self, _level: LogLevel, line: &str) {
        eprintln!("{}", line);
    }
}

/// Keeps lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured lines, oldest first.
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Captured lines at the given level.
    pub fn lines_at(&self, level: LogLevel) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line)
            .collect()
    }

    /// Whether any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|(_, line)| line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, level: LogLevel, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((level, line.to_string()));
    }
}
