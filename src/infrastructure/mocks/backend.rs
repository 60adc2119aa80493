//! Capturing logger backend for testing.

use crate::application::ports::LoggerBackend;
use crate::application::record::LogRecord;
use crate::domain::error::BackendError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::Level;

/// Backend that keeps every record it is given.
///
/// Clones share the captured records, so a test can keep one handle and give
/// another to the logger.
#[derive(Debug, Clone)]
pub struct CaptureBackend {
    name: Arc<str>,
    min_level: Level,
    fail: Arc<AtomicBool>,
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl CaptureBackend {
    /// Capture records at every level.
    pub fn new() -> Self {
        Self::with_level(Level::TRACE)
    }

    /// Capture records at `min_level` or more severe.
    pub fn with_level(min_level: Level) -> Self {
        Self {
            name: Arc::from("capture"),
            min_level,
            fail: Arc::new(AtomicBool::new(false)),
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make every following `log` call fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// All captured records.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages of all captured records.
    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.message().to_string())
            .collect()
    }

    /// Number of captured records.
    pub fn count(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for CaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerBackend for CaptureBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_loggable(&self, level: Level) -> bool {
        // tracing orders levels by verbosity: ERROR is the smallest.
        level <= self.min_level
    }

    fn log(&self, record: &LogRecord) -> Result<(), BackendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("capture backend configured to fail".into());
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}
