//! The record handed to a logger backend.

use crate::application::processor::MetadataProcessor;
use crate::domain::keys::{LogCause, LOG_CAUSE, SKIPPED_LOG_COUNT};
use crate::domain::log_site::LogSite;
use crate::domain::metadata::{Metadata, MutableMetadata};
use std::sync::Arc;
use tracing::Level;

/// An emitted log statement.
///
/// Owns the context metadata and the statement metadata; use
/// [`LogRecord::metadata`] for the merged view.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub(crate) level: Level,
    pub(crate) message: String,
    pub(crate) log_site: LogSite,
    pub(crate) timestamp_nanos: u64,
    pub(crate) logger_name: Arc<str>,
    pub(crate) was_forced: bool,
    pub(crate) scope_metadata: MutableMetadata,
    pub(crate) statement_metadata: MutableMetadata,
}

impl LogRecord {
    /// Level of the statement.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Rendered message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where the statement was made.
    pub fn log_site(&self) -> LogSite {
        self.log_site
    }

    /// Clock timestamp at which the statement was evaluated.
    pub fn timestamp_nanos(&self) -> u64 {
        self.timestamp_nanos
    }

    /// Name of the logger that produced the record.
    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }

    /// Whether rate limiting was bypassed.
    pub fn was_forced(&self) -> bool {
        self.was_forced
    }

    /// Metadata from the scoped context.
    pub fn scope_metadata(&self) -> &MutableMetadata {
        &self.scope_metadata
    }

    /// Metadata attached by the statement itself.
    pub fn statement_metadata(&self) -> &MutableMetadata {
        &self.statement_metadata
    }

    /// Merged view of scope and statement metadata.
    pub fn metadata(&self) -> MetadataProcessor<'_> {
        MetadataProcessor::for_scope_and_log_site(&self.scope_metadata, &self.statement_metadata)
    }

    /// The cause attached with `with_cause`, if any.
    pub fn cause(&self) -> Option<&LogCause> {
        let metadata: &dyn Metadata = &self.statement_metadata;
        metadata.find_value(&*LOG_CAUSE).ok().flatten()
    }

    /// Number of invocations skipped before this one, or 0.
    pub fn skipped_count(&self) -> u64 {
        let metadata: &dyn Metadata = &self.statement_metadata;
        metadata
            .find_value(&*SKIPPED_LOG_COUNT)
            .ok()
            .flatten()
            .copied()
            .unwrap_or(0)
    }
}
