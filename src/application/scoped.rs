//! Scoped logging contexts.
//!
//! A context attaches tags, metadata, logging scopes and a forced-logging
//! level to every statement made on the current thread while it is open.
//! Contexts nest: an inner context sees everything its parents added.
//!
//! ```
//! use fluent_throttle::{ScopedLoggingContext, ScopeType, Tags};
//!
//! let request = ScopeType::create("request");
//! let result = ScopedLoggingContext::builder()
//!     .with_tags(Tags::of("tenant", "acme").unwrap())
//!     .with_new_scope(&request)
//!     .run(|| {
//!         // Statements here carry `tenant=acme` and may use `per_scope(&request)`.
//!         40 + 2
//!     });
//! assert_eq!(result.unwrap(), 42);
//! ```
//!
//! [`ThreadLocalContextProvider`] is the [`ContextDataProvider`] reading the
//! innermost open context. It is the default provider of
//! [`FluentLogger`](crate::application::logger::FluentLogger).

use crate::application::ports::ContextDataProvider;
use crate::domain::error::LogError;
use crate::domain::metadata::MutableMetadata;
use crate::domain::metadata_key::MetadataKey;
use crate::domain::scope::{LoggingScope, ScopeType};
use crate::domain::tags::Tags;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::Level;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Everything visible in one open context, including what its parents added.
#[derive(Clone)]
struct Frame {
    id: u64,
    tags: Tags,
    metadata: MutableMetadata,
    scopes: Vec<(ScopeType, LoggingScope)>,
    forced_level: Option<Level>,
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

fn with_top<R>(f: impl FnOnce(&Frame) -> R) -> Option<R> {
    CONTEXT_STACK.with(|stack| stack.borrow().last().map(f))
}

/// Error from [`ContextBuilder::call`].
#[derive(Debug, Error)]
pub enum ContextError<E> {
    /// The closure failed. Takes priority over a failure to close the
    /// context.
    #[error("{0}")]
    User(E),
    /// The closure succeeded but the context could not be closed.
    #[error("logging context error: {0}")]
    Context(#[source] LogError),
}

/// Entry point for opening scoped contexts.
#[derive(Debug, Clone, Copy)]
pub struct ScopedLoggingContext;

impl ScopedLoggingContext {
    /// Start configuring a new context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Whether a context is open on this thread.
    pub fn is_active() -> bool {
        with_top(|_| ()).is_some()
    }
}

/// Builder for one scoped context.
#[derive(Default)]
pub struct ContextBuilder {
    tags: Tags,
    metadata: MutableMetadata,
    scope_types: Vec<ScopeType>,
    forced_level: Option<Level>,
}

impl ContextBuilder {
    /// Add tags.
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = self.tags.merge(&tags);
        self
    }

    /// Add a metadata value.
    pub fn with_metadata<T>(mut self, key: &MetadataKey<T>, value: T) -> Self
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        self.metadata.add_value(key, value);
        self
    }

    /// Open a new scope of `scope_type` for the lifetime of the context.
    pub fn with_new_scope(mut self, scope_type: &ScopeType) -> Self {
        self.scope_types.push(scope_type.clone());
        self
    }

    /// Force logging of statements at `level` or more severe.
    pub fn with_forced_level(mut self, level: Level) -> Self {
        self.forced_level = Some(level);
        self
    }

    /// Open the context on this thread. It stays open until the guard is
    /// closed or dropped.
    pub fn install(self) -> ContextGuard {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let mut opened = Vec::with_capacity(self.scope_types.len());

        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let mut frame = stack.last().cloned().unwrap_or_else(|| Frame {
                id,
                tags: Tags::empty(),
                metadata: MutableMetadata::new(),
                scopes: Vec::new(),
                forced_level: None,
            });

            frame.id = id;
            frame.tags = frame.tags.merge(&self.tags);
            frame.metadata.extend_from(&self.metadata);
            for scope_type in self.scope_types {
                let scope = scope_type.new_scope();
                opened.push(scope.clone());
                frame.scopes.push((scope_type, scope));
            }
            // A less severe level forces more statements.
            frame.forced_level = match (frame.forced_level, self.forced_level) {
                (Some(parent), Some(own)) => Some(parent.max(own)),
                (parent, own) => parent.or(own),
            };
            stack.push(frame);
        });

        tracing::trace!(context = id, scopes = opened.len(), "opened logging context");
        ContextGuard {
            id,
            scopes: opened,
            closed: false,
            _not_send: PhantomData,
        }
    }

    /// Run `f` inside the context.
    ///
    /// # Errors
    /// Returns `LogError::InvalidContextState` if a context opened inside `f`
    /// was left open.
    pub fn run<R>(self, f: impl FnOnce() -> R) -> Result<R, LogError> {
        let guard = self.install();
        let result = f();
        guard.close()?;
        Ok(result)
    }

    /// Run the fallible `f` inside the context. An error from `f` is
    /// returned even if closing the context also fails.
    pub fn call<R, E>(self, f: impl FnOnce() -> Result<R, E>) -> Result<R, ContextError<E>> {
        let guard = self.install();
        let result = f();
        let closed = guard.close();
        match (result, closed) {
            (Err(user), Err(context)) => {
                tracing::debug!(error = %context, "context close failed after user error");
                Err(ContextError::User(user))
            }
            (Err(user), Ok(())) => Err(ContextError::User(user)),
            (Ok(_), Err(context)) => Err(ContextError::Context(context)),
            (Ok(value), Ok(())) => Ok(value),
        }
    }
}

impl fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("tags", &self.tags)
            .field("metadata", &self.metadata)
            .field("scope_types", &self.scope_types)
            .field("forced_level", &self.forced_level)
            .finish()
    }
}

/// An open context. Closing it closes the scopes it opened.
///
/// Guards must be closed in reverse order of installation, on the thread
/// that installed them.
#[must_use = "the context closes when the guard is dropped"]
pub struct ContextGuard {
    id: u64,
    scopes: Vec<LoggingScope>,
    closed: bool,
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    /// Close the context.
    ///
    /// # Errors
    /// Returns `LogError::InvalidContextState` if a context installed after
    /// this one is still open. This context is closed anyway.
    pub fn close(mut self) -> Result<(), LogError> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<(), LogError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let id = self.id;
        let result = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.iter().rposition(|frame| frame.id == id) {
                Some(index) if index + 1 == stack.len() => {
                    stack.pop();
                    Ok(())
                }
                Some(index) => {
                    let open = stack.len() - index - 1;
                    stack.remove(index);
                    Err(LogError::InvalidContextState(format!(
                        "context {id} closed while {open} nested context(s) were still open"
                    )))
                }
                None => Err(LogError::InvalidContextState(format!(
                    "context {id} is not open on this thread"
                ))),
            }
        });

        for scope in self.scopes.drain(..) {
            scope.close();
        }
        tracing::trace!(context = id, ok = result.is_ok(), "closed logging context");
        result
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Err(err) = self.close_inner() {
            tracing::warn!(error = %err, "failed to close logging context");
        }
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Context provider reading the innermost [`ScopedLoggingContext`] of the
/// calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadLocalContextProvider;

impl ContextDataProvider for ThreadLocalContextProvider {
    fn tags(&self) -> Tags {
        with_top(|frame| frame.tags.clone()).unwrap_or_default()
    }

    fn metadata(&self) -> MutableMetadata {
        with_top(|frame| frame.metadata.clone()).unwrap_or_default()
    }

    fn current_scope(&self, scope_type: &ScopeType) -> Option<LoggingScope> {
        with_top(|frame| {
            frame
                .scopes
                .iter()
                .rev()
                .find(|(kind, _)| kind == scope_type)
                .map(|(_, scope)| scope.clone())
        })
        .flatten()
    }

    fn should_force_logging(&self, _logger_name: &str, level: Level, _enabled_by_level: bool) -> bool {
        with_top(|frame| frame.forced_level.is_some_and(|forced| level <= forced)).unwrap_or(false)
    }
}
