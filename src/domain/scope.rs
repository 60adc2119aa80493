//! Logging scopes.
//!
//! A scope partitions rate limiter state: keys specialized with a scope get
//! their own limiter state, and that state is removed once the scope closes.
//! A scope closes when [`LoggingScope::close`] is called or when its last
//! strong handle is dropped. Log-site keys hold only a [`WeakScope`], so they
//! never keep a scope alive.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Callback run once when a scope closes.
pub type CloseHook = Box<dyn FnOnce() + Send>;

struct ScopeState {
    id: u64,
    label: Arc<str>,
    closed: AtomicBool,
    hooks: Mutex<Vec<CloseHook>>,
}

impl ScopeState {
    fn run_hooks(&self) {
        let hooks = {
            let mut guard = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *guard)
        };
        if !hooks.is_empty() {
            tracing::trace!(scope = %self.label, id = self.id, hooks = hooks.len(), "closing logging scope");
        }
        for hook in hooks {
            hook();
        }
    }
}

impl Drop for ScopeState {
    fn drop(&mut self) {
        self.run_hooks();
    }
}

/// A strong handle to a logging scope.
#[derive(Clone)]
pub struct LoggingScope {
    state: Arc<ScopeState>,
}

impl LoggingScope {
    /// Create a new open scope. The label is only used for display.
    pub fn create(label: impl Into<Arc<str>>) -> Self {
        LoggingScope {
            state: Arc::new(ScopeState {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                label: label.into(),
                closed: AtomicBool::new(false),
                hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Unique id of this scope.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Display label.
    pub fn label(&self) -> &str {
        &self.state.label
    }

    /// Whether the scope has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Close the scope and run its close hooks. Idempotent.
    pub fn close(&self) {
        self.state.run_hooks();
    }

    /// Register a hook to run when the scope closes. Runs immediately if the
    /// scope is already closed.
    pub fn on_close(&self, hook: CloseHook) {
        on_close(&self.state, hook);
    }

    /// A weak handle to this scope.
    pub fn downgrade(&self) -> WeakScope {
        WeakScope {
            id: self.state.id,
            label: Arc::clone(&self.state.label),
            state: Arc::downgrade(&self.state),
        }
    }
}

fn on_close(state: &ScopeState, hook: CloseHook) {
    let mut guard = state.hooks.lock().unwrap_or_else(PoisonError::into_inner);
    if state.closed.load(Ordering::Acquire) {
        drop(guard);
        hook();
    } else {
        guard.push(hook);
    }
}

impl PartialEq for LoggingScope {
    fn eq(&self, other: &Self) -> bool {
        self.state.id == other.state.id
    }
}

impl Eq for LoggingScope {}

impl fmt::Debug for LoggingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingScope")
            .field("id", &self.state.id)
            .field("label", &&*self.state.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A weak handle to a logging scope, held by specialized log-site keys.
///
/// Equality and hashing use the scope id, so keys stay comparable after the
/// scope is gone.
#[derive(Clone)]
pub struct WeakScope {
    id: u64,
    label: Arc<str>,
    state: Weak<ScopeState>,
}

impl WeakScope {
    /// Id of the scope.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Label of the scope.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the scope is still open.
    pub fn is_alive(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| !state.closed.load(Ordering::Acquire))
    }

    /// Register a close hook. Runs immediately if the scope is closed or gone.
    pub fn on_close(&self, hook: CloseHook) {
        match self.state.upgrade() {
            Some(state) => on_close(&state, hook),
            None => hook(),
        }
    }
}

impl PartialEq for WeakScope {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WeakScope {}

impl std::hash::Hash for WeakScope {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for WeakScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakScope({}#{})", self.label, self.id)
    }
}

static NEXT_SCOPE_TYPE_ID: AtomicU64 = AtomicU64::new(1);

/// A kind of scope (for example "request"), used to look up the current scope
/// of that kind from the context provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeType {
    id: u64,
    label: Arc<str>,
}

impl ScopeType {
    /// Create a new scope type. Two scope types are never equal, even with
    /// the same label.
    pub fn create(label: impl Into<Arc<str>>) -> Self {
        ScopeType {
            id: NEXT_SCOPE_TYPE_ID.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
        }
    }

    /// Display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Create a new scope of this type.
    pub fn new_scope(&self) -> LoggingScope {
        LoggingScope::create(Arc::clone(&self.label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_hook(counter: &Arc<AtomicUsize>) -> CloseHook {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_close_runs_hooks_once() {
        let scope = LoggingScope::create("request");
        let counter = Arc::new(AtomicUsize::new(0));
        scope.on_close(counting_hook(&counter));
        scope.on_close(counting_hook(&counter));

        scope.close();
        scope.close();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(scope.is_closed());
    }

    #[test]
    fn test_drop_runs_hooks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let weak = {
            let scope = LoggingScope::create("task");
            scope.on_close(counting_hook(&counter));
            scope.downgrade()
        };
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!weak.is_alive());
    }

    #[test]
    fn test_hook_after_close_runs_immediately() {
        let scope = LoggingScope::create("late");
        let weak = scope.downgrade();
        scope.close();

        let counter = Arc::new(AtomicUsize::new(0));
        scope.on_close(counting_hook(&counter));
        weak.on_close(counting_hook(&counter));
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        drop(scope);
        weak.on_close(counting_hook(&counter));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_weak_scope_identity() {
        let a = LoggingScope::create("same");
        let b = LoggingScope::create("same");
        assert_ne!(a.downgrade(), b.downgrade());
        assert_eq!(a.downgrade(), a.clone().downgrade());
        assert_ne!(a, b);
    }

    #[test]
    fn test_scope_types_are_distinct() {
        let a = ScopeType::create("request");
        let b = ScopeType::create("request");
        assert_ne!(a, b);
        assert_eq!(a.new_scope().label(), "request");
    }
}
