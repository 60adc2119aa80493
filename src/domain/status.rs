//! The unified result of a rate limiter check.

use std::fmt;

/// Undoes a committed reset when a later reset of the same statement loses
/// its race.
pub type Rollback = Box<dyn FnOnce() + Send>;

/// A deferred state update, run only once every limiter agreed to emit.
///
/// Returns the undo for the update, or `None` if another thread changed the
/// state first, in which case the statement must be skipped.
pub type PendingReset = Box<dyn FnOnce() -> Option<Rollback> + Send>;

/// Result of a reset that committed, undone by `undo` if the statement is
/// skipped after all.
pub fn committed(undo: impl FnOnce() + Send + 'static) -> Option<Rollback> {
    Some(Box::new(undo))
}

/// Decision of one or more rate limiters for a single invocation.
pub enum RateLimitStatus {
    /// Emit, with no state to update
    Allow,
    /// Do not emit
    Disallow,
    /// Emit if the queued resets all commit
    Pending(Vec<PendingReset>),
}

impl RateLimitStatus {
    /// Allowed with a single reset.
    pub fn pending(reset: impl FnOnce() -> Option<Rollback> + Send + 'static) -> Self {
        RateLimitStatus::Pending(vec![Box::new(reset)])
    }

    /// Combine two optional statuses. `None` means the limiter is not active.
    ///
    /// A disallow from either side wins and drops the other side's resets.
    /// Two allows keep the resets of both.
    pub fn combine(a: Option<Self>, b: Option<Self>) -> Option<Self> {
        match (a, b) {
            (None, other) | (other, None) => other,
            (Some(RateLimitStatus::Disallow), _) | (_, Some(RateLimitStatus::Disallow)) => {
                Some(RateLimitStatus::Disallow)
            }
            (Some(RateLimitStatus::Allow), other) | (other, Some(RateLimitStatus::Allow)) => other,
            (Some(RateLimitStatus::Pending(mut a)), Some(RateLimitStatus::Pending(b))) => {
                a.extend(b);
                Some(RateLimitStatus::Pending(a))
            }
        }
    }

    /// Whether this status allows emission, before commit.
    pub fn is_allowed(&self) -> bool {
        !matches!(self, RateLimitStatus::Disallow)
    }

    /// Run every queued reset in order. Returns whether the statement may be
    /// emitted.
    ///
    /// If a reset loses its race, the ones already committed are rolled back
    /// in reverse order, so a skipped statement leaves no limiter state
    /// consumed.
    pub fn commit(self) -> bool {
        let resets = match self {
            RateLimitStatus::Allow => return true,
            RateLimitStatus::Disallow => return false,
            RateLimitStatus::Pending(resets) => resets,
        };
        let mut done: Vec<Rollback> = Vec::with_capacity(resets.len());
        for reset in resets {
            match reset() {
                Some(undo) => done.push(undo),
                None => {
                    done.into_iter().rev().for_each(|undo| undo());
                    return false;
                }
            }
        }
        true
    }
}

impl fmt::Debug for RateLimitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitStatus::Allow => f.write_str("Allow"),
            RateLimitStatus::Disallow => f.write_str("Disallow"),
            RateLimitStatus::Pending(resets) => write!(f, "Pending({} resets)", resets.len()),
        }
    }
}
