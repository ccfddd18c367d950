//! Cooperative cancellation for scans.
//!
//! A [`SearchContext`] is a cheap, cloneable handle. Workers poll it with
//! [`SearchContext::is_done`] before claiming new work; nothing is interrupted
//! mid-file. Contexts form a tree: a child observes its parent's cancellation
//! and deadline, may only tighten the deadline, and cancelling it leaves the
//! parent untouched.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const ACTIVE: u8 = 0;
const CANCELLED: u8 = 1;
const DEADLINE_EXCEEDED: u8 = 2;

/// Why a context is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::Cancelled => write!(f, "context cancelled"),
            ContextError::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

#[derive(Debug)]
struct ContextState {
    // First cause wins; never goes back to ACTIVE
    state: AtomicU8,
    deadline: Option<Instant>,
    parent: Option<Arc<ContextState>>,
}

impl ContextState {
    fn err(&self) -> Option<ContextError> {
        match self.state.load(Ordering::Acquire) {
            CANCELLED => return Some(ContextError::Cancelled),
            DEADLINE_EXCEEDED => return Some(ContextError::DeadlineExceeded),
            _ => {}
        }

        let observed = match self.parent.as_ref().and_then(|p| p.err()) {
            Some(e) => e,
            None => match self.deadline {
                Some(deadline) if Instant::now() >= deadline => ContextError::DeadlineExceeded,
                _ => return None,
            },
        };

        let next = match observed {
            ContextError::Cancelled => CANCELLED,
            ContextError::DeadlineExceeded => DEADLINE_EXCEEDED,
        };
        match self
            .state
            .compare_exchange(ACTIVE, next, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Some(observed),
            // Someone else settled it first
            Err(CANCELLED) => Some(ContextError::Cancelled),
            Err(_) => Some(ContextError::DeadlineExceeded),
        }
    }
}

/// Cancellation token with an optional deadline
#[derive(Debug, Clone)]
pub struct SearchContext {
    inner: Arc<ContextState>,
}

impl SearchContext {
    /// A root context that is never cancelled on its own and has no deadline
    pub fn background() -> Self {
        Self::new(None, None)
    }

    /// A root context that expires after `timeout`. A timeout too far out to
    /// represent as an instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Instant::now().checked_add(timeout), None)
    }

    /// A root context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::new(Some(deadline), None)
    }

    fn new(deadline: Option<Instant>, parent: Option<Arc<ContextState>>) -> Self {
        Self {
            inner: Arc::new(ContextState {
                state: AtomicU8::new(ACTIVE),
                deadline,
                parent,
            }),
        }
    }

    /// Derives a cancellable child with the parent's deadline
    pub fn child(&self) -> Self {
        Self::new(self.deadline(), Some(Arc::clone(&self.inner)))
    }

    /// Derives a child that expires after `timeout` or at the parent's
    /// deadline, whichever comes first
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline(), Instant::now().checked_add(timeout)) {
            (Some(parent), Some(requested)) => Some(parent.min(requested)),
            (parent, requested) => parent.or(requested),
        };
        Self::new(deadline, Some(Arc::clone(&self.inner)))
    }

    /// The effective deadline, taking ancestors into account
    pub fn deadline(&self) -> Option<Instant> {
        let mut deadline = self.inner.deadline;
        let mut parent = self.inner.parent.as_ref();
        while let Some(state) = parent {
            deadline = match (deadline, state.deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            parent = state.parent.as_ref();
        }
        deadline
    }

    /// Time left before the deadline, if there is one
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancels this context and every context derived from it
    pub fn cancel(&self) {
        let _ = self.inner.state.compare_exchange(
            ACTIVE,
            CANCELLED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Non-blocking check for cancellation or an expired deadline
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Why the context is done, or `None` while it is still live
    pub fn err(&self) -> Option<ContextError> {
        self.inner.err()
    }
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::background()
    }
}
