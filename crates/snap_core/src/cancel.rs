//! Cooperative cancellation for long-running propagation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Steps between deadline checks; the flag itself is checked every step.
const DEADLINE_POLL_STRIDE: usize = 64;

/// Shared abort signal polled between steps.
///
/// Clones share the same flag, so one clone can be handed to another thread
/// and used to stop a run in progress. An optional deadline aborts the run
/// once it passes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also trips once `timeout` has elapsed from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag_raised() || self.deadline_passed()
    }

    /// Poll used inside stepping loops. Reading the clock is skipped on most
    /// steps.
    pub(crate) fn should_stop(&self, step: usize) -> bool {
        self.flag_raised() || (step % DEADLINE_POLL_STRIDE == 0 && self.deadline_passed())
    }

    fn flag_raised(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
