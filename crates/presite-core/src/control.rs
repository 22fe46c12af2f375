use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a long-running analysis ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    Cancelled,
    DeadlineExceeded,
}

impl RunStatus {
    pub fn is_complete(self) -> bool {
        self == RunStatus::Completed
    }
}

/// Cancellation flag and optional deadline shared with a running analysis.
///
/// Cloning shares the flag, so a caller can keep one clone and cancel the
/// analysis running on another thread.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// `None` while the analysis may keep running.
    pub fn check(&self) -> Option<RunStatus> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Some(RunStatus::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(RunStatus::DeadlineExceeded),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_control_keeps_running() {
        assert_eq!(RunControl::new().check(), None);
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let control = RunControl::new();
        let worker = control.clone();
        control.cancel();
        assert_eq!(worker.check(), Some(RunStatus::Cancelled));
    }

    #[test]
    fn test_past_deadline_reports_exceeded() {
        let control = RunControl::with_timeout(Duration::ZERO);
        assert_eq!(control.check(), Some(RunStatus::DeadlineExceeded));
    }
}
