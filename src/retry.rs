//! Deferred retry timer.
//!
//! Each tool owns one `RetryTimer`. Scheduling while a retry is already
//! pending does nothing, so a tool never has more than one retry queued.
//! Cancelling drops the pending retry; a cancelled retry never fires.

/// Delay before an automatic retry after a failed acquisition or decode.
pub const RETRY_DELAY_SECONDS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingRetry {
    due_at: f64,
    attempt: u32,
}

#[derive(Debug, Clone)]
pub struct RetryTimer {
    delay: f64,
    pending: Option<PendingRetry>,
    attempts: u32,
}

impl Default for RetryTimer {
    fn default() -> Self {
        RetryTimer::new(RETRY_DELAY_SECONDS)
    }
}

impl RetryTimer {
    pub fn new(delay: f64) -> Self {
        RetryTimer {
            delay,
            pending: None,
            attempts: 0,
        }
    }

    /// Queue a retry `delay` seconds after `now`. Returns false if one is
    /// already pending.
    pub fn schedule(&mut self, now: f64) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.attempts += 1;
        self.pending = Some(PendingRetry {
            due_at: now + self.delay,
            attempt: self.attempts,
        });
        true
    }

    /// Drop any pending retry and reset the attempt count.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.attempts = 0;
    }

    /// Consume the pending retry if it is due. Fires at most once per
    /// `schedule`.
    pub fn poll(&mut self, now: f64) -> bool {
        match self.pending {
            Some(p) if now >= p.due_at => {
                log::debug!("retry attempt {} due", p.attempt);
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// When the pending retry fires, if any.
    pub fn due_at(&self) -> Option<f64> {
        self.pending.map(|p| p.due_at)
    }

    /// Retries scheduled since the last cancel.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
