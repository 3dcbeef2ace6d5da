//! Process-wide audio output session.
//!
//! Browsers (and some native backends) keep audio output locked until a
//! user gesture. `AudioSession` is the single explicit handle every tool
//! goes through to get output running: `ensure_running` is idempotent, and
//! concurrent callers collapse into one device resume. Tools hold an
//! [`OutputLease`] while they produce sound; when the last lease is
//! dropped the device is suspended again.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{PracticeError, PracticeResult};

/// What a device reports when asked to start output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Output is running now.
    Running,
    /// Waiting on something outside our control (e.g. a permission prompt).
    /// The host reports the outcome via [`AudioSession::resume_completed`].
    Pending,
}

/// The shared audio output device.
pub trait OutputDevice: Send {
    fn resume(&mut self) -> Result<ResumeOutcome, String>;
    fn suspend(&mut self);
}

/// Output whose unlocking is handled by the host (e.g. the page already
/// resumed its AudioContext). Always reports running.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostOutput;

impl OutputDevice for HostOutput {
    fn resume(&mut self) -> Result<ResumeOutcome, String> {
        Ok(ResumeOutcome::Running)
    }

    fn suspend(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Suspended,
    Resuming,
    Running,
    Failed(String),
}

struct SessionInner {
    device: Box<dyn OutputDevice>,
    state: SessionState,
    leases: usize,
}

/// Cloneable handle to the shared output session.
#[derive(Clone)]
pub struct AudioSession {
    inner: Arc<Mutex<SessionInner>>,
}

impl fmt::Debug for AudioSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("AudioSession")
            .field("state", &inner.state)
            .field("leases", &inner.leases)
            .finish()
    }
}

impl AudioSession {
    pub fn new(device: impl OutputDevice + 'static) -> Self {
        AudioSession {
            inner: Arc::new(Mutex::new(SessionInner {
                device: Box::new(device),
                state: SessionState::Suspended,
                leases: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    /// Outstanding output leases.
    pub fn leases(&self) -> usize {
        self.lock().leases
    }

    /// Start output if it is not already running or starting.
    ///
    /// Returns the state after the call: `Running`, or `Resuming` while a
    /// resume is pending. A resume already in flight is never repeated.
    pub fn ensure_running(&self) -> PracticeResult<SessionState> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Running | SessionState::Resuming => return Ok(inner.state.clone()),
            SessionState::Suspended | SessionState::Failed(_) => {}
        }

        match inner.device.resume() {
            Ok(ResumeOutcome::Running) => {
                log::info!("audio output running");
                inner.state = SessionState::Running;
            }
            Ok(ResumeOutcome::Pending) => {
                log::debug!("audio output resume pending");
                inner.state = SessionState::Resuming;
            }
            Err(reason) => {
                log::warn!("audio output unavailable: {reason}");
                inner.state = SessionState::Failed(reason.clone());
                return Err(PracticeError::AcquisitionFailed(reason));
            }
        }
        Ok(inner.state.clone())
    }

    /// Report the outcome of a pending resume.
    pub fn resume_completed(&self, result: Result<(), String>) {
        let mut inner = self.lock();
        if inner.state != SessionState::Resuming {
            return;
        }
        inner.state = match result {
            Ok(()) => {
                log::info!("audio output running");
                SessionState::Running
            }
            Err(reason) => {
                log::warn!("audio output unavailable: {reason}");
                SessionState::Failed(reason)
            }
        };
    }

    /// Ensure output is running (or resuming) and take a lease on it.
    pub fn acquire(&self) -> PracticeResult<OutputLease> {
        self.ensure_running()?;
        self.lock().leases += 1;
        Ok(OutputLease {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// Keeps the output session alive. Drop to release.
pub struct OutputLease {
    inner: Arc<Mutex<SessionInner>>,
}

impl fmt::Debug for OutputLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OutputLease")
    }
}

impl Drop for OutputLease {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.leases = inner.leases.saturating_sub(1);
        if inner.leases == 0
            && matches!(inner.state, SessionState::Running | SessionState::Resuming)
        {
            inner.device.suspend();
            inner.state = SessionState::Suspended;
            log::debug!("audio output suspended");
        }
    }
}
