//! Process-wide cancellation flag set by SIGINT/SIGTERM.
//!
//! The flag is polled by the child-process wait loop (which kills the child) and by
//! the agent between oracle calls.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(unix)]
use tracing::warn;

static CANCELLED: AtomicBool = AtomicBool::new(false);

/// Returned when a run stops because the operator cancelled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl fmt::Display for CancelledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run cancelled by operator")
    }
}

impl std::error::Error for CancelledError {}

pub fn is_cancelled() -> bool {
    CANCELLED.load(Ordering::SeqCst)
}

pub fn request_cancel() {
    CANCELLED.store(true, Ordering::SeqCst);
}

/// Fail with [`CancelledError`] if cancellation was requested.
pub fn check() -> anyhow::Result<()> {
    if is_cancelled() {
        return Err(CancelledError.into());
    }
    Ok(())
}

#[cfg(unix)]
extern "C" fn handle_signal(_sig: i32) {
    CANCELLED.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to the cancellation flag.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn install_handlers() {
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
        if let Err(err) = unsafe { signal::sigaction(sig, &action) } {
            warn!(signal = %sig, err = %err, "failed to install signal handler");
        }
    }
}

#[cfg(not(unix))]
pub fn install_handlers() {}
