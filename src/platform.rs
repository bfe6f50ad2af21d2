use anyhow::Result;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::warn;

#[cfg(unix)]
use signal_hook::{consts::SIGINT, consts::SIGTERM, iterator::Signals};

#[cfg(windows)]
use signal_hook::{consts::SIGINT, flag};

/// Standard Unix exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidUsage = 2,
    SignalInt = 130,  // 128 + SIGINT (2)
    SignalTerm = 143, // 128 + SIGTERM (15)
}

impl ExitCode {
    pub fn exit(self) -> ! {
        process::exit(self as i32)
    }

    /// Exit code for a run stopped by a termination signal, if any arrived
    pub fn from_signal() -> Option<Self> {
        if !TERMINATED_BY_SIGNAL.load(Ordering::Relaxed) {
            return None;
        }
        match LAST_SIGNAL.load(Ordering::Relaxed) {
            #[cfg(unix)]
            SIGTERM => Some(ExitCode::SignalTerm),
            _ => Some(ExitCode::SignalInt),
        }
    }
}

pub static TERMINATED_BY_SIGNAL: AtomicBool = AtomicBool::new(false);
static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);

fn record_signal(sig: i32, cancel: &AtomicBool) {
    LAST_SIGNAL.store(sig, Ordering::Relaxed);
    TERMINATED_BY_SIGNAL.store(true, Ordering::Relaxed);
    cancel.store(true, Ordering::SeqCst);
}

/// Turns SIGINT/SIGTERM into the cooperative cancellation flag. Workers finish
/// the file they are on; a second signal exits immediately.
pub struct SignalHandler {
    _handle: thread::JoinHandle<()>,
}

impl SignalHandler {
    pub fn new(cancel: Arc<AtomicBool>) -> Result<Self> {
        #[cfg(unix)]
        {
            let mut signals = Signals::new([SIGINT, SIGTERM])?;

            let handle = thread::spawn(move || {
                let mut shutdown_count = 0;
                for sig in signals.forever() {
                    record_signal(sig, &cancel);
                    shutdown_count += 1;
                    if shutdown_count > 1 {
                        match sig {
                            SIGTERM => ExitCode::SignalTerm.exit(),
                            _ => ExitCode::SignalInt.exit(),
                        }
                    }
                    warn!(
                        object = "Process",
                        title = "Signal",
                        "received signal {}, finishing current files",
                        sig
                    );
                }
            });

            Ok(SignalHandler { _handle: handle })
        }

        #[cfg(windows)]
        {
            let term_flag = Arc::new(AtomicBool::new(false));
            flag::register(SIGINT, Arc::clone(&term_flag))?;

            let handle = thread::spawn(move || {
                let mut shutdown_count = 0;
                loop {
                    thread::sleep(std::time::Duration::from_millis(100));
                    if term_flag.swap(false, Ordering::Relaxed) {
                        record_signal(SIGINT, &cancel);
                        shutdown_count += 1;
                        if shutdown_count > 1 {
                            ExitCode::SignalInt.exit();
                        }
                        warn!(object = "Process", title = "Signal", "interrupted, finishing current files");
                    }
                }
            });

            Ok(SignalHandler { _handle: handle })
        }
    }
}
