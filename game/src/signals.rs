use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::iterator::Signals;

/// SIGPIPE/SIGUSR1/SIGUSR2 are ignored outright. SIGTERM/SIGINT request a graceful shutdown;
/// SIGHUP requests a freeze-and-exit, observed by the run loop via the two flags below.
pub struct SignalState {
    pub terminating: Arc<AtomicBool>,
    pub freezing: Arc<AtomicBool>,
}

pub fn setup() -> std::io::Result<SignalState> {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        libc::signal(libc::SIGUSR1, libc::SIG_IGN);
        libc::signal(libc::SIGUSR2, libc::SIG_IGN);
    }

    let terminating = Arc::new(AtomicBool::new(false));
    let freezing = Arc::new(AtomicBool::new(false));
    let mut signals = Signals::new(&[signal_hook::SIGTERM, signal_hook::SIGINT, signal_hook::SIGHUP])?;

    let term_flag = terminating.clone();
    let freeze_flag = freezing.clone();
    std::thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                signal_hook::SIGHUP => freeze_flag.store(true, Ordering::SeqCst),
                _ => term_flag.store(true, Ordering::SeqCst),
            }
        }
    });

    Ok(SignalState { terminating, freezing })
}
