use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::iterator::Signals;

/// Mirrors the reference daemons' signal setup: SIGPIPE/SIGUSR1/SIGUSR2 are ignored outright,
/// SIGTERM/SIGINT request a graceful shutdown observed by the main loop via `terminating`.
pub struct SignalState {
    pub terminating: Arc<AtomicBool>,
}

pub fn setup() -> std::io::Result<SignalState> {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        libc::signal(libc::SIGUSR1, libc::SIG_IGN);
        libc::signal(libc::SIGUSR2, libc::SIG_IGN);
    }

    let terminating = Arc::new(AtomicBool::new(false));
    let mut signals = Signals::new(&[signal_hook::SIGTERM, signal_hook::SIGINT])?;

    let flag = terminating.clone();
    std::thread::spawn(move || {
        for _ in signals.forever() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    Ok(SignalState { terminating })
}
