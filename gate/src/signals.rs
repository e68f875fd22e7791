use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::iterator::Signals;

/// SIGPIPE/SIGUSR1/SIGUSR2 are ignored outright. SIGTERM/SIGINT/SIGHUP all request a graceful
/// shutdown -- the gate holds no entity state to freeze, so unlike the game it has nothing for
/// SIGHUP to distinguish.
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
    let mut signals = Signals::new(&[signal_hook::SIGTERM, signal_hook::SIGINT, signal_hook::SIGHUP])?;

    let term_flag = terminating.clone();
    std::thread::spawn(move || {
        for _signal in signals.forever() {
            term_flag.store(true, Ordering::SeqCst);
        }
    });

    Ok(SignalState { terminating })
}
