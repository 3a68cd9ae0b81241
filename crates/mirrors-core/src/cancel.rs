//! Process-wide Ctrl-C wiring for the shared cancellation token.

pub use mirrors_runtime::CancelToken;

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Cancel `token` on the first Ctrl-C; exit immediately on the second.
pub fn install_signal_handler(token: &CancelToken) {
    let token = token.clone();
    let _ = ctrlc::set_handler(move || {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            std::process::exit(1);
        }
        token.cancel();
        eprintln!("\ncancellation requested, stopping running sync jobs...");
    });
}
