use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::cancel::CancellationToken;

/// Spawn a background thread that watches for SIGINT/SIGTERM/SIGHUP and
/// cancels `token` the moment one arrives. Unlike a typical service daemon
/// we do not exit the process here — the cancellation propagates through
/// the pool and `main` reports `Cancelled` once the workers have drained.
pub fn install(token: CancellationToken) {
    let mut signals = match Signals::new([SIGINT, SIGTERM, SIGHUP]) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("could not install signal handler: {}", e);
            return;
        }
    };
    std::thread::spawn(move || {
        for sig in &mut signals {
            log::info!("received signal {}, cancelling transfer", sig);
            token.cancel();
        }
    });
}
