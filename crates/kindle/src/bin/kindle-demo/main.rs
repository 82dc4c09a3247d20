//! Demonstration application booting a heartbeat bundle under the kindle
//! kernel.
//!
//! Run from the repository root so `config/config.yml` is found, then stop it
//! with Ctrl-C. A second Ctrl-C kills the workers without waiting.

mod heartbeat;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use kindle::Bundle;

use crate::heartbeat::HeartbeatBundle;

fn main() -> ExitCode {
    let bundles: Vec<Arc<dyn Bundle>> = vec![Arc::new(HeartbeatBundle)];
    // Unlocked: the signal watcher and the workers log to stderr too.
    kindle::run(std::env::args_os(), bundles, &mut io::stderr())
}
