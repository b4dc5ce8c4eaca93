use std::time::Instant;

use tracing_subscriber::Layer;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Emit a verbose diagnostic message to stderr.
pub fn emit(verbose: bool, msg: &str) {
    if verbose {
        eprintln!("[mysqltask] {}", msg);
    }
}

/// Install a stderr `tracing` layer at DEBUG for this crate's events.
///
/// Without `--verbose` no subscriber is installed and library events are
/// dropped.
pub fn init_tracing(verbose: bool) {
    if !verbose {
        return;
    }
    let filter = Targets::new()
        .with_target("mysqltask", tracing::Level::DEBUG)
        .with_default(tracing::Level::WARN);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);
    // try_init fails only if a subscriber is already installed.
    tracing_subscriber::registry().with(console_layer).try_init().ok();
}

/// A timer for measuring durations in verbose mode.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}
