//! Subscriber setup for the command-line binary.

use crate::utils::DeferredLogFile;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Filter for the per-run log file, independent of console verbosity.
const FILE_FILTER: &str = "info,hytale_updater=debug";

/// Install the global subscriber.
///
/// The console layer writes to stderr at `level`, or `RUST_LOG`, or `info`.
/// The file layer always records at debug level into `log_file`, which
/// buffers until the run attaches it to a file inside the installation.
///
/// Only the first call in a process has an effect.
pub fn init_logging(level: Option<&str>, log_file: DeferredLogFile) {
    let console_filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let file = fmt::layer()
        .with_writer(log_file)
        .with_ansi(false)
        .with_filter(EnvFilter::new(FILE_FILTER));

    let _ = tracing_subscriber::registry().with(console).with(file).try_init();
}
