//! Logging setup shared by the binaries

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `log_level`;
/// `verbose` means `debug`.
pub fn init_logging(verbose: bool, log_level: &str) {
    let log_level = if verbose { "debug" } else { log_level };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "autotunnel={},autotunneld={},libautotunnel={},atcli={}",
            log_level, log_level, log_level, log_level
        ))
    });

    // A second call (tests, embedding) keeps the first subscriber
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .try_init();
}
