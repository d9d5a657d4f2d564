use std::sync::Arc;

use snaparc_lib::ProgressCallback;

/// Progress lines go to stderr in verbose mode so stdout stays JSON.
pub fn progress_logger(verbose: bool) -> Option<ProgressCallback> {
    verbose.then(|| Arc::new(|msg: &str| eprintln!("{msg}")) as ProgressCallback)
}

/// Install the tracing subscriber. `RUST_LOG` wins; otherwise `--verbose`
/// selects debug output for this crate and warnings only without it.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose {
        "snaparc=debug,snaparc_lib=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
