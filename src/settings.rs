use std::path::{Path, PathBuf};
use std::time::Duration;

use snaparc_lib::types::Viewport;
use snaparc_lib::{ArchiveError, CaptureOptions, Config};

/// Tracks which CLI flags were explicitly provided vs. defaulted.
#[derive(Debug, Default)]
pub struct CaptureFlagSources {
    pub viewport: bool,
    pub quiet_period: bool,
    pub nav_timeout: bool,
    pub network_idle_timeout: bool,
    pub process_timeout: bool,
}

impl CaptureFlagSources {
    pub fn from_args(args: &[String]) -> Self {
        Self {
            viewport: flag_present(args, "--viewport"),
            quiet_period: flag_present(args, "--quiet-period"),
            nav_timeout: flag_present(args, "--nav-timeout"),
            network_idle_timeout: flag_present(args, "--network-idle-timeout"),
            process_timeout: flag_present(args, "--process-timeout"),
        }
    }
}

/// Checks if a flag was present in the command-line arguments.
pub fn flag_present(args: &[String], flag: &str) -> bool {
    args.iter()
        .any(|arg| arg == flag || arg.starts_with(&format!("{flag}=")))
}

/// Capture values as given on the command line.
#[derive(Debug, Clone, Copy)]
pub struct CaptureArgs {
    pub viewport: Viewport,
    pub quiet_period_ms: u64,
    pub nav_timeout: u64,
    pub network_idle_timeout: u64,
    pub process_timeout: u64,
    pub headed: bool,
}

/// Merge CLI arguments with config file, preferring CLI when flags are present.
pub fn resolve_capture_options(
    cli: CaptureArgs,
    config: &Config,
    flags: &CaptureFlagSources,
) -> CaptureOptions {
    let mut options = config.capture_options();
    if flags.viewport {
        options.viewport = cli.viewport;
    }
    if flags.quiet_period {
        options.quiet_period = Duration::from_millis(cli.quiet_period_ms);
    }
    if flags.nav_timeout {
        options.navigation_timeout = Duration::from_secs(cli.nav_timeout);
    }
    if flags.network_idle_timeout {
        options.network_idle_timeout = Duration::from_secs(cli.network_idle_timeout);
    }
    if flags.process_timeout {
        options.process_timeout = Duration::from_secs(cli.process_timeout);
    }
    if cli.headed {
        options.headless = false;
    }
    options
}

/// `--output-root` wins over config (which already folds in `OUTPUT_DIR`).
pub fn resolve_output_root(cli_output_root: Option<PathBuf>, config: &Config) -> PathBuf {
    cli_output_root.unwrap_or_else(|| config.output_root.clone())
}

/// Load config from a file, central config, or return defaults.
/// Priority: explicit path > ~/.config/snaparc/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, ArchiveError> {
    let cfg = Config::load(path).map_err(|e| {
        let loc = path
            .map(|p| p.display().to_string())
            .or_else(|| Config::central_config_path().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "defaults".to_string());
        ArchiveError::Config(format!("Failed to read config {}: {}", loc, e))
    })?;

    cfg.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        ArchiveError::Config(prefix)
    })?;
    Ok(cfg)
}

/// Format effective capture settings as a single-line string.
pub fn format_effective_config(
    options: &CaptureOptions,
    output_root: &Path,
    max_concurrent_writes: usize,
    config_source: Option<&Path>,
) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    format!(
        "Effective config [{source}]: output_root={}, viewport={}, timeouts: nav={}s, network-idle={}s, process={}s, quiet={}ms, headless={}, max_concurrent_writes={}",
        output_root.display(),
        options.viewport,
        options.navigation_timeout.as_secs(),
        options.network_idle_timeout.as_secs(),
        options.process_timeout.as_secs(),
        options.quiet_period.as_millis(),
        options.headless,
        max_concurrent_writes,
    )
}
