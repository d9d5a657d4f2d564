use clap::{Parser, Subcommand, ValueEnum};
use snaparc_lib::Viewport;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "snaparc")]
#[command(
    version,
    about = "Snapshot Archiver - capture page resources and DOM snapshots into replayable archives",
    long_about = "Snapshot Archiver (snaparc)\n\nModes:\n- capture: visit a URL with Playwright, wait for the network to settle, snapshot the DOM and archive every loaded resource.\n- write: archive a previously captured test result (JSON, bodies base64).\n\nArchives land in <output-root>/<run-id>/ and <output-root>/latest points at the newest run.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose output (debug logging)")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML, or YAML by extension) with defaults for output root/viewport/timeouts; CLI flags override config"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value = "json",
        help = "Output format"
    )]
    pub format: OutputFormat,

    #[arg(
        long,
        short,
        global = true,
        help = "Output file path for the JSON report (stdout if omitted)"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture a page and archive it
    Capture {
        #[arg(long, help = "Page URL to visit")]
        url: String,

        #[arg(
            long,
            required_unless_present = "title_path",
            help = "Story title; `/` separates hierarchy levels"
        )]
        title: Option<String>,

        #[arg(
            long = "title-path",
            value_name = "PART",
            help = "Test title path (spec file, describe blocks, test name); repeat per level. Used when --title is absent"
        )]
        title_path: Vec<String>,

        #[arg(
            long,
            value_name = "DIR",
            help = "Archive output root (overrides config and OUTPUT_DIR)"
        )]
        output_root: Option<PathBuf>,

        #[arg(
            long,
            default_value = "500x500",
            help = "Viewport dimensions (WIDTHxHEIGHT)"
        )]
        viewport: Viewport,

        #[arg(
            long,
            value_name = "MS",
            default_value = "2000",
            help = "Network silence (milliseconds) before the page counts as settled"
        )]
        quiet_period: u64,

        #[arg(
            long,
            default_value = "30",
            help = "Navigation timeout (seconds)"
        )]
        nav_timeout: u64,

        #[arg(
            long,
            default_value = "10",
            help = "Longest wait (seconds) for the network to settle before snapshotting anyway"
        )]
        network_idle_timeout: u64,

        #[arg(
            long,
            default_value = "60",
            help = "Process timeout (seconds) for the Playwright invocation"
        )]
        process_timeout: u64,

        #[arg(long, help = "Show the browser window")]
        headed: bool,
    },

    /// Archive a captured test result
    Write {
        #[arg(
            long,
            value_name = "PATH",
            help = "Test result JSON: {title|titlePath, pageUrl, snapshots, archive, options}"
        )]
        input: PathBuf,

        #[arg(
            long,
            value_name = "DIR",
            help = "Archive output root (overrides config and OUTPUT_DIR)"
        )]
        output_root: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}
