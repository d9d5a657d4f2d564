mod cli;
mod commands;
mod formatting;
mod progress;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_capture, run_write};
use settings::CaptureArgs;

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let raw_args: Vec<String> = std::env::args().collect();
    let args = cli::parse();
    progress::init_tracing(args.verbose);

    match args.command {
        Commands::Capture {
            url,
            title,
            title_path,
            output_root,
            viewport,
            quiet_period,
            nav_timeout,
            network_idle_timeout,
            process_timeout,
            headed,
        } => {
            run_capture(
                &raw_args,
                args.config,
                args.verbose,
                url,
                title,
                title_path,
                output_root,
                CaptureArgs {
                    viewport,
                    quiet_period_ms: quiet_period,
                    nav_timeout,
                    network_idle_timeout,
                    process_timeout,
                    headed,
                },
                args.format,
                args.output,
            )
            .await
        }
        Commands::Write { input, output_root } => {
            run_write(
                args.config,
                args.verbose,
                input,
                output_root,
                args.format,
                args.output,
            )
            .await
        }
    }
}
