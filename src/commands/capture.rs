use std::path::PathBuf;
use std::process::ExitCode;

use snaparc_lib::{
    ArchiveError, ArchiveWriter, CaptureOutput, PlaywrightCapture, SnaparcOutput, StoryOptions,
    SNAPARC_OUTPUT_VERSION,
};

use super::{resolve_title, write_with_interrupt};
use crate::cli::OutputFormat;
use crate::formatting::{exit_code_for_report, render_error, write_output};
use crate::progress::progress_logger;
use crate::settings::{
    format_effective_config, load_config, resolve_capture_options, resolve_output_root,
    CaptureArgs, CaptureFlagSources,
};

/// Run the capture command.
#[allow(clippy::too_many_arguments)]
pub async fn run_capture(
    raw_args: &[String],
    config_path: Option<PathBuf>,
    verbose: bool,
    url: String,
    title: Option<String>,
    title_path: Vec<String>,
    output_root: Option<PathBuf>,
    args: CaptureArgs,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output),
    };
    let title = match resolve_title(title, &title_path) {
        Ok(title) => title,
        Err(err) => return render_error(err, format, output),
    };

    let flags = CaptureFlagSources::from_args(raw_args);
    let mut options = resolve_capture_options(args, &config, &flags);
    options.progress = progress_logger(verbose);
    let output_root = resolve_output_root(output_root, &config);
    if verbose {
        eprintln!(
            "{}",
            format_effective_config(
                &options,
                &output_root,
                config.max_concurrent_writes,
                config_path.as_deref()
            )
        );
    }

    let viewport = options.viewport;
    let page = match PlaywrightCapture::new(options).capture(&url).await {
        Ok(page) => page,
        Err(err) => return render_error(err, format, output),
    };
    let page_url = page.page_url.clone();
    let result = page.into_test_result(title, StoryOptions::with_viewport(viewport));

    let writer = ArchiveWriter::new(&output_root, config.writer_options());
    let report = match write_with_interrupt(&writer, result).await {
        Ok(report) => report,
        Err(err) => return render_error(err, format, output),
    };

    let code = exit_code_for_report(&report);
    let body = SnaparcOutput::Capture(CaptureOutput {
        version: SNAPARC_OUTPUT_VERSION.to_string(),
        url,
        page_url,
        viewport,
        run_dir: report.run_dir.clone(),
        report,
    });
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(ArchiveError::Unknown(err.to_string()), format, output);
    }
    code
}
