use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use snaparc_lib::{ArchiveError, ErrorOutput, SnaparcOutput, WriteReport, SNAPARC_OUTPUT_VERSION};

use crate::cli::OutputFormat;

/// Most write errors listed in pretty output.
const MAX_LISTED_ERRORS: usize = 5;

/// Write output in the requested format.
pub fn write_output(
    body: &SnaparcOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the appropriate exit code.
pub fn render_error(err: ArchiveError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let error_payload = err.to_payload();
    let payload = SnaparcOutput::Error(ErrorOutput {
        version: SNAPARC_OUTPUT_VERSION.to_string(),
        message: Some(error_payload.message.clone()),
        error: error_payload,
    });

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    // Exit code 2 is reserved for fatal errors; partial archives use 1.
    ExitCode::from(2)
}

fn write_json_output(
    body: &SnaparcOutput,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

fn write_pretty_output(body: &SnaparcOutput, output: Option<&Path>) -> io::Result<()> {
    let stdout_is_tty = std::io::stdout().is_terminal();
    let use_human = output.is_none() && stdout_is_tty;

    if use_human {
        let content = format_pretty(body, true);
        println!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"mode\":\"error\"}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &SnaparcOutput, colorize: bool) -> String {
    match body {
        SnaparcOutput::Capture(out) => {
            let mut buf = String::new();
            let header = color("[CAPTURE]", "36", colorize);
            writeln!(buf, "{} {} ({})", header, out.url, out.viewport).ok();
            if out.page_url != out.url {
                writeln!(buf, "Redirected to: {}", out.page_url).ok();
            }
            format_report(&mut buf, &out.report, colorize);
            buf
        }
        SnaparcOutput::Write(out) => {
            let mut buf = String::new();
            let header = color("[WRITE]", "36", colorize);
            writeln!(buf, "{} {}", header, out.report.title).ok();
            format_report(&mut buf, &out.report, colorize);
            buf
        }
        SnaparcOutput::Error(out) => {
            let mut buf = String::new();
            let header = color("[ERROR]", "31", colorize);
            let message = out
                .message
                .as_deref()
                .unwrap_or(out.error.message.as_str());
            writeln!(buf, "{} {}", header, message).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
            buf
        }
    }
}

fn format_report(buf: &mut String, report: &WriteReport, colorize: bool) {
    let status = if report.is_clean() {
        color("OK", "32", colorize)
    } else if report.cancelled {
        color("CANCELLED", "31", colorize)
    } else {
        color("PARTIAL", "33", colorize)
    };
    writeln!(buf, "{} Archive written to {}", status, report.run_dir.display()).ok();
    writeln!(
        buf,
        "Resources: {} written, {} failed to capture",
        report.resources_written, report.capture_errors
    )
    .ok();
    writeln!(buf, "Snapshots: {} written", report.snapshots_written).ok();
    if let Some(manifest) = &report.manifest {
        writeln!(buf, "Stories:   {}", manifest.display()).ok();
    }
    if !report.write_errors.is_empty() {
        writeln!(buf, "Write errors ({}):", report.write_errors.len()).ok();
        for (item, message) in report.write_errors.iter().take(MAX_LISTED_ERRORS) {
            writeln!(buf, "- {item}: {message}").ok();
        }
        if report.write_errors.len() > MAX_LISTED_ERRORS {
            writeln!(
                buf,
                "- … {} more in archive/errors.json",
                report.write_errors.len() - MAX_LISTED_ERRORS
            )
            .ok();
        }
    }
    if let Some(err) = &report.pointer_error {
        writeln!(buf, "{} {}", color("latest not updated:", "33", colorize), err).ok();
    }
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

/// Clean archive exits 0; an archive with capture or write failures exits 1.
pub fn exit_code_for_report(report: &WriteReport) -> ExitCode {
    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
