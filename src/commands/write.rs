use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use snaparc_lib::{
    ArchiveError, ArchiveWriter, NamedSnapshot, ResourceArchive, SnaparcOutput, StoryOptions,
    TestResult,
};

use super::{resolve_title, write_with_interrupt};
use crate::cli::OutputFormat;
use crate::formatting::{exit_code_for_report, render_error, write_output};
use crate::settings::{load_config, resolve_output_root};

/// Serialized test result accepted by `snaparc write`. Resource bodies are
/// base64; the title may be given directly or as a test title path.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_path: Vec<String>,
    pub page_url: String,
    #[serde(default)]
    pub snapshots: Vec<NamedSnapshot>,
    #[serde(default)]
    pub archive: ResourceArchive,
    #[serde(default)]
    pub options: StoryOptions,
}

impl WriteInput {
    pub fn read(path: &Path) -> Result<Self, ArchiveError> {
        let bytes = std::fs::read(path).map_err(|e| {
            ArchiveError::Config(format!(
                "Failed to read test result {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn into_test_result(self) -> Result<TestResult, ArchiveError> {
        Ok(TestResult {
            title: resolve_title(self.title, &self.title_path)?,
            page_url: self.page_url,
            snapshots: self.snapshots,
            archive: self.archive,
            options: self.options,
        })
    }
}

/// Run the write command.
pub async fn run_write(
    config_path: Option<PathBuf>,
    verbose: bool,
    input: PathBuf,
    output_root: Option<PathBuf>,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output),
    };
    let output_root = resolve_output_root(output_root, &config);

    if verbose {
        eprintln!("Reading test result from {}\u{2026}", input.display());
    }
    let result = match WriteInput::read(&input).and_then(WriteInput::into_test_result) {
        Ok(result) => result,
        Err(err) => return render_error(err, format, output),
    };

    if verbose {
        eprintln!(
            "Archiving \"{}\" ({} resources, {} snapshots) into {}\u{2026}",
            result.title,
            result.archive.len(),
            result.snapshots.len(),
            output_root.display()
        );
    }
    let writer = ArchiveWriter::new(&output_root, config.writer_options());
    let report = match write_with_interrupt(&writer, result).await {
        Ok(report) => report,
        Err(err) => return render_error(err, format, output),
    };

    let code = exit_code_for_report(&report);
    if let Err(err) = write_output(&SnaparcOutput::write(report), format, output.clone()) {
        return render_error(ArchiveError::Unknown(err.to_string()), format, output);
    }
    code
}
