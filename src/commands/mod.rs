mod capture;
mod write;

pub use capture::run_capture;
pub use write::run_write;

use snaparc_lib::{story_title, ArchiveError, ArchiveWriter, Result, TestResult, WriteReport};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Explicit title if non-blank, else one derived from the test title path.
pub(crate) fn resolve_title(title: Option<String>, title_path: &[String]) -> Result<String> {
    match title {
        Some(title) if !title.trim().is_empty() => Ok(title),
        _ if !title_path.is_empty() => Ok(story_title(title_path)),
        _ => Err(ArchiveError::Config(
            "A story title is required (--title, --title-path, or title/titlePath in the input)"
                .to_string(),
        )),
    }
}

/// Write `result`, cancelling outstanding writes on Ctrl-C.
pub(crate) async fn write_with_interrupt(
    writer: &ArchiveWriter,
    result: TestResult,
) -> Result<WriteReport> {
    let interrupt = cancel_on_interrupt(writer.cancellation_token());
    let report = writer.write(result).await;
    interrupt.abort();
    report
}

fn cancel_on_interrupt(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling outstanding writes");
            token.cancel();
        }
    })
}
