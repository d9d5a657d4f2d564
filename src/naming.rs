//! Filesystem-safe names for titles, snapshots and run directories.

use chrono::{DateTime, Local};

/// Lower-case `input` and replace every non-alphanumeric character with a
/// dash, collapsing dash runs and trimming dashes from both ends.
///
/// Matches the Storybook CSF story-id sanitizer, so story ids produced here
/// line up with what Storybook derives from the same title.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        for lower in c.to_lowercase() {
            if lower.is_alphanumeric() {
                out.push(lower);
            } else if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

const TEST_FILE_MARKERS: &[&str] = &[".spec.", ".test.", ".cy."];
const SCRIPT_EXTENSIONS: &[&str] = &[
    ".ts", ".js", ".mjs", ".cjs", ".tsx", ".jsx", ".cjsx", ".coffee",
];

/// Build a story title from a test's title path (file, describe blocks,
/// test name). Test-file extensions are removed from each part and the parts
/// are joined with `/`, Storybook's hierarchy separator.
pub fn story_title<S: AsRef<str>>(title_path: &[S]) -> String {
    title_path
        .iter()
        .map(|part| strip_test_extension(part.as_ref()))
        .collect::<Vec<_>>()
        .join("/")
}

fn strip_test_extension(part: &str) -> &str {
    let part = match TEST_FILE_MARKERS
        .iter()
        .filter_map(|marker| part.find(marker))
        .min()
    {
        Some(idx) => &part[..idx],
        None => part,
    };
    SCRIPT_EXTENSIONS
        .iter()
        .find_map(|ext| part.strip_suffix(ext))
        .unwrap_or(part)
}

/// File name of a snapshot inside the run's `archive/` directory. Doubles as
/// the story's `server.id`.
pub fn snapshot_file_name(title: &str, snapshot_name: &str) -> String {
    format!("{}-{}.snapshot.json", sanitize(title), sanitize(snapshot_name))
}

/// File name of the stories manifest inside the run directory.
pub fn stories_file_name(title: &str) -> String {
    format!("{}.stories.json", sanitize(title))
}

/// Run directory name derived from a local timestamp, millisecond precision.
pub fn run_id_at(at: DateTime<Local>) -> String {
    sanitize(&at.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
}

pub fn new_run_id() -> String {
    run_id_at(Local::now())
}
