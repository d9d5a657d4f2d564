use snaparc_lib::{ArchiveError, ErrorCategory};

#[test]
fn config_error_display_includes_message() {
    let err = ArchiveError::Config("missing title".to_string());

    assert_eq!(format!("{}", err), "Configuration error: missing title");
}

#[test]
fn io_error_display_wraps_source() {
    let io_err = std::io::Error::other("disk full");
    let err: ArchiveError = io_err.into();
    let rendered = format!("{}", err);

    assert!(rendered.starts_with("IO error: "));
    assert!(rendered.contains("disk full"));
}

#[test]
fn output_root_helper_names_the_path() {
    let err = ArchiveError::output_root(
        "/readonly/archives",
        std::io::Error::from(std::io::ErrorKind::PermissionDenied),
    );
    let rendered = format!("{}", err);

    assert!(rendered.starts_with("Cannot create output directory /readonly/archives: "));
    assert_eq!(err.to_payload().category, ErrorCategory::Output);
}

#[test]
fn capture_helper_uses_message() {
    let err = ArchiveError::capture("node not found");

    assert_eq!(format!("{}", err), "Capture error: node not found");
    assert_eq!(err.to_payload().category, ErrorCategory::Capture);
}

#[test]
fn cancelled_has_fixed_message() {
    assert_eq!(
        ArchiveError::Cancelled.to_string(),
        "Write cancelled before completion"
    );
}
