//! Lines written by the capture script on stdout.

use serde::Deserialize;

use crate::types::{DomSnapshot, NetworkEvent, ResponseEvent};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum DriverLine {
    Request {
        url: String,
    },
    Response(ResponseEvent),
    Failed {
        url: String,
        error: String,
    },
    /// Navigation finished; `url` is the page URL after redirects.
    Ready {
        url: String,
    },
    Snapshot {
        dom: DomSnapshot,
    },
    Done,
}

/// Control messages, separated from network traffic.
#[derive(Debug)]
pub(crate) enum Control {
    Ready(String),
    Snapshot(DomSnapshot),
    Done,
}

pub(crate) enum Parsed {
    Network(NetworkEvent),
    Control(Control),
}

/// Parse one stdout line. Anything that is not a known JSON event (stray
/// `console.log` output, blank lines) yields `None`.
pub(crate) fn parse_line(line: &str) -> Option<Parsed> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    let parsed = match serde_json::from_str::<DriverLine>(line).ok()? {
        DriverLine::Request { url } => Parsed::Network(NetworkEvent::Request { url }),
        DriverLine::Response(response) => Parsed::Network(NetworkEvent::Response(response)),
        DriverLine::Failed { url, error } => {
            Parsed::Network(NetworkEvent::Response(ResponseEvent {
                url,
                error: Some(error),
                ..Default::default()
            }))
        }
        DriverLine::Ready { url } => Parsed::Control(Control::Ready(url)),
        DriverLine::Snapshot { dom } => Parsed::Control(Control::Snapshot(dom)),
        DriverLine::Done => Parsed::Control(Control::Done),
    };
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceEntry;

    fn network(line: &str) -> NetworkEvent {
        match parse_line(line) {
            Some(Parsed::Network(event)) => event,
            _ => panic!("expected network event from {line}"),
        }
    }

    #[test]
    fn response_line_carries_base64_body() {
        let event = network(
            r#"{"type":"response","url":"http://x/a.png","status":200,"headers":{"content-type":"image/png"},"body":"cG5n"}"#,
        );
        let NetworkEvent::Response(response) = event else {
            panic!("expected response");
        };
        let (url, entry) = response.into_entry();
        assert_eq!(url, "http://x/a.png");
        assert_eq!(entry.header("Content-Type"), Some("image/png"));
        match entry {
            ResourceEntry::Success { body, status, .. } => {
                assert_eq!(body, b"png");
                assert_eq!(status, 200);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn failed_line_becomes_failure_entry() {
        let NetworkEvent::Response(response) =
            network(r#"{"type":"failed","url":"http://x/b.png","error":"net::ERR_TIMED_OUT"}"#)
        else {
            panic!("expected response");
        };
        assert_eq!(
            response.into_entry().1,
            ResourceEntry::failure("net::ERR_TIMED_OUT")
        );
    }

    #[test]
    fn request_line_is_in_flight_marker() {
        assert_eq!(
            network(r#"{"type":"request","url":"http://x/"}"#),
            NetworkEvent::Request {
                url: "http://x/".into()
            }
        );
    }

    #[test]
    fn control_lines() {
        assert!(matches!(
            parse_line(r#"{"type":"ready","url":"http://x/home"}"#),
            Some(Parsed::Control(Control::Ready(url))) if url == "http://x/home"
        ));
        assert!(matches!(
            parse_line(r#"{"type":"snapshot","dom":{"type":0,"childNodes":[]}}"#),
            Some(Parsed::Control(Control::Snapshot(_)))
        ));
        assert!(matches!(
            parse_line(r#"{"type":"done"}"#),
            Some(Parsed::Control(Control::Done))
        ));
    }

    #[test]
    fn noise_is_ignored() {
        assert!(parse_line("").is_none());
        assert!(parse_line("Debugger attached.").is_none());
        assert!(parse_line(r#"{"type":"mystery"}"#).is_none());
    }
}
