//! Extraction of payload output from the guest debug log.

pub use guestrund::protocol::{PAYLOAD_END_MARKER, PAYLOAD_START_MARKER};

/// Return the region between the start and end markers.
///
/// Boot and installer chatter outside the markers is dropped. Without a start
/// marker the log is returned verbatim; without an end marker everything after
/// the start marker is kept. Serial consoles emit `\r\n`, so markers are
/// compared with trailing `\r` stripped.
#[must_use]
pub fn extract_payload_output(log: &str) -> String {
    let mut lines = log.split_inclusive('\n');
    if !lines.any(|line| is_marker(line, PAYLOAD_START_MARKER)) {
        return log.to_string();
    }
    lines
        .take_while(|line| !is_marker(line, PAYLOAD_END_MARKER))
        .collect()
}

fn is_marker(line: &str, marker: &str) -> bool {
    line.trim_end_matches(['\n', '\r']) == marker
}
