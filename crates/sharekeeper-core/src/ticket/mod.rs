//! Ticket extraction from the transfer tool's output.
//!
//! `sendme send` prints the command a recipient should run, for example:
//!
//! ```text
//! to get this data, use
//! sendme receive blobacahs3i...
//! ```
//!
//! The merged stdout/stderr text is read line by line. Each line is tried
//! against two rules in order:
//!
//! 1. the line contains [`RECEIVE_MARKER`]; the rest of the line, trimmed,
//!    is the ticket
//! 2. the line holds a bare token made of [`BARE_TICKET_PREFIX`] followed by
//!    at least [`MIN_BARE_TICKET_BODY`] ASCII alphanumerics
//!
//! The first line that matches either rule gives the ticket. Only complete
//! (newline-terminated) lines are examined, so a ticket that is still being
//! written can never be returned half-finished. Once a buffer yields a
//! ticket, every longer buffer with the same prefix yields the same ticket.

use std::sync::LazyLock;

use regex::Regex;

/// Phrase that precedes the ticket on the receive-instructions line.
pub const RECEIVE_MARKER: &str = "sendme receive ";

/// Prefix of a bare ticket token.
pub const BARE_TICKET_PREFIX: &str = "blob";

/// Minimum number of alphanumerics after [`BARE_TICKET_PREFIX`].
pub const MIN_BARE_TICKET_BODY: usize = 100;

static BARE_TICKET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "{BARE_TICKET_PREFIX}[a-zA-Z0-9]{{{MIN_BARE_TICKET_BODY},}}"
    ))
    .expect("bare ticket pattern is a valid regex")
});

/// Extract a ticket from the output seen so far.
///
/// Returns `None` until a complete line carrying a ticket has been seen.
pub fn extract_ticket(buffer: &[u8]) -> Option<String> {
    let end = buffer.iter().rposition(|&b| b == b'\n')?;
    let text = String::from_utf8_lossy(&buffer[..=end]);
    text.lines()
        .find_map(|line| find_marked(line).or_else(|| find_bare(line)))
}

/// Extract a ticket once the output has ended.
///
/// The trailing line is treated as complete even without a newline.
pub fn extract_ticket_at_eof(buffer: &[u8]) -> Option<String> {
    if buffer.is_empty() || buffer.ends_with(b"\n") {
        return extract_ticket(buffer);
    }
    let mut terminated = Vec::with_capacity(buffer.len() + 1);
    terminated.extend_from_slice(buffer);
    terminated.push(b'\n');
    extract_ticket(&terminated)
}

fn find_marked(line: &str) -> Option<String> {
    let mut parts = line.split(RECEIVE_MARKER);
    parts.next()?;
    let remainder = parts.next()?.trim();
    (!remainder.is_empty()).then(|| remainder.to_string())
}

fn find_bare(line: &str) -> Option<String> {
    BARE_TICKET.find(line).map(|m| m.as_str().to_string())
}

/// Accumulates output chunks and runs the extractor after each one.
///
/// After the first match the scanner stops extracting and keeps returning
/// the same ticket.
#[derive(Debug, Default)]
pub struct TicketScanner {
    buffer: Vec<u8>,
    ticket: Option<String>,
}

impl TicketScanner {
    /// Create an empty scanner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of output and return the ticket, if one is known.
    pub fn push(&mut self, chunk: &[u8]) -> Option<&str> {
        if self.ticket.is_none() {
            self.buffer.extend_from_slice(chunk);
            self.ticket = extract_ticket(&self.buffer);
        }
        self.ticket.as_deref()
    }

    /// Signal end of output, treating an unterminated last line as complete.
    pub fn finish(&mut self) -> Option<&str> {
        if self.ticket.is_none() {
            self.ticket = extract_ticket_at_eof(&self.buffer);
        }
        self.ticket.as_deref()
    }

    /// The ticket found so far.
    pub fn ticket(&self) -> Option<&str> {
        self.ticket.as_deref()
    }

    /// Last non-empty line of output, for error reporting.
    pub fn last_line(&self) -> Option<String> {
        String::from_utf8_lossy(&self.buffer)
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(ToString::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_ticket(body_len: usize) -> String {
        let body: String = "abc123XYZ".chars().cycle().take(body_len).collect();
        format!("{BARE_TICKET_PREFIX}{body}")
    }

    #[test]
    fn test_no_markers_yields_none() {
        let noise = [
            "",
            "\n",
            "imported file report.pdf, 1.2 MiB\n",
            "sendme receive\n",
            "sendme receiveXYZ\n",
            "blobshort\n",
            "progress 45%\r\n",
        ];
        for text in noise {
            assert_eq!(extract_ticket(text.as_bytes()), None, "input {text:?}");
        }
    }

    #[test]
    fn test_marker_line_is_trimmed() {
        let out = b"to get this data, use\n   sendme receive   XYZ123  \n";
        assert_eq!(extract_ticket(out).as_deref(), Some("XYZ123"));
    }

    #[test]
    fn test_marker_with_prefix_text() {
        let out = b"Run: sendme receive bafkr1234tickettoken\n";
        assert_eq!(extract_ticket(out).as_deref(), Some("bafkr1234tickettoken"));
    }

    #[test]
    fn test_marker_with_empty_remainder_keeps_scanning() {
        let out = b"sendme receive \nsendme receive REAL\n";
        assert_eq!(extract_ticket(out).as_deref(), Some("REAL"));
    }

    #[test]
    fn test_marker_remainder_stops_at_repeated_marker() {
        let out = b"sendme receive FIRST sendme receive SECOND\n";
        assert_eq!(extract_ticket(out).as_deref(), Some("FIRST"));
    }

    #[test]
    fn test_bare_ticket() {
        let ticket = bare_ticket(120);
        let out = format!("noise before {ticket} noise after\n");
        assert_eq!(extract_ticket(out.as_bytes()), Some(ticket));
    }

    #[test]
    fn test_bare_ticket_too_short() {
        let out = format!("{}\n", bare_ticket(99));
        assert_eq!(extract_ticket(out.as_bytes()), None);

        let out = format!("{}\n", bare_ticket(100));
        assert!(extract_ticket(out.as_bytes()).is_some());
    }

    #[test]
    fn test_marker_rule_wins_within_a_line() {
        let bare = bare_ticket(110);
        let out = format!("{bare} sendme receive MARKED\n");
        assert_eq!(extract_ticket(out.as_bytes()).as_deref(), Some("MARKED"));
    }

    #[test]
    fn test_earliest_matching_line_wins() {
        let bare = bare_ticket(110);
        let out = format!("{bare}\nsendme receive MARKED\n");
        assert_eq!(extract_ticket(out.as_bytes()), Some(bare));
    }

    #[test]
    fn test_unterminated_line_is_ignored_until_newline() {
        assert_eq!(extract_ticket(b"sendme receive ABC"), None);
        assert_eq!(
            extract_ticket(b"sendme receive ABCDEF\n").as_deref(),
            Some("ABCDEF")
        );
    }

    #[test]
    fn test_extract_at_eof_accepts_unterminated_line() {
        assert_eq!(
            extract_ticket_at_eof(b"sendme receive ABC").as_deref(),
            Some("ABC")
        );
        assert_eq!(extract_ticket_at_eof(b""), None);
    }

    #[test]
    fn test_idempotent_under_growth() {
        let mut buffer = b"header\nsendme receive TICKET1\n".to_vec();
        let first = extract_ticket(&buffer);
        assert_eq!(first.as_deref(), Some("TICKET1"));

        for suffix in [
            "more output\n".to_string(),
            "sendme receive OTHER\n".to_string(),
            format!("{}\n", bare_ticket(150)),
            "partial line without newline".to_string(),
        ] {
            buffer.extend_from_slice(suffix.as_bytes());
            assert_eq!(extract_ticket(&buffer), first);
        }
    }

    #[test]
    fn test_bare_ticket_is_stable_under_growth() {
        let bare = bare_ticket(120);
        let mut buffer = format!("ticket: {bare}\n").into_bytes();
        assert_eq!(extract_ticket(&buffer).as_deref(), Some(bare.as_str()));

        for suffix in [
            "sendme receive OTHER\n".to_string(),
            format!("{}\n", bare_ticket(200)),
            "sendme receive TAIL".to_string(),
        ] {
            buffer.extend_from_slice(suffix.as_bytes());
            assert_eq!(extract_ticket(&buffer).as_deref(), Some(bare.as_str()));
        }
    }

    #[test]
    fn test_noise_around_marker() {
        let out = "\u{1b}[2K\rworking...\nstderr: warming up\nsendme receive T0K3N\nserving\n";
        assert_eq!(extract_ticket(out.as_bytes()).as_deref(), Some("T0K3N"));
    }

    #[test]
    fn test_invalid_utf8_does_not_hide_ticket() {
        let mut out = vec![0xff, 0xfe, b'\n'];
        out.extend_from_slice(b"sendme receive OK\n");
        assert_eq!(extract_ticket(&out).as_deref(), Some("OK"));
    }

    #[test]
    fn test_scanner_chunked_input() {
        let mut scanner = TicketScanner::new();
        assert_eq!(scanner.push(b"sendme rec"), None);
        assert_eq!(scanner.push(b"eive CHUNK"), None);
        assert_eq!(scanner.push(b"ED\n"), Some("CHUNKED"));
        assert_eq!(scanner.push(b"sendme receive LATER\n"), Some("CHUNKED"));
        assert_eq!(scanner.ticket(), Some("CHUNKED"));
    }

    #[test]
    fn test_scanner_finish_and_last_line() {
        let mut scanner = TicketScanner::new();
        scanner.push(b"error: file not found\n\n");
        assert_eq!(scanner.finish(), None);
        assert_eq!(scanner.last_line().as_deref(), Some("error: file not found"));
    }
}
