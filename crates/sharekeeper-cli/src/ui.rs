//! UI utilities for the Sharekeeper CLI.

use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};
use sharekeeper_core::{Error, SessionInfo, SessionState};

const BOX_WIDTH: usize = 44;

/// Fallback when the configured date format is invalid.
pub const DEFAULT_DATE_FORMAT: &str = "%b %-d, %Y %-I:%M %p";

/// A framed summary shown after a share starts.
pub struct TicketBox<'a> {
    name: &'a str,
    copied: bool,
}

impl<'a> TicketBox<'a> {
    /// Create a box for the share called `name`.
    #[must_use]
    pub const fn new(name: &'a str) -> Self {
        Self {
            name,
            copied: false,
        }
    }

    /// Mention that the ticket is on the clipboard.
    #[must_use]
    pub const fn with_copied(mut self, copied: bool) -> Self {
        self.copied = copied;
        self
    }

    /// Print the box and the receive command below it.
    pub fn display(&self, receive_command: &str) {
        let title = truncate(self.name, BOX_WIDTH - 4);

        println!("  ┌{}┐", "─".repeat(BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  │{}│", center_in_box(&title, BOX_WIDTH));
        if self.copied {
            println!("  │{}│", center_in_box("Ticket copied to clipboard", BOX_WIDTH));
        }
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  └{}┘", "─".repeat(BOX_WIDTH));
        println!();
        println!("  The recipient runs:");
        println!();
        println!("    {receive_command}");
    }
}

fn center_in_box(content: &str, width: usize) -> String {
    let content_len = content.chars().count();
    let padding = width.saturating_sub(content_len);
    let left = padding / 2;
    let right = padding - left;
    format!("{}{}{}", " ".repeat(left), content, " ".repeat(right))
}

/// Shorten `text` to at most `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut short: String = text.chars().take(keep).collect();
    short.push_str("...");
    short
}

/// First eight characters of a session id.
pub fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(end, _)| &id[..end])
}

/// Render a start time in local time with a `strftime` format.
///
/// Falls back to [`DEFAULT_DATE_FORMAT`] if `format` is invalid.
pub fn format_started(time: DateTime<Utc>, format: &str) -> String {
    let local = time.with_timezone(&Local);
    let mut out = String::new();
    if write!(out, "{}", local.format(format)).is_ok() {
        return out;
    }
    local.format(DEFAULT_DATE_FORMAT).to_string()
}

/// Status label shown for a session.
pub const fn status_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Pending => "Pending",
        SessionState::Active => "Active",
        SessionState::Recovered => "Recovered",
    }
}

/// Print the full details of a session.
pub fn print_details(info: &SessionInfo, date_format: &str) {
    println!("  {}", info.name);
    println!();
    println!("  Path:     {}", info.path.display());
    println!("  Started:  {}", format_started(info.created_at, date_format));
    println!("  Status:   {}", status_label(info.state));
    println!("  Session:  {}", info.id);
    match info.pid {
        Some(pid) => println!("  Process:  {pid}"),
        None => println!("  Process:  -"),
    }
    println!();

    if let Some(command) = info.receive_command() {
        println!("  Ticket:");
        println!("    {}", info.ticket);
        println!();
        println!("  The recipient runs:");
        println!("    {command}");
    } else {
        println!("  Waiting for sendme to print a ticket.");
    }
}

/// Print a core error with its code and suggestion.
pub fn print_error(context: &str, err: &Error) {
    eprintln!();
    match err.code() {
        Some(code) => eprintln!("  {context}: {err} [{code}]"),
        None => eprintln!("  {context}: {err}"),
    }
    if let Some(suggestion) = err.suggestion() {
        eprintln!();
        for line in suggestion.lines() {
            eprintln!("  {line}");
        }
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_center_in_box() {
        assert_eq!(center_in_box("hello", 11), "   hello   ");
        assert_eq!(center_in_box("hi", 5), " hi  ");
        assert_eq!(center_in_box("toolong", 3), "toolong");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
        assert_eq!(truncate("blobabcdefghijkl", 10), "blobabc...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("5f0c2a1b-aaaa-bbbb"), "5f0c2a1b");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id(""), "");
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(status_label(SessionState::Active), "Active");
        assert_eq!(status_label(SessionState::Recovered), "Recovered");
        assert_eq!(status_label(SessionState::Pending), "Pending");
    }

    #[test]
    fn test_format_started_uses_format() {
        let time = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
        let year = format_started(time, "%Y");
        assert!(year == "2026" || year == "2025" || year == "2027");
    }

    #[test]
    fn test_format_started_invalid_format_falls_back() {
        let time = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
        let rendered = format_started(time, "%Q%");
        assert!(rendered.contains("2026"));
    }
}
