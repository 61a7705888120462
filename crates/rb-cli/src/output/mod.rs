//! Output formatting utilities for the CLI
//!
//! Formats events and call results for the terminal, plus the coloured
//! status lines every command uses.

use tabled::{settings::Style, Table, Tabled};

use rb_bus::{Event, Reply};

/// Format received events as an ASCII table
///
/// Returns "No events received" for an empty list.
pub fn format_events(events: &[Event]) -> String {
    if events.is_empty() {
        return "No events received".to_string();
    }

    #[derive(Tabled)]
    struct EventRow {
        #[tabled(rename = "CODE")]
        code: String,
        #[tabled(rename = "TOPIC")]
        topic: String,
        #[tabled(rename = "PAYLOAD")]
        payload: String,
    }

    let rows: Vec<EventRow> = events
        .iter()
        .map(|e| EventRow {
            code: format_code(e.code),
            topic: e.topic.clone().unwrap_or_else(|| "-".to_string()),
            payload: truncate(&format_payload(&e.payload), 60),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// One-line rendering of a live event
pub fn format_event(event: &Event) -> String {
    match &event.topic {
        Some(topic) => format!(
            "{} [{}] {}",
            format_code(event.code),
            topic,
            format_payload(&event.payload)
        ),
        None => format!("{} {}", format_code(event.code), format_payload(&event.payload)),
    }
}

/// Human-readable call result
pub fn format_reply(reply: &Reply) -> String {
    let mut output = format!("Status: {}\n", reply.status);
    if let Some(topic) = &reply.topic {
        output.push_str(&format!("Topic: {}\n", topic));
    }
    if let Some(description) = &reply.description {
        output.push_str(&format!("Description: {}\n", description));
    }
    if !reply.payload.is_empty() {
        output.push_str(&format!("Payload: {}\n", format_payload(&reply.payload)));
    }
    output
}

/// Event code as hex, the way codes are usually written down
pub fn format_code(code: u32) -> String {
    format!("0x{:08X}", code)
}

/// Payload as text when it is printable UTF-8, hex bytes otherwise
pub fn format_payload(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(|c| c.is_control()) => format!("\"{}\"", text),
        _ => payload
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
