//! Compact output rendering helpers for CLI surfaces.
//!
//! Keeps command result output bounded and readable while preserving signal.

use crate::core::error::SigmaError;
use crate::core::time;
use clap::ValueEnum;
use serde_json::Value as JsonValue;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Render up to `max_items` messages with compact formatting.
pub fn preview_messages(messages: &[String], max_items: usize, max_chars: usize) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let shown = messages
        .iter()
        .take(max_items)
        .map(|m| compact_line(m, max_chars))
        .collect::<Vec<_>>()
        .join(" | ");
    if messages.len() > max_items {
        format!("{} (+{} more)", shown, messages.len() - max_items)
    } else {
        shown
    }
}

/// Render a progress bar of `width` cells for a 0-100 percentage.
pub fn progress_bar(percent: u32, width: usize) -> String {
    let filled = (percent.min(100) as usize * width) / 100;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

/// Print a successful command result as a JSON envelope, or run the text renderer.
pub fn emit<F>(format: OutputFormat, cmd: &str, payload: JsonValue, text: F) -> Result<(), SigmaError>
where
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let envelope = time::command_envelope(cmd, "ok", payload);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        OutputFormat::Text => text(),
    }
    Ok(())
}

/// JSON envelope for a failed command.
pub fn error_envelope(cmd: &str, err: &SigmaError) -> JsonValue {
    time::command_envelope(
        cmd,
        "error",
        serde_json::json!({ "error": { "code": err.code(), "message": err.to_string() } }),
    )
}
