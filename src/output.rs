// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use colored::Colorize;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize exemplar id (cyan)
pub fn colorize_id(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a distance or score (yellow)
pub fn colorize_score(value: f32, use_color: bool) -> String {
    let text = format!("{:.4}", value);
    if use_color {
        text.yellow().to_string()
    } else {
        text
    }
}

/// Colorize query text (bold)
pub fn colorize_query(text: &str, use_color: bool) -> String {
    if use_color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize secondary detail such as output JSON (dimmed)
pub fn colorize_detail(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}
