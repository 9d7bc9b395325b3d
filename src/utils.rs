//! # Utility Functions and Helper Module
//!
//! Small helpers shared by the library and the command-line front end.
//!
//! ## Key Functionality Categories
//!
//! - **Formatting**: Human-readable durations for console output
//! - **Validation**: Configuration checks with clear error messages
//! - **File Naming**: File-system friendly slugs derived from URLs
//! - **Display Helpers**: Table formatting and progress indicators
//!
//! ## Usage Examples
//!
//! ```rust
//! use http_latency_bench::utils::*;
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
//! assert_eq!(uri_slug("https://example.com/a/b?x=1"), "example.com-a-b-x=1");
//!
//! validate_concurrency(20)?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use std::time::Duration;

/// Upper bound for the number of simultaneous requests per endpoint
pub const MAX_CONCURRENCY: usize = 1024;

/// Upper bound for measured attempts per endpoint
pub const MAX_ATTEMPTS: usize = 1_000_000;

/// Format a duration in a human-readable way
///
/// Picks the largest unit that keeps the value readable. Sub-minute values
/// use two decimal places; longer durations switch to a compound
/// minutes/seconds form.
///
/// ## Examples
///
/// ```rust
/// # use http_latency_bench::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_nanos(750)), "750ns");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Turn a URL into a string usable inside a file name
///
/// The scheme is dropped, the remainder is split on characters that are not
/// allowed in file names on common platforms, empty parts are removed, and
/// the rest is joined with `-`.
///
/// ## Examples
///
/// ```rust
/// # use http_latency_bench::utils::uri_slug;
/// assert_eq!(uri_slug("https://example.com/"), "example.com");
/// assert_eq!(uri_slug("http://localhost:8080/api/v1"), "localhost-8080-api-v1");
/// ```
pub fn uri_slug(uri: &str) -> String {
    let without_scheme = match uri.find("://") {
        Some(pos) => &uri[pos + 3..],
        None => uri,
    };

    without_scheme
        .split(|c: char| {
            c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
        })
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Validate the number of measured attempts per endpoint
///
/// ## Validation Rules
///
/// - **Minimum**: 1 attempt, otherwise there is nothing to measure
/// - **Maximum**: [`MAX_ATTEMPTS`] to keep the attempt log in memory
pub fn validate_attempt_count(attempts: usize) -> Result<()> {
    if attempts == 0 {
        anyhow::bail!("Attempt count must be greater than 0");
    }
    if attempts > MAX_ATTEMPTS {
        anyhow::bail!(
            "Attempt count {} is too large (maximum is {})",
            attempts,
            MAX_ATTEMPTS
        );
    }
    Ok(())
}

/// Validate the per-endpoint concurrency bound
///
/// ## Validation Rules
///
/// - **Minimum**: 1 request in flight
/// - **Maximum**: [`MAX_CONCURRENCY`]; beyond that the benchmark mostly
///   measures local socket and scheduler pressure
pub fn validate_concurrency(concurrency: usize) -> Result<()> {
    if concurrency == 0 {
        anyhow::bail!("Concurrency must be greater than 0");
    }
    if concurrency > MAX_CONCURRENCY {
        anyhow::bail!(
            "Concurrency {} is too high (maximum is {})",
            concurrency,
            MAX_CONCURRENCY
        );
    }
    Ok(())
}

/// Validate warmup bounds
///
/// A warmup of zero requests is allowed. The minimum may not exceed the
/// maximum.
pub fn validate_warmup(warmup_min: usize, warmup_max: usize) -> Result<()> {
    if warmup_min > warmup_max {
        anyhow::bail!(
            "Warmup minimum ({}) must not exceed warmup maximum ({})",
            warmup_min,
            warmup_max
        );
    }
    Ok(())
}

/// Print a formatted table row
///
/// Each column is left-aligned and padded to its width; missing widths
/// default to 10 characters.
///
/// ## Examples
///
/// ```rust
/// # use http_latency_bench::utils::{print_table_row, print_table_separator};
/// let widths = [6, 30, 10];
/// print_table_separator(&widths);
/// print_table_row(&["Rank", "URL", "Mean"], &widths);
/// print_table_separator(&widths);
/// ```
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    println!("{}", format_table_row(columns, widths));
}

/// Print a table separator
///
/// ```text
/// +--------+--------------------------------+------------+
/// | Rank   | URL                            | Mean       |
/// +--------+--------------------------------+------------+
/// ```
pub fn print_table_separator(widths: &[usize]) {
    println!("{}", format_table_separator(widths));
}

fn format_table_row(columns: &[&str], widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (i, column) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(10);
        line.push_str(&format!(" {:width$} |", column, width = width));
    }
    line
}

fn format_table_separator(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for &width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line
}

/// Create a progress bar-like indicator from a completed fraction
///
/// Uses `█` for completed and `░` for remaining cells. Fractions outside
/// `[0, 1]` are clamped.
///
/// ## Examples
///
/// ```rust
/// # use http_latency_bench::utils::create_progress_indicator;
/// assert_eq!(create_progress_indicator(0.0, 10), "░░░░░░░░░░");
/// assert_eq!(create_progress_indicator(0.5, 10), "█████░░░░░");
/// assert_eq!(create_progress_indicator(1.0, 10), "██████████");
/// ```
pub fn create_progress_indicator(fraction: f64, width: usize) -> String {
    let progress = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    let filled = ((progress * width as f64) as usize).min(width);
    let empty = width - filled;

    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

/// Shorten a string to `max` characters, marking the cut with `…`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(1);
    let mut shortened: String = text.chars().take(keep).collect();
    shortened.push('…');
    shortened
}
