//! Progress reporting for the converter
//!
//! Provides a row progress bar using indicatif and the styled summary
//! printed when a conversion finishes.

use crate::convert::{ConvertStats, ProgressCallback};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Row progress bar for one conversion
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a bar over `total_rows`
    pub fn new(total_rows: u64) -> Self {
        let bar = ProgressBar::new(total_rows);

        let style = ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {human_pos}/{human_len} rows ({per_sec}, {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);

        Self { bar }
    }

    /// Hidden bar for quiet runs
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Move the bar to `rows_written`; the length follows `total_rows`
    pub fn update(&self, rows_written: u64, total_rows: u64) {
        if self.bar.length() != Some(total_rows) {
            self.bar.set_length(total_rows);
        }
        self.bar.set_position(rows_written);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Callback that drives this bar from the converter
    pub fn callback(&self) -> ProgressCallback {
        let reporter = self.clone();
        Box::new(move |rows_written, total_rows| reporter.update(rows_written, total_rows))
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of a finished conversion
pub fn print_summary(stats: &ConvertStats, db_path: &Path, db_size: Option<u64>) {
    let duration_secs = stats.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        stats.rows_written as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Conversion Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Rows:").bold(), format_number(stats.rows_written));
    println!("  {} {}", style("Chunks:").bold(), format_number(stats.batches_written));
    if stats.chunk_size_reductions > 0 {
        println!(
            "  {} {} -> {} ({} reductions)",
            style("Chunk size:").yellow().bold(),
            format_number(stats.initial_chunk_size as u64),
            format_number(stats.final_chunk_size as u64),
            stats.chunk_size_reductions
        );
    } else {
        println!(
            "  {} {}",
            style("Chunk size:").bold(),
            format_number(stats.final_chunk_size as u64)
        );
    }
    println!(
        "  {} {:.1}s ({:.0} rows/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if let Some(ref index) = stats.index_name {
        println!("  {} {}", style("Index:").bold(), index);
    }
    if let Some(size) = db_size {
        println!(
            "  {} {} ({})",
            style("Database:").bold(),
            db_path.display(),
            format_size(size, BINARY)
        );
    } else {
        println!("  {} {}", style("Database:").bold(), db_path.display());
    }
    println!();
}

/// Print a header at the start of the conversion
pub fn print_header(input: &Path, output: &Path, chunk_size: usize) {
    println!();
    println!(
        "{} {}",
        style("parquet-to-sqlite").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), input.display());
    println!("  {} {}", style("Output:").bold(), output.display());
    println!("  {} {}", style("Chunk size:").bold(), format_number(chunk_size as u64));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_callback_drives_bar() {
        let reporter = ProgressReporter::hidden();
        let callback = reporter.callback();
        callback(2, 6);
        callback(4, 6);
        assert_eq!(reporter.position(), 4);
    }

    #[test]
    fn test_length_comes_from_first_report() {
        let reporter = ProgressReporter::new(0);
        reporter.callback()(3, 6);
        assert_eq!(reporter.bar.length(), Some(6));
        assert_eq!(reporter.position(), 3);
    }
}
