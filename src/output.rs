//! Result types returned by a conversion run.

use crate::document::BookMetadata;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What a finished run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Where the final EPUB was written.
    pub output_path: PathBuf,
    pub metadata: BookMetadata,
    pub stats: ConversionStats,
}

/// Counters and timings for one invocation.
///
/// Page counts cover this invocation only; pages finished by an earlier,
/// interrupted invocation are reflected in `resumed_from`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages in the selection.
    pub selected_pages: usize,
    /// Pages extracted and folded (TOC skips included).
    pub processed_pages: usize,
    /// Pages classified as table of contents.
    pub skipped_toc_pages: usize,
    /// First page of this invocation when it continued from a checkpoint.
    pub resumed_from: Option<usize>,
    /// Chapters in the final book.
    pub chapters: usize,
    /// Content blocks in the final book, chapter titles excluded.
    pub blocks: usize,
    /// Failed oracle attempts that were retried.
    pub retries: u32,
    /// Wall time of each processed page, extraction included.
    pub page_durations_ms: Vec<u64>,
    /// Time spent in pdfium.
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ConversionStats {
    /// Mean per-page time, `None` before the first page finished.
    pub fn average_page_ms(&self) -> Option<u64> {
        if self.page_durations_ms.is_empty() {
            return None;
        }
        let sum: u64 = self.page_durations_ms.iter().sum();
        Some(sum / self.page_durations_ms.len() as u64)
    }

    /// Projected time for `pages_left` more pages at the current average.
    pub fn estimate_remaining_ms(&self, pages_left: usize) -> Option<u64> {
        self.average_page_ms().map(|avg| avg * pages_left as u64)
    }
}

/// Human-friendly duration: `30.0s`, `2.5min`, `1.5h`.
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}min", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

/// [`format_duration`] for millisecond counters.
pub fn format_millis(ms: u64) -> String {
    format_duration(ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_pick_the_largest_fitting_unit() {
        assert_eq!(format_duration(30.0), "30.0s");
        assert_eq!(format_duration(59.9), "59.9s");
        assert_eq!(format_duration(60.0), "1.0min");
        assert_eq!(format_duration(150.0), "2.5min");
        assert_eq!(format_duration(3600.0), "1.0h");
        assert_eq!(format_duration(5400.0), "1.5h");
        assert_eq!(format_millis(7_200_000), "2.0h");
    }

    #[test]
    fn average_and_estimate() {
        let stats = ConversionStats {
            page_durations_ms: vec![5000, 6000, 4500, 5500],
            ..Default::default()
        };
        assert_eq!(stats.average_page_ms(), Some(5250));
        assert_eq!(stats.estimate_remaining_ms(4), Some(21_000));
    }

    #[test]
    fn no_estimate_before_first_page() {
        let stats = ConversionStats::default();
        assert_eq!(stats.average_page_ms(), None);
        assert_eq!(stats.estimate_remaining_ms(10), None);
    }
}
