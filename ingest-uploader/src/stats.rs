//! Aggregate statistics reducer
//!
//! Always recomputed from the full file set, never patched from deltas, so
//! duplicate or out-of-order events cannot skew the counters.

use ingest_common::events::{FileState, UploadStats};

use crate::models::QueuedFile;

/// Derive the summary counters from the current per-file states
pub fn compute_stats<'a>(files: impl IntoIterator<Item = &'a QueuedFile>) -> UploadStats {
    files
        .into_iter()
        .fold(UploadStats::default(), |mut stats, file| {
            stats.total += 1;
            match file.state {
                FileState::Completed | FileState::ZipExtracted => stats.completed += 1,
                FileState::Error => stats.failed += 1,
                FileState::Duplicate => stats.duplicates += 1,
                FileState::Uploading | FileState::Processing | FileState::ProcessingZip => {
                    stats.processing += 1
                }
                FileState::Pending => {}
            }
            stats
        })
}

/// Human-readable one-liner for the summary panel
pub fn summary_line(stats: &UploadStats) -> String {
    format!(
        "{} files: {} completed, {} failed, {} duplicates, {} processing",
        stats.total, stats.completed, stats.failed, stats.duplicates, stats.processing
    )
}
