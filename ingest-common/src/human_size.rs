//! Human-readable byte sizes
//!
//! Used wherever a file size is shown to the user (admission warnings,
//! queue listings, CLI summaries).

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

/// Format a byte count for display.
///
/// # Examples
///
/// ```
/// use ingest_common::human_size::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(50 * 1024 * 1024), "50.0 MB");
/// assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    if bytes < KIB {
        format!("{} B", bytes)
    } else if bytes < MIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else if bytes < GIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GIB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(MIB), "1.0 MB");
        assert_eq!(format_bytes(GIB), "1.00 GB");
    }
}
