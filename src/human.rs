//! Human readable sizes and transfer rates for result records and logs.

use std::time::Duration;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Format a byte count using binary units, e.g. `1.50 GB`.
pub fn human_size(bytes: u64) -> String {
    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format `bytes` moved over `elapsed` as a rate, e.g. `120.00 MB/s`.
///
/// A zero duration is treated as one nanosecond so the rate stays finite.
pub fn human_rate(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64().max(1e-9);
    let per_sec = bytes as f64 / secs;
    if per_sec >= GB as f64 {
        format!("{:.2} GB/s", per_sec / GB as f64)
    } else if per_sec >= MB as f64 {
        format!("{:.2} MB/s", per_sec / MB as f64)
    } else if per_sec >= KB as f64 {
        format!("{:.2} KB/s", per_sec / KB as f64)
    } else {
        format!("{:.2} B/s", per_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.50 KB");
        assert_eq!(human_size(2 * GB), "2.00 GB");
        assert_eq!(human_size(3 * TB), "3.00 TB");
    }

    #[test]
    fn rates() {
        assert_eq!(human_rate(MB, Duration::from_secs(1)), "1.00 MB/s");
        assert_eq!(human_rate(GB * 4, Duration::from_secs(2)), "2.00 GB/s");
        assert_eq!(human_rate(10, Duration::from_secs(10)), "1.00 B/s");
        assert!(human_rate(MB, Duration::ZERO).ends_with("GB/s"));
    }
}
