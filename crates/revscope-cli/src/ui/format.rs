//! Formatting helpers for sizes, ages and long names.

use chrono::{DateTime, Utc};

/// Bytes as `B`, `KB`, `MB` or `GB` with one decimal.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}

/// Shorten `s` to at most `max_len` characters, ending in `...` when cut.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{}...", kept)
}

/// Age relative to `now`: `just now`, `5 mins ago`, `3h ago`, `2d ago`, or
/// the date for anything older than a week or in the future.
pub fn format_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(timestamp);

    if age.num_seconds() < 0 || age.num_days() >= 7 {
        timestamp.format("%Y-%m-%d").to_string()
    } else if age.num_minutes() < 1 {
        "just now".to_string()
    } else if age.num_hours() < 1 {
        format!("{} mins ago", age.num_minutes())
    } else if age.num_hours() < 24 {
        format!("{}h ago", age.num_hours())
    } else {
        format!("{}d ago", age.num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1_572_864), "1.5 MB");
        assert_eq!(format_bytes(1_073_741_824), "1.0 GB");
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("acme-widgets", 20), "acme-widgets");
        assert_eq!(truncate_str("acme-widgets-feature", 10), "acme-wi...");
        assert_eq!(truncate_str("héllo wörld", 8), "héllo...");
        assert_eq!(truncate_str("abcdef", 3), "...");
    }

    #[test]
    fn test_format_age() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "just now");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5 mins ago");
        assert_eq!(format_age(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_age(now - Duration::days(2), now), "2d ago");

        let old = now - Duration::days(30);
        assert_eq!(format_age(old, now), old.format("%Y-%m-%d").to_string());
    }
}
