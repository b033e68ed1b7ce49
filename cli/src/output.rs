//! Table and value formatting for CLI output.

use chrono::{DateTime, Utc};
use comfy_table::{ContentArrangement, Table};

/// Borderless table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Human-readable byte count ("1.5 MB").
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Relative age of a timestamp ("3 hours ago").
pub fn format_ago(dt: &DateTime<Utc>) -> String {
    let elapsed = Utc::now().signed_duration_since(*dt);
    let secs = elapsed.num_seconds();
    if secs < 0 {
        return "just now".to_string();
    }

    let (amount, unit) = match secs {
        s if s < 60 => (s, "seconds"),
        s if s < 3600 => (s / 60, "minutes"),
        s if s < 86_400 => (s / 3600, "hours"),
        _ => {
            let days = elapsed.num_days();
            match days {
                d if d < 30 => (d, "days"),
                d if d < 365 => (d / 30, "months"),
                d => (d / 365, "years"),
            }
        }
    };
    format!("{amount} {unit} ago")
}

/// Shorten a store key for display: prefix plus the first 12 hex chars.
pub fn short_key(key: &str) -> String {
    match key.split_once('-') {
        Some((algo, hex)) if hex.len() > 12 => format!("{algo}-{}", &hex[..12]),
        _ => key.to_string(),
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
        assert_eq!(format_bytes(100 * 1024 * 1024), "100.0 MB");
        assert_eq!(format_bytes(10 * 1024 * 1024 * 1024), "10.0 GB");
        assert_eq!(format_bytes(2048 * 1024 * 1024 * 1024), "2.0 TB");
    }

    #[test]
    fn test_format_ago() {
        let now = Utc::now();
        assert_eq!(format_ago(&(now - Duration::seconds(30))), "30 seconds ago");
        assert_eq!(format_ago(&(now - Duration::minutes(5))), "5 minutes ago");
        assert_eq!(format_ago(&(now - Duration::hours(23))), "23 hours ago");
        assert_eq!(format_ago(&(now - Duration::days(3))), "3 days ago");
        assert_eq!(format_ago(&(now - Duration::days(60))), "2 months ago");
        assert_eq!(format_ago(&(now - Duration::days(730))), "2 years ago");
    }

    #[test]
    fn test_format_ago_future() {
        assert_eq!(format_ago(&(Utc::now() + Duration::hours(1))), "just now");
    }

    #[test]
    fn test_short_key() {
        let key = format!("sha512-{}", "ab".repeat(32));
        assert_eq!(short_key(&key), "sha512-abababababab");
        assert_eq!(short_key("sha512-abc"), "sha512-abc");
        assert_eq!(short_key("plain"), "plain");
    }

    #[test]
    fn test_new_table_with_rows() {
        let mut table = new_table(&["KEY", "SIZE"]);
        table.add_row(["sha512-abc", "1.0 KB"]);
        let output = table.to_string();
        assert!(output.contains("KEY"));
        assert!(output.contains("sha512-abc"));
    }
}
