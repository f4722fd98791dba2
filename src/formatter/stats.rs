//! Number, size and duration formatting for console output

use std::time::Duration;

use indicatif::{HumanBytes, HumanCount};

/// Group digits in threes: `1234567` -> `1,234,567`
pub fn format_count(n: u64) -> String {
    HumanCount(n).to_string()
}

/// Size with a binary unit: `1572864` -> `1.50 MiB`
pub fn format_size(bytes: u64) -> String {
    HumanBytes(bytes).to_string()
}

/// `12.3s` under a minute, `2m 05s` above
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let whole = elapsed.as_secs();
        format!("{}m {:02}s", whole / 60, whole % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(120_000), "120,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(3 * 1024 * 1024 / 2), "1.50 MiB");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(12_340)), "12.3s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 05s");
    }
}
