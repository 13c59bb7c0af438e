//! Common utilities and helpers

use std::time::Duration;

pub mod path;

/// Display helpers shared by the domain model and the CLI
pub struct Utils;

impl Utils {
    /// Format duration for display
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        let milliseconds = duration.subsec_millis();

        if hours > 0 {
            format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, milliseconds)
        } else {
            format!("{:02}:{:02}.{:03}", minutes, seconds, milliseconds)
        }
    }

    /// Format file size for display
    pub fn format_file_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Format a signed byte delta, e.g. "-1.20 MB"
    pub fn format_size_delta(delta: i64) -> String {
        let magnitude = Self::format_file_size(delta.unsigned_abs());
        if delta < 0 {
            format!("-{}", magnitude)
        } else {
            magnitude
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(Utils::format_duration(Duration::from_millis(3_723_456)), "01:02:03.456");
        assert_eq!(Utils::format_duration(Duration::from_secs(59)), "00:59.000");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(Utils::format_file_size(0), "0 B");
        assert_eq!(Utils::format_file_size(2048), "2.00 KB");
        assert_eq!(Utils::format_file_size(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn test_format_size_delta() {
        assert_eq!(Utils::format_size_delta(-2048), "-2.00 KB");
        assert_eq!(Utils::format_size_delta(100), "100 B");
    }
}
