//! Formatting helpers shared across UIs.

use std::time::Duration;

/// Format remaining call time as `M:SS` (e.g., "2:05").
pub fn format_countdown(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Format a cooldown wait for display.
///
/// Waits under an hour are shown in minutes, rounded up so the visitor never
/// retries a minute early; longer waits show hours and minutes.
pub fn format_wait(remaining: Duration) -> String {
    let total_minutes = remaining.as_secs().div_ceil(60).max(1);

    if total_minutes < 60 {
        return plural(total_minutes, "minute");
    }

    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if minutes == 0 {
        plural(hours, "hour")
    } else {
        format!("{} {}", plural(hours, "hour"), plural(minutes, "minute"))
    }
}

/// Sentence shown while the cooldown is active.
pub fn cooldown_message(remaining: Duration) -> String {
    format!("Next demo available in {}", format_wait(remaining))
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(180), "3:00");
        assert_eq!(format_countdown(125), "2:05");
        assert_eq!(format_countdown(9), "0:09");
        assert_eq!(format_countdown(0), "0:00");
    }

    #[test]
    fn test_format_wait_minutes() {
        assert_eq!(format_wait(Duration::from_secs(59 * 60)), "59 minutes");
        assert_eq!(format_wait(Duration::from_secs(58 * 60 + 1)), "59 minutes");
        assert_eq!(format_wait(Duration::from_secs(30)), "1 minute");
        assert_eq!(format_wait(Duration::ZERO), "1 minute");
    }

    #[test]
    fn test_format_wait_hours() {
        assert_eq!(format_wait(Duration::from_secs(7200)), "2 hours");
        assert_eq!(format_wait(Duration::from_secs(3600 + 5 * 60)), "1 hour 5 minutes");
        assert_eq!(
            format_wait(Duration::from_secs(3600 + 60)),
            "1 hour 1 minute"
        );
    }

    #[test]
    fn test_cooldown_message() {
        assert_eq!(
            cooldown_message(Duration::from_secs(59 * 60)),
            "Next demo available in 59 minutes"
        );
    }
}
