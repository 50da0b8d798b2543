use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike};

pub const DEFAULT_CUTOFF_HOUR: u32 = 4;

/// The planning day a wall-clock instant belongs to. The day boundary is
/// shifted `cutoff_hour` hours past midnight, so late-night usage counts
/// as the previous day: at 01:30 with the default cutoff of 4 you are
/// still working on yesterday's plan.
pub fn planning_date<Tz: TimeZone>(now: DateTime<Tz>, cutoff_hour: u32) -> NaiveDate {
    let local = now.naive_local();
    if local.hour() < cutoff_hour {
        (local - Duration::days(1)).date()
    } else {
        local.date()
    }
}

/// "M:SS" countdown rendering, e.g. 125 -> "2:05".
pub fn format_clock(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Compact duration rendering, e.g. 45 -> "45m", 125 -> "2h 5m".
pub fn format_duration(minutes: u32) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

/// 12-hour label for agenda rows: 0 -> "12AM", 13 -> "1PM".
pub fn format_hour(hour: u8) -> String {
    let period = if hour >= 12 { "PM" } else { "AM" };
    let display = match hour % 12 {
        0 => 12,
        h => u32::from(h),
    };
    format!("{display}{period}")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn planning_date_shifts_before_cutoff() {
        let late_night = Utc
            .with_ymd_and_hms(2026, 3, 10, 1, 30, 0)
            .single()
            .expect("valid instant");
        assert_eq!(
            planning_date(late_night, DEFAULT_CUTOFF_HOUR),
            NaiveDate::from_ymd_opt(2026, 3, 9).expect("valid date")
        );
    }

    #[test]
    fn planning_date_keeps_day_at_and_after_cutoff() {
        let morning = Utc
            .with_ymd_and_hms(2026, 3, 10, 4, 0, 0)
            .single()
            .expect("valid instant");
        assert_eq!(
            planning_date(morning, DEFAULT_CUTOFF_HOUR),
            NaiveDate::from_ymd_opt(2026, 3, 10).expect("valid date")
        );
    }

    #[test]
    fn clock_pads_seconds() {
        assert_eq!(format_clock(0), "0:00");
        assert_eq!(format_clock(59), "0:59");
        assert_eq!(format_clock(125), "2:05");
        assert_eq!(format_clock(3600), "60:00");
    }

    #[test]
    fn duration_splits_hours() {
        assert_eq!(format_duration(45), "45m");
        assert_eq!(format_duration(60), "1h 0m");
        assert_eq!(format_duration(125), "2h 5m");
    }

    #[test]
    fn hour_labels_wrap_noon_and_midnight() {
        assert_eq!(format_hour(0), "12AM");
        assert_eq!(format_hour(9), "9AM");
        assert_eq!(format_hour(12), "12PM");
        assert_eq!(format_hour(23), "11PM");
    }
}
