use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Where "today" and "this week" begin for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsCalendar {
    pub timezone: Tz,
    pub week_starts_on: Weekday,
}

impl Default for StatsCalendar {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            week_starts_on: Weekday::Sun,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsWindows {
    pub day_start: DateTime<Utc>,
    pub week_start: DateTime<Utc>,
}

impl StatsCalendar {
    pub fn windows(&self, now: DateTime<Utc>) -> StatsWindows {
        let today = now.with_timezone(&self.timezone).date_naive();
        let days_into_week = (7 + today.weekday().num_days_from_sunday()
            - self.week_starts_on.num_days_from_sunday())
            % 7;
        let first_day = today - Duration::days(i64::from(days_into_week));

        StatsWindows {
            day_start: self.local_midnight(today),
            week_start: self.local_midnight(first_day),
        }
    }

    /// Midnight can be skipped by a DST jump; the first instant of the day is
    /// then the end of the gap.
    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        for hour in 0..24 {
            let Some(local) = date.and_hms_opt(hour, 0, 0) else {
                continue;
            };
            if let Some(resolved) = self.timezone.from_local_datetime(&local).earliest() {
                return resolved.with_timezone(&Utc);
            }
        }
        Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
    }
}

pub fn parse_weekday(value: &str) -> Option<Weekday> {
    match value.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}
