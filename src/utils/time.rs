use chrono::{DateTime, Duration, NaiveTime, TimeZone};

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    (date + Duration::days(1)).with_time(NaiveTime::MIN).unwrap()
}

/// How long until the next daily rollover should be scheduled.
pub fn until_next_midnight<Tz: TimeZone>(now: DateTime<Tz>) -> std::time::Duration {
    (next_day_start(now.clone()) - now)
        .to_std()
        .unwrap_or_default()
}
