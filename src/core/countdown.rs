use std::time::{SystemTime, UNIX_EPOCH};

/// Remaining time until the event start, broken into clock components.
/// All components clamp to zero once the start time has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    pub fn at(start_time: i64, now: i64) -> Self {
        let mut remaining = (start_time - now).max(0);

        let days = remaining / 86400;
        remaining %= 86400;
        let hours = remaining / 3600;
        remaining %= 3600;
        let minutes = remaining / 60;
        let seconds = remaining % 60;

        Countdown {
            days,
            hours,
            minutes,
            seconds,
        }
    }

    pub fn until(start_time: i64) -> Self {
        Self::at(start_time, unix_now())
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl std::fmt::Display for Countdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} days, {} hours, {} minutes, {} seconds",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}
