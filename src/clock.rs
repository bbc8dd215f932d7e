use chrono::{DateTime, Local, NaiveDate, TimeZone};

/// Wall-clock source for session accounting and daily rollover.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Calendar date (local time) of an epoch-millisecond timestamp.
pub fn local_date(epoch_ms: i64) -> Option<NaiveDate> {
    Local
        .timestamp_millis_opt(epoch_ms)
        .single()
        .map(|dt| dt.date_naive())
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, Local};

    use super::Clock;

    /// Clock that only moves when told to.
    #[derive(Clone)]
    pub struct ManualClock {
        now: Arc<Mutex<DateTime<Local>>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Local>) -> Self {
            Self {
                now: Arc::new(Mutex::new(start)),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut guard = self.now.lock().unwrap();
            *guard += by;
        }

        pub fn set(&self, to: DateTime<Local>) {
            *self.now.lock().unwrap() = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Local> {
            *self.now.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let start = Local.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now_ms() - start.timestamp_millis(), 90_000);
    }

    #[test]
    fn local_date_matches_clock_day() {
        let start = Local.with_ymd_and_hms(2024, 3, 10, 23, 59, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(local_date(clock.now_ms()), Some(start.date_naive()));

        clock.advance(Duration::minutes(2));
        assert_ne!(local_date(clock.now_ms()), Some(start.date_naive()));
    }
}
