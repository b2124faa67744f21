use crate::format::HourFormat;
use chrono::{DateTime, FixedOffset, Local, Offset, Utc};

/// Source of wall-clock time and the user's time preferences
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Offset of the local timezone at the given instant. This moves with
    /// DST, so it has to be asked again for every reading.
    fn offset_at(&self, now: DateTime<Utc>) -> FixedOffset;

    fn hour_format(&self) -> HourFormat;

    /// Current wall-clock time in the local timezone
    fn local_now(&self) -> DateTime<FixedOffset> {
        let now = self.now();
        now.with_timezone(&self.offset_at(now))
    }
}

/// Reads the system clock and timezone. The hour format is a user setting,
/// so it comes from config.
#[derive(Debug)]
pub struct SystemClock {
    hour_format: HourFormat,
}

impl SystemClock {
    pub fn new(hour_format: HourFormat) -> Self {
        Self { hour_format }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset_at(&self, now: DateTime<Utc>) -> FixedOffset {
        now.with_timezone(&Local).offset().fix()
    }

    fn hour_format(&self) -> HourFormat {
        self.hour_format
    }
}

/// A clock that only moves when told to
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    now: std::cell::Cell<DateTime<Utc>>,
    offset: std::cell::Cell<FixedOffset>,
    hour_format: HourFormat,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(now: &str, hour_format: HourFormat) -> Self {
        Self {
            now: std::cell::Cell::new(now.parse().unwrap()),
            offset: std::cell::Cell::new(FixedOffset::east_opt(0).unwrap()),
            hour_format,
        }
    }

    pub fn set(&self, now: &str) {
        self.now.set(now.parse().unwrap());
    }

    pub fn set_offset(&self, hours: i32) {
        self.offset.set(FixedOffset::east_opt(hours * 3600).unwrap());
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn offset_at(&self, _: DateTime<Utc>) -> FixedOffset {
        self.offset.get()
    }

    fn hour_format(&self) -> HourFormat {
        self.hour_format
    }
}
