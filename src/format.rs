//! Turn clock readings into the strings drawn on the face

use crate::state::DisplayMode;
use anyhow::{anyhow, bail};
use chrono::{
    format::{Item, StrftimeItems},
    DateTime, FixedOffset, Locale, Timelike,
};
use serde::{Deserialize, Serialize};

#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HourFormat {
    #[default]
    TwelveHour,
    TwentyFourHour,
}

/// Localized AM/PM markers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Meridiem {
    pub am: String,
    pub pm: String,
}

impl Default for Meridiem {
    fn default() -> Self {
        Self {
            am: "AM".into(),
            pm: "PM".into(),
        }
    }
}

pub fn two_digits(value: u32) -> String {
    format!("{value:02}")
}

/// Hour as shown on the face. 12-hour clocks don't pad and show midnight and
/// noon as 12; 24-hour clocks always use two digits.
pub fn hour_string(time: &impl Timelike, format: HourFormat) -> String {
    match format {
        HourFormat::TwelveHour => time.hour12().1.to_string(),
        HourFormat::TwentyFourHour => two_digits(time.hour()),
    }
}

/// Main time line. Seconds are only shown in interactive mode; ambient mode
/// gets an AM/PM marker instead, on 12-hour clocks.
pub fn time_string(
    time: &impl Timelike,
    mode: DisplayMode,
    format: HourFormat,
    meridiem: &Meridiem,
) -> String {
    let hour = hour_string(time, format);
    let minute = two_digits(time.minute());
    match (mode, format) {
        (DisplayMode::Interactive, _) => {
            format!("{hour}:{minute}:{}", two_digits(time.second()))
        }
        (DisplayMode::Ambient, HourFormat::TwelveHour) => {
            let marker = if time.hour12().0 {
                &meridiem.pm
            } else {
                &meridiem.am
            };
            format!("{hour}:{minute} {marker}")
        }
        (DisplayMode::Ambient, HourFormat::TwentyFourHour) => {
            format!("{hour}:{minute}")
        }
    }
}

/// Day-of-week and date line, with day and month names in the configured
/// locale
#[derive(Clone, Debug)]
pub struct DateFormatter {
    // https://docs.rs/chrono/latest/chrono/format/strftime/index.html
    pattern: String,
    locale: Locale,
}

impl DateFormatter {
    pub const DEFAULT_PATTERN: &'static str = "%a, %b %-d %Y";
    pub const DEFAULT_LOCALE: &'static str = "en_US";

    /// Build a formatter, rejecting patterns chrono can't render. chrono
    /// panics on invalid patterns at format time, so check up front.
    pub fn new(pattern: &str, locale: &str) -> anyhow::Result<Self> {
        if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
        {
            bail!("Invalid date pattern `{pattern}`");
        }
        // The error type here doesn't implement Error so map it manually
        let locale = Locale::try_from(locale)
            .map_err(|err| anyhow!("Unknown locale `{locale}`: {err:?}"))?;
        Ok(Self {
            pattern: pattern.to_owned(),
            locale,
        })
    }

    pub fn format(&self, now: &DateTime<FixedOffset>) -> String {
        now.format_localized(&self.pattern, self.locale).to_string()
    }
}

impl Default for DateFormatter {
    fn default() -> Self {
        Self {
            pattern: Self::DEFAULT_PATTERN.to_owned(),
            locale: Locale::en_US,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};
    use proptest::prelude::*;

    fn time(hour: u32, minute: u32, second: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, second).unwrap()
    }

    #[test]
    fn test_twelve_hour_midnight() {
        assert_eq!(hour_string(&time(0, 5, 0), HourFormat::TwelveHour), "12");
        assert_eq!(hour_string(&time(12, 5, 0), HourFormat::TwelveHour), "12");
        assert_eq!(hour_string(&time(13, 5, 0), HourFormat::TwelveHour), "1");
    }

    #[test]
    fn test_time_string() {
        let meridiem = Meridiem::default();
        let t = time(5, 7, 9);
        assert_eq!(
            time_string(
                &t,
                DisplayMode::Interactive,
                HourFormat::TwelveHour,
                &meridiem
            ),
            "5:07:09"
        );
        assert_eq!(
            time_string(
                &t,
                DisplayMode::Interactive,
                HourFormat::TwentyFourHour,
                &meridiem
            ),
            "05:07:09"
        );
        assert_eq!(
            time_string(
                &t,
                DisplayMode::Ambient,
                HourFormat::TwelveHour,
                &meridiem
            ),
            "5:07 AM"
        );
        assert_eq!(
            time_string(
                &time(17, 7, 9),
                DisplayMode::Ambient,
                HourFormat::TwelveHour,
                &meridiem
            ),
            "5:07 PM"
        );
        assert_eq!(
            time_string(
                &t,
                DisplayMode::Ambient,
                HourFormat::TwentyFourHour,
                &meridiem
            ),
            "05:07"
        );
    }

    #[test]
    fn test_custom_meridiem() {
        let meridiem = Meridiem {
            am: "a.m.".into(),
            pm: "p.m.".into(),
        };
        assert_eq!(
            time_string(
                &time(23, 59, 0),
                DisplayMode::Ambient,
                HourFormat::TwelveHour,
                &meridiem
            ),
            "11:59 p.m."
        );
    }

    fn local(time: &str, offset_hours: i32) -> DateTime<FixedOffset> {
        let utc: DateTime<Utc> = time.parse().unwrap();
        utc.with_timezone(&FixedOffset::east_opt(offset_hours * 3600).unwrap())
    }

    #[test]
    fn test_date_line() {
        let formatter = DateFormatter::default();
        assert_eq!(
            formatter.format(&local("2024-05-24T02:30:00Z", 0)),
            "Fri, May 24 2024"
        );
        // Timezone can push us back a day
        assert_eq!(
            formatter.format(&local("2024-05-24T02:30:00Z", -5)),
            "Thu, May 23 2024"
        );
    }

    #[test]
    fn test_localized_date_line() {
        let formatter =
            DateFormatter::new(DateFormatter::DEFAULT_PATTERN, "fr_FR")
                .unwrap();
        assert_eq!(
            formatter.format(&local("2024-05-24T12:00:00Z", 0)),
            "ven., mai 24 2024"
        );
        let formatter = DateFormatter::new("%A %-d %B", "de_DE").unwrap();
        assert_eq!(
            formatter.format(&local("2024-05-24T12:00:00Z", 0)),
            "Freitag 24 Mai"
        );
    }

    #[test]
    fn test_invalid_date_pattern() {
        assert!(DateFormatter::new("%Q", "en_US").is_err());
        assert!(DateFormatter::new("%d/%m", "en_US").is_ok());
        assert!(DateFormatter::new("%d/%m", "xx_NOPE").is_err());
    }

    proptest! {
        #[test]
        fn twelve_hour_in_range(hour in 0u32..24, minute in 0u32..60) {
            let hour_str =
                hour_string(&time(hour, minute, 0), HourFormat::TwelveHour);
            let value: u32 = hour_str.parse().unwrap();
            prop_assert!((1..=12).contains(&value));
            if hour == 0 {
                prop_assert_eq!(value, 12);
            } else if hour <= 12 {
                prop_assert_eq!(value, hour);
            } else {
                prop_assert_eq!(value, hour - 12);
            }
        }

        #[test]
        fn twenty_four_hour_padded(hour in 0u32..24) {
            let hour_str =
                hour_string(&time(hour, 0, 0), HourFormat::TwentyFourHour);
            prop_assert_eq!(hour_str.len(), 2);
            prop_assert_eq!(hour_str.parse::<u32>().unwrap(), hour);
        }

        #[test]
        fn seconds_only_when_interactive(
            hour in 0u32..24,
            minute in 0u32..60,
            second in 0u32..60,
            twenty_four in any::<bool>(),
        ) {
            let format = if twenty_four {
                HourFormat::TwentyFourHour
            } else {
                HourFormat::TwelveHour
            };
            let t = time(hour, minute, second);
            let meridiem = Meridiem::default();
            let interactive =
                time_string(&t, DisplayMode::Interactive, format, &meridiem);
            let ambient =
                time_string(&t, DisplayMode::Ambient, format, &meridiem);
            prop_assert_eq!(interactive.matches(':').count(), 2);
            prop_assert!(interactive.ends_with(&two_digits(second)));
            prop_assert_eq!(ambient.matches(':').count(), 1);
        }
    }
}
