//! Everything the face knows about the world. All of this is owned by the
//! engine and only mutated on its thread.

use crate::{clock::Clock, format::HourFormat, icon::Icon};
use embedded_graphics::primitives::Rectangle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug)]
pub struct FaceState {
    pub clock: ClockState,
    pub weather: WeatherSnapshot,
    pub mode: DisplayMode,
    /// Reported by the device properties. When set, text loses anti-aliasing
    /// in ambient mode.
    pub low_bit_ambient: bool,
    pub visible: bool,
    pub taps: TapCounter,
    pub shape: ScreenShape,
    /// Area covered by a system overlay, if any
    pub peek_card: Option<Rectangle>,
}

impl FaceState {
    pub fn new(clock: ClockState) -> Self {
        Self {
            clock,
            weather: WeatherSnapshot::default(),
            mode: DisplayMode::Interactive,
            low_bit_ambient: false,
            visible: false,
            taps: TapCounter::default(),
            shape: ScreenShape::default(),
            peek_card: None,
        }
    }

    pub fn is_ambient(&self) -> bool {
        self.mode == DisplayMode::Ambient
    }

    /// Is an overlay covering part of the screen? Zero-sized cards don't
    /// count.
    pub fn has_peek_card(&self) -> bool {
        self.peek_card
            .is_some_and(|card| card.size.width > 0 && card.size.height > 0)
    }

    /// Text is smoothed everywhere except low-bit panels in ambient mode
    pub fn anti_alias(&self) -> bool {
        !(self.low_bit_ambient && self.is_ambient())
    }
}

/// 12h/24h preference. The timestamp and timezone offset are read from the
/// [Clock] at draw time, so DST switches show up without any notification.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClockState {
    pub hour_format: HourFormat,
}

impl ClockState {
    pub fn from_clock(clock: &impl Clock) -> Self {
        Self {
            hour_format: clock.hour_format(),
        }
    }

    /// Re-read the hour format, in case it changed since we last looked
    pub fn refresh(&mut self, clock: &impl Clock) {
        *self = Self::from_clock(clock);
    }
}

/// Last known weather. Each field is independently optional; whatever is
/// missing just doesn't get drawn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeatherSnapshot {
    pub high_temp: Option<String>,
    pub low_temp: Option<String>,
    pub icon: Option<Arc<Icon>>,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DisplayMode {
    #[default]
    Interactive,
    Ambient,
}

impl DisplayMode {
    pub fn from_ambient(ambient: bool) -> Self {
        if ambient {
            Self::Ambient
        } else {
            Self::Interactive
        }
    }
}

/// Screen shape, reported when window insets are applied. Drives the offset
/// and font size constants.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ScreenShape {
    Round,
    #[default]
    Square,
}

/// Stage of a touch gesture
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TapKind {
    /// Finger went down
    Touch,
    /// A different gesture took over
    TouchCancel,
    /// Completed tap
    Tap,
}

/// Counts completed taps. Parity picks the background color.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TapCounter(u64);

impl TapCounter {
    /// Record a gesture. Returns whether the count changed.
    pub fn register(&mut self, kind: TapKind) -> bool {
        match kind {
            TapKind::Touch | TapKind::TouchCancel => false,
            TapKind::Tap => {
                self.0 += 1;
                true
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.0
    }

    pub fn is_even(&self) -> bool {
        self.0 % 2 == 0
    }
}
