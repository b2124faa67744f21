//! Everything that can happen to the face. Platform callbacks and background
//! workers all funnel into a single queue of [FaceEvent]s, which the engine
//! handles one at a time.

use crate::{
    companion::DataEvent,
    icon::Icon,
    state::{ScreenShape, TapKind},
    tick::TickToken,
    weather::WeatherPayload,
};
use embedded_graphics::{geometry::Point, primitives::Rectangle};

#[derive(Debug)]
pub enum FaceEvent {
    VisibilityChanged(bool),
    AmbientModeChanged(bool),
    PropertiesChanged { low_bit_ambient: bool },
    /// Window insets were applied, which tells us the screen shape
    InsetsApplied(ScreenShape),
    /// A system overlay appeared, moved, or went away
    PeekCardChanged(Option<Rectangle>),
    Tap { kind: TapKind, position: Point },
    /// Coarse tick from the platform, once a minute. Drives ambient mode.
    TimeTick,
    TimezoneChanged,
    /// Our own interactive-mode timer
    Tick(TickToken),
    Companion(CompanionEvent),
    /// Face is being destroyed
    Shutdown,
}

/// Results posted back by companion workers
#[derive(Debug)]
pub enum CompanionEvent {
    Connected(SessionId),
    ConnectionFailed {
        session: SessionId,
        error: anyhow::Error,
    },
    /// The session dropped out from under us
    ConnectionSuspended(SessionId),
    DataChanged {
        session: SessionId,
        events: Vec<DataEvent>,
    },
    /// Result of the pull done right after connecting
    WeatherPulled {
        session: SessionId,
        payload: Option<WeatherPayload>,
    },
    IconResolved {
        /// Which request this answers
        generation: u64,
        icon: Option<Icon>,
    },
}

impl From<CompanionEvent> for FaceEvent {
    fn from(event: CompanionEvent) -> Self {
        Self::Companion(event)
    }
}

/// Identifies one connection attempt, so that results from an abandoned
/// session can be told apart from the current one
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SessionId(pub u64);
