use crate::{
    format::{DateFormatter, HourFormat, Meridiem},
    state::ScreenShape,
    util::Color,
};
use anyhow::{bail, Context};
use log::info;
use serde::Deserialize;
use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

/// Everything that can be tweaked without a rebuild. Every field has a
/// default, so a partial (or missing) config file is fine.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the companion bridge. Without one, the face runs offline
    /// and the weather block stays empty.
    pub companion_url: Option<String>,
    pub hour_format: HourFormat,
    pub screen: ScreenConfig,
    pub face: FaceConfig,
    /// When a newer weather update arrives while an icon is still decoding,
    /// throw the older icon away when it finishes. If false, whichever
    /// decode finishes last is shown.
    pub discard_stale_icons: bool,
    /// Write every presented frame to this file, as a PPM image
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    const PATH: &'static str = "./config.json";

    /// Load config from the default path
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new(Self::PATH))
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("No config at `{}`, using defaults", path.display());
            return Ok(Self::default());
        }
        info!("Loading config from `{}`", path.display());
        let file = File::open(path)
            .with_context(|| format!("Error opening {}", path.display()))?;
        Self::from_reader(BufReader::new(file)).with_context(|| {
            format!("Error parsing config file {}", path.display())
        })
    }

    pub fn from_reader(reader: impl Read) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Catch mistakes that would otherwise blow up at draw time
    fn validate(&self) -> anyhow::Result<()> {
        DateFormatter::new(&self.face.date_pattern, &self.face.locale)?;
        if self.screen.width == 0 || self.screen.height == 0 {
            bail!(
                "Screen size must be non-zero, got {}x{}",
                self.screen.width,
                self.screen.height
            );
        }
        if self.face.layout.line_height <= 0 {
            bail!(
                "Line height must be positive, got {}",
                self.face.layout.line_height
            );
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            companion_url: None,
            hour_format: HourFormat::default(),
            screen: ScreenConfig::default(),
            face: FaceConfig::default(),
            discard_stale_icons: true,
            snapshot_path: None,
        }
    }
}

/// Properties the platform would normally report about the display
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: u32,
    pub height: u32,
    pub shape: ScreenShape,
    /// Panel drops to fewer bits per channel in ambient mode
    pub low_bit_ambient: bool,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 320,
            shape: ScreenShape::default(),
            low_bit_ambient: false,
        }
    }
}

/// Look and feel of the face
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    pub theme: Theme,
    pub meridiem: Meridiem,
    /// strftime pattern for the date line
    pub date_pattern: String,
    /// POSIX locale name (`fr_FR`) for day and month names
    pub locale: String,
    pub layout: LayoutConfig,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            meridiem: Meridiem::default(),
            date_pattern: DateFormatter::DEFAULT_PATTERN.to_owned(),
            locale: DateFormatter::DEFAULT_LOCALE.to_owned(),
            layout: LayoutConfig::default(),
        }
    }
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Theme {
    /// Interactive background, after an even number of taps
    pub background: Color,
    /// Interactive background, after an odd number of taps
    pub background_alt: Color,
    /// Time and high temperature
    pub text: Color,
    /// Date line and low temperature
    pub date: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color::rgb(0x03, 0xa9, 0xf4),
            background_alt: Color::rgb(0x02, 0x77, 0xbd),
            text: Color::WHITE,
            date: Color::rgb(0xb3, 0xe5, 0xfc),
        }
    }
}

/// Where things go, in pixels. Offsets differ between round and square
/// screens, since round screens lose their corners.
#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub x_offset: PerShape,
    /// Baseline of the time
    pub y_offset: PerShape,
    pub line_height: i32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            x_offset: PerShape {
                round: 48,
                square: 30,
            },
            y_offset: PerShape {
                round: 110,
                square: 96,
            },
            line_height: 30,
        }
    }
}

/// A value that depends on screen shape
#[derive(Copy, Clone, Debug, Deserialize)]
pub struct PerShape {
    pub round: i32,
    pub square: i32,
}

impl PerShape {
    pub fn get(self, shape: ScreenShape) -> i32 {
        match shape {
            ScreenShape::Round => self.round,
            ScreenShape::Square => self.square,
        }
    }
}
