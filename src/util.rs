use anyhow::anyhow;
use embedded_graphics::pixelcolor::{Rgb565, RgbColor};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// 24-bit Red-Green-Blue color. Serializes/deserializes as HTML format
/// (#rrggbb), so config files can use the same notation as design tools.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

// This is lossy, since we throw away the first 8 bits. Hope it wasn't RGBA!
impl From<u32> for Color {
    fn from(value: u32) -> Self {
        // Casting will truncate the 24 most significant bits
        let red = (value >> 16) as u8;
        let green = (value >> 8) as u8;
        let blue = value as u8;
        Self { red, green, blue }
    }
}

impl From<Color> for u32 {
    fn from(color: Color) -> Self {
        ((color.red as u32) << 16)
            | ((color.green as u32) << 8)
            | color.blue as u32
    }
}

/// Downsample to the panel's native format, dropping the low bits of each
/// channel
impl From<Color> for Rgb565 {
    fn from(color: Color) -> Self {
        Rgb565::new(color.red >> 3, color.green >> 2, color.blue >> 3)
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 7 && s.starts_with('#') {
            let value = u32::from_str_radix(&s[1..], 16)?;
            Ok(value.into())
        } else {
            Err(anyhow!("Invalid color string: {}", s))
        }
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:0>2x}{:0>2x}{:0>2x}", self.red, self.green, self.blue)
    }
}

// These impls are needed for serde
impl TryFrom<String> for Color {
    type Error = <Color as FromStr>::Err;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Snap each channel to fully on or fully off. Low-bit ambient panels can't
/// show anything in between, so text drawn without anti-aliasing has to
/// land on one of these 8 colors.
pub fn quantize(color: Rgb565) -> Rgb565 {
    let snap = |value: u8, max: u8| if value > max / 2 { max } else { 0 };
    Rgb565::new(
        snap(color.r(), Rgb565::MAX_R),
        snap(color.g(), Rgb565::MAX_G),
        snap(color.b(), Rgb565::MAX_B),
    )
}
