//! Weather icon bitmaps. The companion ships icons as zlib-compressed raw
//! RGB565 (big endian), prefixed with the dimensions:
//!
//! ```text
//! [width: u16 BE][height: u16 BE][width * height pixels: u16 BE]
//! ```

use anyhow::{anyhow, bail, Context};
use embedded_graphics::{
    geometry::{OriginDimensions, Size},
    pixelcolor::{raw::RawU16, Rgb565},
    prelude::{DrawTarget, IntoStorage},
    primitives::Rectangle,
};
use miniz_oxide::{
    deflate::compress_to_vec_zlib, inflate::decompress_to_vec_zlib_with_limit,
};
use std::fmt::{self, Debug, Formatter};

/// A decoded bitmap
#[derive(Clone, PartialEq)]
pub struct Icon {
    size: Size,
    /// Row-major
    pixels: Vec<Rgb565>,
}

impl Icon {
    const HEADER_LEN: usize = 4;
    /// Refuse anything bigger than this, to keep a corrupt asset from eating
    /// all our memory
    const MAX_DIMENSION: u32 = 512;

    pub fn new(size: Size, pixels: Vec<Rgb565>) -> anyhow::Result<Self> {
        let expected = (size.width * size.height) as usize;
        if pixels.len() != expected {
            bail!(
                "Icon of size {}x{} needs {expected} pixels, got {}",
                size.width,
                size.height,
                pixels.len()
            );
        }
        Ok(Self { size, pixels })
    }

    /// Decode an icon from asset bytes
    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        let max_len = Self::HEADER_LEN
            + (Self::MAX_DIMENSION * Self::MAX_DIMENSION * 2) as usize;
        // The error type here doesn't implement Error so map it manually
        let raw = decompress_to_vec_zlib_with_limit(bytes, max_len)
            .map_err(|err| anyhow!("{err:?}"))
            .context("Error inflating icon")?;

        let Some((header, body)) = raw.split_first_chunk::<4>() else {
            bail!("Icon is too short for a header ({} bytes)", raw.len());
        };
        let width = u16::from_be_bytes([header[0], header[1]]) as u32;
        let height = u16::from_be_bytes([header[2], header[3]]) as u32;
        if width == 0 || height == 0 {
            bail!("Icon has empty dimensions {width}x{height}");
        }

        let pixels = body
            .chunks_exact(2)
            .map(|pair| {
                let raw = u16::from_be_bytes([pair[0], pair[1]]);
                Rgb565::from(RawU16::new(raw))
            })
            .collect();
        Self::new(Size::new(width, height), pixels)
    }

    /// Inverse of [Self::decode]. The face never sends icons, but this is how
    /// fixtures and the offline link build them.
    pub fn encode(&self) -> Vec<u8> {
        let mut raw =
            Vec::with_capacity(Self::HEADER_LEN + self.pixels.len() * 2);
        raw.extend_from_slice(&(self.size.width as u16).to_be_bytes());
        raw.extend_from_slice(&(self.size.height as u16).to_be_bytes());
        for pixel in &self.pixels {
            raw.extend_from_slice(&pixel.into_storage().to_be_bytes());
        }
        compress_to_vec_zlib(&raw, 6)
    }

    /// Get a pixel. Coordinates must be in bounds.
    fn pixel(&self, x: u32, y: u32) -> Rgb565 {
        self.pixels[(y * self.size.width + x) as usize]
    }

    /// Stretch the icon over the given area, nearest-neighbor
    pub fn draw_scaled<D>(
        &self,
        target: &mut D,
        area: Rectangle,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let Size { width, height } = area.size;
        if width == 0 || height == 0 {
            return Ok(());
        }
        let source = self.size;
        let colors = (0..height).flat_map(move |y| {
            let source_y = y * source.height / height;
            (0..width)
                .map(move |x| self.pixel(x * source.width / width, source_y))
        });
        target.fill_contiguous(&area, colors)
    }
}

impl OriginDimensions for Icon {
    fn size(&self) -> Size {
        self.size
    }
}

// Dumping every pixel into the logs isn't helpful
impl Debug for Icon {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Icon").field("size", &self.size).finish()
    }
}
