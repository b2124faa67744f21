//! The thing we draw onto. There's no panel attached, so the "screen" is an
//! in-memory framebuffer that can optionally be dumped to an image file after
//! every change, for eyeballing.

use crate::{config::ScreenConfig, face::Frame};
use anyhow::Context;
use embedded_graphics::{
    geometry::{Dimensions, OriginDimensions, Point, Size},
    pixelcolor::{Rgb565, Rgb888, RgbColor},
    prelude::DrawTarget,
    primitives::Rectangle,
    Pixel,
};
use log::{debug, trace};
use std::{
    convert::Infallible,
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

/// Row-major RGB565 pixel buffer
#[derive(Clone, Debug, PartialEq)]
pub struct Framebuffer {
    size: Size,
    pixels: Vec<Rgb565>,
}

impl Framebuffer {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            pixels: vec![Rgb565::BLACK; (size.width * size.height) as usize],
        }
    }

    fn index(&self, point: Point) -> Option<usize> {
        let x = u32::try_from(point.x).ok()?;
        let y = u32::try_from(point.y).ok()?;
        if x < self.size.width && y < self.size.height {
            Some((y * self.size.width + x) as usize)
        } else {
            None
        }
    }

    /// Color at a point, or `None` if it's off screen
    pub fn pixel(&self, point: Point) -> Option<Rgb565> {
        self.index(point).map(|index| self.pixels[index])
    }

    pub fn pixels(&self) -> impl '_ + Iterator<Item = &Rgb565> {
        self.pixels.iter()
    }

    /// Write as a binary PPM (P6), 8 bits per channel
    pub fn write_ppm(&self, mut writer: impl Write) -> anyhow::Result<()> {
        write!(writer, "P6\n{} {}\n255\n", self.size.width, self.size.height)?;
        for &pixel in &self.pixels {
            let pixel = Rgb888::from(pixel);
            writer.write_all(&[pixel.r(), pixel.g(), pixel.b()])?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl OriginDimensions for Framebuffer {
    fn size(&self) -> Size {
        self.size
    }
}

impl DrawTarget for Framebuffer {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            // Anything off screen is clipped
            if let Some(index) = self.index(point) {
                self.pixels[index] = color;
            }
        }
        Ok(())
    }
}

/// Display output. Keeps the last presented frame, and only redraws when
/// the next one differs.
#[derive(Debug)]
pub struct Screen {
    framebuffer: Framebuffer,
    /// What's currently on the screen
    frame: Option<Frame>,
    snapshot_path: Option<PathBuf>,
}

impl Screen {
    pub fn new(config: &ScreenConfig, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            framebuffer: Framebuffer::new(Size::new(
                config.width,
                config.height,
            )),
            frame: None,
            snapshot_path,
        }
    }

    pub fn bounds(&self) -> Rectangle {
        self.framebuffer.bounding_box()
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Put a frame on the screen. If nothing changed since the last frame, do
    /// nothing. Return whether or not the screen changed.
    pub fn show(&mut self, frame: Frame) -> anyhow::Result<bool> {
        if self.frame.as_ref() == Some(&frame) {
            return Ok(false);
        }
        trace!("Frame changed: old={:?}; new={frame:?}", self.frame);
        let frame = self.frame.insert(frame);
        frame
            .draw(&mut self.framebuffer)
            .unwrap_or_else(|never| match never {});

        if let Some(path) = &self.snapshot_path {
            let file = File::create(path).with_context(|| {
                format!("Error creating snapshot {}", path.display())
            })?;
            self.framebuffer
                .write_ppm(BufWriter::new(file))
                .with_context(|| {
                    format!("Error writing snapshot {}", path.display())
                })?;
            debug!("Wrote snapshot to {}", path.display());
        }
        Ok(true)
    }
}
