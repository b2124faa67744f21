//! Layout and drawing. Layout is a pure function of the face state that
//! produces a [Frame]: a list of things to draw and where. The frame is then
//! rasterized onto any embedded-graphics target.

use crate::{
    config::{FaceConfig, LayoutConfig, Theme},
    format::{self, DateFormatter, Meridiem},
    icon::Icon,
    state::{FaceState, ScreenShape},
    util::quantize,
};
use chrono::{DateTime, FixedOffset};
use embedded_graphics::{
    geometry::{Point, Size},
    pixelcolor::{Rgb565, RgbColor},
    prelude::DrawTarget,
    primitives::{Line, Primitive, PrimitiveStyle, Rectangle},
    text::{renderer::TextRenderer, Baseline, Text},
    Drawable,
};
use log::trace;
use std::sync::Arc;
use u8g2_fonts::{fonts, U8g2TextStyle};

/// Renders the watch face
#[derive(Debug)]
pub struct Face {
    theme: Theme,
    meridiem: Meridiem,
    dates: DateFormatter,
    layout: LayoutConfig,
}

impl Face {
    pub const ICON_SIZE: Size = Size::new(40, 40);
    /// Icon indent from the left offset
    const ICON_INDENT: i32 = 20;
    /// Temperature indent from the icon (or left offset, if there's no icon)
    const TEMPERATURE_INDENT: i32 = 50;

    pub fn new(config: &FaceConfig) -> anyhow::Result<Self> {
        Ok(Self {
            theme: config.theme,
            meridiem: config.meridiem.clone(),
            dates: DateFormatter::new(&config.date_pattern, &config.locale)?,
            layout: config.layout,
        })
    }

    /// Background fill. Ambient mode is always black, to save power.
    /// Otherwise each tap flips between the two theme colors.
    pub fn background(&self, state: &FaceState) -> Rgb565 {
        if state.is_ambient() {
            Rgb565::BLACK
        } else if state.taps.is_even() {
            self.theme.background.into()
        } else {
            self.theme.background_alt.into()
        }
    }

    /// Lay out the face at the given local time. The caller reads the clock,
    /// offset included, right before every frame.
    pub fn layout(
        &self,
        state: &FaceState,
        now: DateTime<FixedOffset>,
        bounds: Rectangle,
    ) -> Frame {
        let anti_alias = state.anti_alias();
        let text_paint = Paint {
            color: self.theme.text.into(),
            anti_alias,
        };
        let date_paint = Paint {
            color: self.theme.date.into(),
            anti_alias,
        };
        let origin = bounds.top_left;
        let x_offset = self.layout.x_offset.get(state.shape);
        let y_offset = self.layout.y_offset.get(state.shape);
        let line_height = self.layout.line_height;
        let mut items = Vec::new();

        let time = format::time_string(
            &now,
            state.mode,
            state.clock.hour_format,
            &self.meridiem,
        );
        items.push(DrawItem::Text(TextItem {
            text: time,
            location: origin + Point::new(x_offset, y_offset),
            font: Font::time(state.shape),
            paint: text_paint,
        }));

        // Only render the date and weather if there is no peek card, so they
        // don't bleed into each other
        if !state.has_peek_card() {
            let date = self.dates.format(&now);
            let date_width = Font::Date.text_width(&date);
            items.push(DrawItem::Text(TextItem {
                text: date,
                location: origin + Point::new(x_offset, y_offset + line_height),
                font: Font::Date,
                paint: date_paint,
            }));

            // Short separator under the middle half of the date
            let rule_y = y_offset + 3 * line_height / 2;
            items.push(DrawItem::Rule {
                start: origin + Point::new(x_offset + date_width / 4, rule_y),
                end: origin + Point::new(x_offset + 3 * date_width / 4, rule_y),
                paint: date_paint,
            });

            let mut x = x_offset;
            if let Some(icon) = &state.weather.icon {
                x = x_offset + Self::ICON_INDENT;
                items.push(DrawItem::Icon {
                    area: Rectangle::new(
                        origin + Point::new(x, y_offset + 2 * line_height),
                        Self::ICON_SIZE,
                    ),
                    icon: Arc::clone(icon),
                });
            }

            // Temperatures go one after the other, no wrapping. Half a
            // forecast isn't worth showing, so it's both or neither.
            if let (Some(high), Some(low)) =
                (&state.weather.high_temp, &state.weather.low_temp)
            {
                let x = x + Self::TEMPERATURE_INDENT;
                let y = y_offset + 3 * line_height;
                items.push(DrawItem::Text(TextItem {
                    text: high.clone(),
                    location: origin + Point::new(x, y),
                    font: Font::Weather,
                    paint: text_paint,
                }));
                items.push(DrawItem::Text(TextItem {
                    text: low.clone(),
                    location: origin
                        + Point::new(x + Font::Weather.text_width(high), y),
                    font: Font::Weather,
                    paint: date_paint,
                }));
            }
        }

        let frame = Frame {
            bounds,
            background: self.background(state),
            items,
        };
        trace!("Laid out frame: {frame:?}");
        frame
    }
}

/// Everything needed to draw one frame. Comparable, so unchanged frames can
/// be skipped.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub bounds: Rectangle,
    pub background: Rgb565,
    pub items: Vec<DrawItem>,
}

impl Frame {
    /// All text in the frame, in draw order
    pub fn texts(&self) -> impl '_ + Iterator<Item = &TextItem> {
        self.items.iter().filter_map(|item| match item {
            DrawItem::Text(text) => Some(text),
            _ => None,
        })
    }

    pub fn icon_area(&self) -> Option<Rectangle> {
        self.items.iter().find_map(|item| match item {
            DrawItem::Icon { area, .. } => Some(*area),
            _ => None,
        })
    }

    /// Rasterize onto a draw target
    pub fn draw<D>(&self, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        self.bounds
            .into_styled(PrimitiveStyle::with_fill(self.background))
            .draw(target)?;

        for item in &self.items {
            match item {
                DrawItem::Text(text) => {
                    let style = text.font.style(text.paint.resolve());
                    Text::with_baseline(
                        &text.text,
                        text.location,
                        style,
                        Baseline::Alphabetic,
                    )
                    .draw(target)?;
                }
                DrawItem::Rule { start, end, paint } => {
                    Line::new(*start, *end)
                        .into_styled(PrimitiveStyle::with_stroke(
                            paint.resolve(),
                            1,
                        ))
                        .draw(target)?;
                }
                DrawItem::Icon { area, icon } => {
                    icon.draw_scaled(target, *area)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawItem {
    Text(TextItem),
    /// Thin horizontal line
    Rule {
        start: Point,
        end: Point,
        paint: Paint,
    },
    Icon {
        area: Rectangle,
        icon: Arc<Icon>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextItem {
    pub text: String,
    /// Left end of the baseline
    pub location: Point,
    pub font: Font,
    pub paint: Paint,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Paint {
    pub color: Rgb565,
    pub anti_alias: bool,
}

impl Paint {
    /// Color that actually hits the screen. Without anti-aliasing, the
    /// panel can only show full-intensity channels.
    fn resolve(self) -> Rgb565 {
        if self.anti_alias {
            self.color
        } else {
            quantize(self.color)
        }
    }
}

/// Proxy for fonts, because the ones from u8g2 are all different types
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Font {
    /// Time on a round screen. A bit bigger, since there's more room in the
    /// middle.
    TimeRound,
    TimeSquare,
    Date,
    /// Includes the degree sign
    Weather,
}

impl Font {
    pub fn time(shape: ScreenShape) -> Self {
        match shape {
            ScreenShape::Round => Self::TimeRound,
            ScreenShape::Square => Self::TimeSquare,
        }
    }

    pub fn style(self, color: Rgb565) -> U8g2TextStyle<Rgb565> {
        match self {
            Self::TimeRound => {
                U8g2TextStyle::new(fonts::u8g2_font_logisoso28_tr, color)
            }
            Self::TimeSquare => {
                U8g2TextStyle::new(fonts::u8g2_font_logisoso24_tr, color)
            }
            Self::Date => {
                U8g2TextStyle::new(fonts::u8g2_font_helvR10_tr, color)
            }
            Self::Weather => {
                U8g2TextStyle::new(fonts::u8g2_font_helvB12_tf, color)
            }
        }
    }

    /// Horizontal advance of a string, in pixels
    pub fn text_width(self, text: &str) -> i32 {
        self.style(Rgb565::WHITE)
            .measure_string(text, Point::zero(), Baseline::Alphabetic)
            .next_position
            .x
    }
}
