//! Stand-ins for the platform callbacks. Lifecycle events come from console
//! commands, one per line, and the coarse time tick comes from a timer
//! thread.

use crate::{
    event::FaceEvent,
    state::{ScreenShape, TapKind},
};
use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use embedded_graphics::{
    geometry::{Point, Size},
    primitives::Rectangle,
};
use log::{error, info};
use std::{
    io::{self, BufRead},
    sync::mpsc::Sender,
    thread,
    time::Duration,
};

/// Interval of the platform's ambient time tick
const TIME_TICK_INTERVAL: Duration = Duration::from_secs(60);

pub const HELP: &str = "\
Commands:
  tap [X Y]             Complete a tap (defaults to screen center)
  touch [X Y]           Start touching
  cancel [X Y]          Cancel a touch
  ambient | interactive Switch display mode
  show | hide           Change visibility
  tz                    Notify of a timezone change
  peek HEIGHT | unpeek  Show/hide a peek card along the bottom edge
  shape round|square    Apply window insets
  lowbit on|off         Change low-bit ambient property
  quit                  Shut down";

/// Parse one console line into an event. Blank lines are `None`.
pub fn parse_command(
    line: &str,
    screen: Size,
) -> anyhow::Result<Option<FaceEvent>> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let event = match command {
        "tap" => tap(TapKind::Tap, &args, screen)?,
        "touch" => tap(TapKind::Touch, &args, screen)?,
        "cancel" => tap(TapKind::TouchCancel, &args, screen)?,
        "ambient" => FaceEvent::AmbientModeChanged(true),
        "interactive" => FaceEvent::AmbientModeChanged(false),
        "show" => FaceEvent::VisibilityChanged(true),
        "hide" => FaceEvent::VisibilityChanged(false),
        "tz" => FaceEvent::TimezoneChanged,
        "peek" => {
            let [height] = args.as_slice() else {
                bail!("Usage: peek HEIGHT");
            };
            let height: u32 = height
                .parse()
                .with_context(|| format!("Invalid height `{height}`"))?;
            let height = height.min(screen.height);
            FaceEvent::PeekCardChanged(Some(Rectangle::new(
                Point::new(0, (screen.height - height) as i32),
                Size::new(screen.width, height),
            )))
        }
        "unpeek" => FaceEvent::PeekCardChanged(None),
        "shape" => match args.as_slice() {
            ["round"] => FaceEvent::InsetsApplied(ScreenShape::Round),
            ["square"] => FaceEvent::InsetsApplied(ScreenShape::Square),
            _ => bail!("Usage: shape round|square"),
        },
        "lowbit" => match args.as_slice() {
            ["on"] => FaceEvent::PropertiesChanged {
                low_bit_ambient: true,
            },
            ["off"] => FaceEvent::PropertiesChanged {
                low_bit_ambient: false,
            },
            _ => bail!("Usage: lowbit on|off"),
        },
        "quit" | "exit" => FaceEvent::Shutdown,
        _ => bail!("Unknown command `{command}`"),
    };
    Ok(Some(event))
}

fn tap(
    kind: TapKind,
    args: &[&str],
    screen: Size,
) -> anyhow::Result<FaceEvent> {
    let position = match args {
        [] => Point::new(screen.width as i32 / 2, screen.height as i32 / 2),
        [x, y] => {
            let parse = |value: &str| {
                value.parse::<i32>().map_err(|err| {
                    anyhow!("Invalid coordinate `{value}`: {err}")
                })
            };
            Point::new(parse(*x)?, parse(*y)?)
        }
        _ => bail!("Expected no coordinates or `X Y`"),
    };
    Ok(FaceEvent::Tap { kind, position })
}

/// Read commands from stdin until EOF or `quit`. EOF shuts the face down.
pub fn spawn_console(sender: Sender<FaceEvent>, screen: Size) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    error!("Error reading console: {err}");
                    break;
                }
            };
            if line.trim() == "help" {
                println!("{HELP}");
                continue;
            }
            match parse_command(&line, screen) {
                Ok(Some(event)) => {
                    let shutdown = matches!(event, FaceEvent::Shutdown);
                    if sender.send(event).is_err() || shutdown {
                        return;
                    }
                }
                Ok(None) => {}
                Err(err) => error!("{err:#}"),
            }
        }
        info!("Console closed");
        let _ = sender.send(FaceEvent::Shutdown);
    });
}

/// Send a [FaceEvent::TimeTick] at the top of every minute, like the
/// platform does in ambient mode
pub fn spawn_time_ticks(sender: Sender<FaceEvent>) {
    thread::spawn(move || loop {
        let interval = TIME_TICK_INTERVAL.as_millis() as i64;
        let now = Utc::now().timestamp_millis();
        thread::sleep(Duration::from_millis(
            (interval - now.rem_euclid(interval)) as u64,
        ));
        if sender.send(FaceEvent::TimeTick).is_err() {
            break;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Size = Size::new(320, 320);

    fn parse(line: &str) -> FaceEvent {
        parse_command(line, SCREEN).unwrap().unwrap()
    }

    #[test]
    fn test_blank() {
        assert!(parse_command("   ", SCREEN).unwrap().is_none());
    }

    #[test]
    fn test_taps() {
        assert!(matches!(
            parse("tap"),
            FaceEvent::Tap {
                kind: TapKind::Tap,
                position: Point { x: 160, y: 160 }
            }
        ));
        assert!(matches!(
            parse("touch 10 20"),
            FaceEvent::Tap {
                kind: TapKind::Touch,
                position: Point { x: 10, y: 20 }
            }
        ));
        assert!(matches!(
            parse("cancel"),
            FaceEvent::Tap {
                kind: TapKind::TouchCancel,
                ..
            }
        ));
        assert!(parse_command("tap 10", SCREEN).is_err());
        assert!(parse_command("tap x y", SCREEN).is_err());
    }

    #[test]
    fn test_lifecycle() {
        assert!(matches!(
            parse("ambient"),
            FaceEvent::AmbientModeChanged(true)
        ));
        assert!(matches!(
            parse("interactive"),
            FaceEvent::AmbientModeChanged(false)
        ));
        assert!(matches!(parse("hide"), FaceEvent::VisibilityChanged(false)));
        assert!(matches!(parse("tz"), FaceEvent::TimezoneChanged));
        assert!(matches!(
            parse("shape round"),
            FaceEvent::InsetsApplied(ScreenShape::Round)
        ));
        assert!(matches!(
            parse("lowbit on"),
            FaceEvent::PropertiesChanged {
                low_bit_ambient: true
            }
        ));
        assert!(matches!(parse("quit"), FaceEvent::Shutdown));
        assert!(parse_command("dance", SCREEN).is_err());
    }

    #[test]
    fn test_peek() {
        let FaceEvent::PeekCardChanged(Some(card)) = parse("peek 100") else {
            panic!("Expected peek card");
        };
        assert_eq!(
            card,
            Rectangle::new(Point::new(0, 220), Size::new(320, 100))
        );

        // Clamped to the screen
        let FaceEvent::PeekCardChanged(Some(card)) = parse("peek 1000") else {
            panic!("Expected peek card");
        };
        assert_eq!(card.top_left, Point::zero());
        assert!(matches!(parse("unpeek"), FaceEvent::PeekCardChanged(None)));
        assert!(parse_command("peek", SCREEN).is_err());
    }
}
