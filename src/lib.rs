//! A digital watch face that shows the time, date, and a weather block synced
//! from a companion device. Everything funnels through one event queue, which
//! the [engine::Engine] drains on a single thread.

pub mod clock;
pub mod companion;
pub mod config;
pub mod connection;
pub mod engine;
pub mod event;
pub mod face;
pub mod format;
pub mod icon;
pub mod input;
pub mod screen;
pub mod state;
pub mod tick;
pub mod util;
pub mod weather;
