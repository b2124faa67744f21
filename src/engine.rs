//! The event loop. Owns all face state and handles [FaceEvent]s one at a
//! time; background workers only ever talk to it through the queue.

use crate::{
    clock::Clock,
    companion::CompanionLink,
    config::Config,
    connection::ConnectionManager,
    event::{CompanionEvent, FaceEvent},
    face::{Face, Frame},
    screen::Screen,
    state::{ClockState, DisplayMode, FaceState},
    tick::{self, TickScheduler},
    weather::WeatherSync,
};
use embedded_graphics::primitives::Rectangle;
use log::{debug, info, trace};
use std::{
    sync::{
        mpsc::{Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    time::Instant,
};

/// What the loop should do after handling an event
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Engine<C, L> {
    clock: C,
    face: Face,
    state: FaceState,
    tick: TickScheduler,
    connection: ConnectionManager<L>,
    weather: WeatherSync<L>,
    /// Timezone changes are only tracked while visible
    watching_timezone: bool,
    /// Something changed since the last frame was presented
    invalidated: bool,
}

impl<C: Clock, L: CompanionLink> Engine<C, L> {
    /// `sender` must feed the same queue that is later passed to
    /// [Self::run], so worker results find their way back
    pub fn new(
        config: &Config,
        clock: C,
        link: Arc<L>,
        sender: Sender<FaceEvent>,
    ) -> anyhow::Result<Self> {
        let state = FaceState::new(ClockState::from_clock(&clock));
        Ok(Self {
            face: Face::new(&config.face)?,
            clock,
            state,
            tick: TickScheduler::default(),
            connection: ConnectionManager::new(
                Arc::clone(&link),
                sender.clone(),
            ),
            weather: WeatherSync::new(
                link,
                sender,
                config.discard_stale_icons,
            ),
            watching_timezone: false,
            invalidated: true,
        })
    }

    pub fn state(&self) -> &FaceState {
        &self.state
    }

    /// Lay out the face as of right now. The local offset is read fresh, so
    /// DST transitions show up on the next frame.
    pub fn frame(&self, bounds: Rectangle) -> Frame {
        self.face.layout(&self.state, self.clock.local_now(), bounds)
    }

    /// Run until shutdown. Frames are presented whenever something has
    /// changed and the face is visible.
    pub fn run(
        mut self,
        receiver: Receiver<FaceEvent>,
        screen: &mut Screen,
    ) -> anyhow::Result<()> {
        info!("Starting engine");
        loop {
            if let Some(token) = self.tick.due(Instant::now()) {
                self.handle(FaceEvent::Tick(token));
            }

            if self.invalidated && self.state.visible {
                self.invalidated = false;
                if screen.show(self.frame(screen.bounds()))? {
                    trace!("Presented new frame");
                }
            }

            let event = match self.tick.deadline() {
                Some(deadline) => {
                    let timeout =
                        deadline.saturating_duration_since(Instant::now());
                    match receiver.recv_timeout(timeout) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match receiver.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            if self.handle(event) == Flow::Exit {
                break;
            }
        }
        info!("Engine stopped");
        Ok(())
    }

    /// Apply a single event
    pub fn handle(&mut self, event: FaceEvent) -> Flow {
        match event {
            FaceEvent::VisibilityChanged(visible) => {
                self.on_visibility_changed(visible)
            }
            FaceEvent::AmbientModeChanged(ambient) => {
                let mode = DisplayMode::from_ambient(ambient);
                if self.state.mode != mode {
                    debug!("Display mode changed to {mode:?}");
                    self.state.mode = mode;
                    self.invalidate();
                }
                self.update_timer();
            }
            FaceEvent::PropertiesChanged { low_bit_ambient } => {
                debug!("Low-bit ambient: {low_bit_ambient}");
                self.state.low_bit_ambient = low_bit_ambient;
                self.invalidate();
            }
            FaceEvent::InsetsApplied(shape) => {
                debug!("Screen shape: {shape:?}");
                self.state.shape = shape;
                self.invalidate();
            }
            FaceEvent::PeekCardChanged(card) => {
                debug!("Peek card: {card:?}");
                self.state.peek_card = card;
                self.invalidate();
            }
            FaceEvent::Tap { kind, position } => {
                trace!("{kind:?} at {position:?}");
                if self.state.taps.register(kind) {
                    debug!("Tap count: {}", self.state.taps.count());
                }
                self.invalidate();
            }
            FaceEvent::TimeTick => self.invalidate(),
            FaceEvent::TimezoneChanged => {
                if self.watching_timezone {
                    self.state.clock.refresh(&self.clock);
                    debug!(
                        "Timezone changed, offset {}",
                        self.clock.local_now().offset()
                    );
                    self.invalidate();
                } else {
                    trace!("Ignoring timezone change while hidden");
                }
            }
            FaceEvent::Tick(token) => {
                if !self.tick.accept(token) {
                    trace!("Dropping cancelled tick {token:?}");
                    return Flow::Continue;
                }
                self.invalidate();
                if self.should_timer_run() {
                    let delay = tick::delay_to_next_tick(
                        self.clock.now().timestamp_millis(),
                    );
                    self.tick.schedule_after(delay, Instant::now());
                }
            }
            FaceEvent::Companion(event) => self.on_companion(event),
            FaceEvent::Shutdown => {
                info!("Shutting down");
                self.tick.cancel();
                self.weather.stop();
                self.connection.disconnect();
                self.watching_timezone = false;
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    fn on_visibility_changed(&mut self, visible: bool) {
        debug!("Visible: {visible}");
        self.state.visible = visible;
        if visible {
            self.connection.connect();
            self.watching_timezone = true;
            // Hour format may have changed while we were hidden
            self.state.clock.refresh(&self.clock);
            self.invalidate();
        } else {
            self.weather.stop();
            self.connection.disconnect();
            self.watching_timezone = false;
        }
        self.update_timer();
    }

    fn on_companion(&mut self, event: CompanionEvent) {
        let snapshot = &mut self.state.weather;
        let changed = match event {
            CompanionEvent::Connected(session) => {
                if self.connection.on_connected(session) {
                    self.weather.start(session);
                }
                false
            }
            CompanionEvent::ConnectionFailed { session, error } => {
                self.connection.on_failed(session, &error);
                false
            }
            CompanionEvent::ConnectionSuspended(session) => {
                if self.connection.on_suspended(session) {
                    self.weather.stop();
                }
                false
            }
            CompanionEvent::DataChanged { session, events } => {
                self.weather.on_data_changed(session, &events, snapshot)
            }
            CompanionEvent::WeatherPulled { session, payload } => {
                self.weather.on_pulled(session, payload, snapshot)
            }
            CompanionEvent::IconResolved { generation, icon } => {
                self.weather.on_icon_resolved(generation, icon, snapshot)
            }
        };
        if changed {
            self.invalidate();
        }
    }

    fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// The seconds timer only runs while visible and interactive
    fn should_timer_run(&self) -> bool {
        self.state.visible && !self.state.is_ambient()
    }

    fn update_timer(&mut self) {
        self.tick.update(self.should_timer_run(), Instant::now());
    }
}
