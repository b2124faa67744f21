//! Weather sync. The phone publishes the forecast as a data item at
//! [WEATHER_PATH]; we listen for changes while connected and mirror it into
//! the face's [WeatherSnapshot].

use crate::{
    companion::{
        Asset, CompanionLink, DataEvent, DataEventKind, DataMap, DataUri,
    },
    event::{CompanionEvent, FaceEvent, SessionId},
    icon::Icon,
    state::WeatherSnapshot,
};
use itertools::Itertools;
use log::{debug, error, info, trace};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
        Arc,
    },
    thread,
    time::Duration,
};

/// Data item path that the phone writes the forecast to
pub const WEATHER_PATH: &str = "/weather";

const HIGH_TEMP_KEY: &str = "high_temp";
const LOW_TEMP_KEY: &str = "low_temp";
const ICON_KEY: &str = "weather_icon";

/// The fields we care about from a weather data item. Missing or mistyped
/// fields are just `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeatherPayload {
    pub high_temp: Option<String>,
    pub low_temp: Option<String>,
    pub icon: Option<Asset>,
}

impl WeatherPayload {
    pub fn from_data_map(data: &DataMap) -> Self {
        Self {
            high_temp: data.get_string(HIGH_TEMP_KEY).map(String::from),
            low_temp: data.get_string(LOW_TEMP_KEY).map(String::from),
            icon: data.get_asset(ICON_KEY).cloned(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncState {
    Disconnected,
    Listening,
}

/// Listens for weather updates on the companion link. While listening, a
/// worker thread long-polls for data events and posts them to the engine.
/// All the state changes happen on the engine's thread, via the `on_*`
/// methods.
#[derive(Debug)]
pub struct WeatherSync<L> {
    link: Arc<L>,
    sender: Sender<FaceEvent>,
    listener: Option<Listener>,
    /// Bumped for every icon decode request. Lets us tell which decode is
    /// the latest.
    icon_generation: u64,
    /// Drop decodes that finish after a newer one was requested. If false,
    /// whichever decode finishes last wins.
    discard_stale_icons: bool,
}

#[derive(Debug)]
struct Listener {
    session: SessionId,
    /// Tells the worker to quit at its next chance
    stop: Arc<AtomicBool>,
}

impl<L: CompanionLink> WeatherSync<L> {
    /// How long each long-poll waits for events before trying again
    const POLL_WAIT: Duration = Duration::from_secs(30);

    pub fn new(
        link: Arc<L>,
        sender: Sender<FaceEvent>,
        discard_stale_icons: bool,
    ) -> Self {
        Self {
            link,
            sender,
            listener: None,
            icon_generation: 0,
            discard_stale_icons,
        }
    }

    pub fn state(&self) -> SyncState {
        if self.listener.is_some() {
            SyncState::Listening
        } else {
            SyncState::Disconnected
        }
    }

    /// Start listening on a freshly established session, and pull whatever
    /// the phone published while we weren't looking
    pub fn start(&mut self, session: SessionId) {
        self.stop();
        info!("Listening for weather on session {session:?}");
        let stop = Arc::new(AtomicBool::new(false));
        self.spawn_listener(session, Arc::clone(&stop));
        self.listener = Some(Listener { session, stop });
    }

    /// Stop listening. Anything the old listener sends after this is ignored.
    pub fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            debug!("Stopped listening on session {:?}", listener.session);
            listener.stop.store(true, Ordering::Release);
        }
    }

    fn is_current(&self, session: SessionId) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|listener| listener.session == session)
    }

    /// Handle a batch of data events. Returns whether the snapshot changed.
    pub fn on_data_changed(
        &mut self,
        session: SessionId,
        events: &[DataEvent],
        snapshot: &mut WeatherSnapshot,
    ) -> bool {
        if !self.is_current(session) {
            debug!("Ignoring data events from old session {session:?}");
            return false;
        }

        // Only the latest change matters, since each one replaces the
        // snapshot wholesale
        let latest = events
            .iter()
            .filter(|event| {
                event.kind == DataEventKind::Changed
                    && event.item.path == WEATHER_PATH
            })
            .last();
        let Some(event) = latest else {
            trace!(
                "No weather in data events for {}",
                events.iter().map(|event| &event.item.path).join(", ")
            );
            return false;
        };

        debug!(
            "Weather data changed, keys: {}",
            event.item.data.keys().join(", ")
        );
        self.replace(WeatherPayload::from_data_map(&event.item.data), snapshot);
        true
    }

    /// Handle the result of the pull done on connect. Returns whether the
    /// snapshot changed.
    pub fn on_pulled(
        &mut self,
        session: SessionId,
        payload: Option<WeatherPayload>,
        snapshot: &mut WeatherSnapshot,
    ) -> bool {
        if !self.is_current(session) {
            debug!("Ignoring weather pulled by old session {session:?}");
            return false;
        }
        match payload {
            Some(payload) => {
                self.replace(payload, snapshot);
                true
            }
            None => {
                info!("Companion has no weather yet");
                false
            }
        }
    }

    /// Handle a finished icon decode. Returns whether the snapshot changed.
    pub fn on_icon_resolved(
        &mut self,
        generation: u64,
        icon: Option<Icon>,
        snapshot: &mut WeatherSnapshot,
    ) -> bool {
        if self.discard_stale_icons && generation != self.icon_generation {
            debug!(
                "Discarding icon from request {generation}, \
                latest is {}",
                self.icon_generation
            );
            return false;
        }
        debug!("Icon from request {generation} resolved: {icon:?}");
        snapshot.icon = icon.map(Arc::new);
        true
    }

    /// Swap in new weather and kick off the icon decode. The old icon stays
    /// up until the new one is ready.
    fn replace(
        &mut self,
        payload: WeatherPayload,
        snapshot: &mut WeatherSnapshot,
    ) {
        info!(
            "New weather: high={:?} low={:?} icon={:?}",
            payload.high_temp, payload.low_temp, payload.icon
        );
        snapshot.high_temp = payload.high_temp;
        snapshot.low_temp = payload.low_temp;
        self.icon_generation += 1;
        match payload.icon {
            Some(asset) => self.spawn_icon_decode(asset),
            None => snapshot.icon = None,
        }
    }

    /// Spawn a worker that subscribes to data events, pulls the last known
    /// weather, then polls for events until stopped. Subscribing first means
    /// nothing published around the pull gets lost.
    fn spawn_listener(&self, session: SessionId, stop: Arc<AtomicBool>) {
        let link = Arc::clone(&self.link);
        let sender = self.sender.clone();
        thread::spawn(move || {
            let suspend = |err: anyhow::Error| {
                // Errors after a stop are just the disconnect
                if !stop.load(Ordering::Acquire) {
                    error!("Error polling for weather: {err:?}");
                    let event = CompanionEvent::ConnectionSuspended(session);
                    let _ = sender.send(event.into());
                }
            };

            let mut cursor = match link.poll_events(None, Duration::ZERO) {
                Ok(batch) => batch.cursor,
                Err(err) => return suspend(err),
            };
            trace!("Subscribed to data events at {cursor}");

            match pull_weather(&*link) {
                Ok(payload) => {
                    let event =
                        CompanionEvent::WeatherPulled { session, payload };
                    if sender.send(event.into()).is_err() {
                        return; // Engine is gone
                    }
                }
                Err(err) => error!("Error pulling weather: {err:?}"),
            }

            while !stop.load(Ordering::Acquire) {
                match link.poll_events(Some(cursor), Self::POLL_WAIT) {
                    Ok(batch) => {
                        cursor = batch.cursor;
                        if batch.events.is_empty()
                            || stop.load(Ordering::Acquire)
                        {
                            continue;
                        }
                        let event = CompanionEvent::DataChanged {
                            session,
                            events: batch.events,
                        };
                        if sender.send(event.into()).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        suspend(err);
                        break;
                    }
                }
            }
            trace!("Weather listener for session {session:?} exited");
        });
    }

    /// Spawn a worker to resolve and decode an icon asset
    fn spawn_icon_decode(&self, asset: Asset) {
        let link = Arc::clone(&self.link);
        let sender = self.sender.clone();
        let generation = self.icon_generation;
        thread::spawn(move || {
            let icon = match load_icon(&*link, &asset) {
                Ok(icon) => icon,
                Err(err) => {
                    error!("Error loading icon {}: {err:?}", asset.digest);
                    None
                }
            };
            let _ = sender
                .send(CompanionEvent::IconResolved { generation, icon }.into());
        });
    }
}

/// Fetch the current weather item from the first connected node. Blocking.
pub fn pull_weather<L: CompanionLink + ?Sized>(
    link: &L,
) -> anyhow::Result<Option<WeatherPayload>> {
    let node = link.connected_nodes()?.into_iter().next();
    if node.is_none() {
        debug!("No nodes available");
    }
    let uri = DataUri::new(node.map(|node| node.id), WEATHER_PATH);
    debug!("Pulling weather from {uri}");
    let item = link.data_item(&uri)?;
    Ok(item.map(|item| WeatherPayload::from_data_map(&item.data)))
}

/// Resolve an asset and decode it. `None` if the companion doesn't have the
/// asset anymore. Blocking.
pub fn load_icon<L: CompanionLink + ?Sized>(
    link: &L,
    asset: &Asset,
) -> anyhow::Result<Option<Icon>> {
    let Some(bytes) = link.asset_bytes(asset)? else {
        return Ok(None);
    };
    Icon::decode(&bytes).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::companion::{memory::MemoryLink, DataItem, DataValue};
    use embedded_graphics::{
        geometry::Size, pixelcolor::Rgb565, prelude::RgbColor,
    };
    use std::sync::mpsc::{self, Receiver};

    fn icon(color: Rgb565) -> Icon {
        Icon::new(Size::new(1, 1), vec![color]).unwrap()
    }

    fn weather_map(high: &str, low: &str, icon: Option<&str>) -> DataMap {
        let mut map: DataMap = [
            (HIGH_TEMP_KEY, DataValue::String(high.into())),
            (LOW_TEMP_KEY, DataValue::String(low.into())),
        ]
        .into_iter()
        .collect();
        if let Some(digest) = icon {
            map.insert(
                ICON_KEY,
                DataValue::Asset(Asset {
                    digest: digest.into(),
                }),
            );
        }
        map
    }

    fn changed(path: &str, data: DataMap) -> DataEvent {
        DataEvent {
            kind: DataEventKind::Changed,
            item: DataItem {
                path: path.into(),
                data,
            },
        }
    }

    /// A sync that's listening on session 1, against a link that isn't
    /// connected, so its workers give up immediately
    fn listening(
        discard_stale_icons: bool,
    ) -> (WeatherSync<MemoryLink>, Receiver<FaceEvent>) {
        let (sender, receiver) = mpsc::channel();
        let mut sync = WeatherSync::new(
            Arc::new(MemoryLink::new()),
            sender,
            discard_stale_icons,
        );
        sync.listener = Some(Listener {
            session: SessionId(1),
            stop: Arc::new(AtomicBool::new(true)),
        });
        (sync, receiver)
    }

    #[test]
    fn test_payload_from_data_map() {
        let map = weather_map("72°", "54°", Some("sun"));
        let payload = WeatherPayload::from_data_map(&map);
        assert_eq!(
            payload,
            WeatherPayload {
                high_temp: Some("72°".into()),
                low_temp: Some("54°".into()),
                icon: Some(Asset {
                    digest: "sun".into()
                }),
            }
        );

        // Wrong types are dropped, not fatal
        let mut map = DataMap::default();
        map.insert(HIGH_TEMP_KEY, DataValue::Other(72.into()));
        map.insert(ICON_KEY, DataValue::String("sun".into()));
        assert_eq!(
            WeatherPayload::from_data_map(&map),
            WeatherPayload::default()
        );
    }

    #[test]
    fn test_replace_on_change() {
        let (mut sync, _receiver) = listening(true);
        let mut snapshot = WeatherSnapshot {
            icon: Some(Arc::new(icon(Rgb565::RED))),
            ..Default::default()
        };

        let events = [changed(WEATHER_PATH, weather_map("72°", "54°", None))];
        assert!(sync.on_data_changed(SessionId(1), &events, &mut snapshot));
        assert_eq!(snapshot.high_temp.as_deref(), Some("72°"));
        assert_eq!(snapshot.low_temp.as_deref(), Some("54°"));
        // No asset in the payload, so no icon
        assert_eq!(snapshot.icon, None);
    }

    #[test]
    fn test_latest_change_wins() {
        let (mut sync, _receiver) = listening(true);
        let mut snapshot = WeatherSnapshot::default();
        let events = [
            changed(WEATHER_PATH, weather_map("70°", "50°", None)),
            changed(WEATHER_PATH, weather_map("71°", "51°", None)),
            changed("/settings", weather_map("0°", "0°", None)),
        ];
        assert!(sync.on_data_changed(SessionId(1), &events, &mut snapshot));
        assert_eq!(snapshot.high_temp.as_deref(), Some("71°"));
    }

    #[test]
    fn test_ignore_other_paths() {
        let (mut sync, _receiver) = listening(true);
        let mut snapshot = WeatherSnapshot {
            high_temp: Some("72°".into()),
            low_temp: Some("54°".into()),
            icon: None,
        };
        let before = snapshot.clone();

        let events = [
            changed("/settings", weather_map("1°", "2°", None)),
            DataEvent {
                kind: DataEventKind::Deleted,
                item: DataItem {
                    path: WEATHER_PATH.into(),
                    data: DataMap::default(),
                },
            },
        ];
        assert!(!sync.on_data_changed(SessionId(1), &events, &mut snapshot));
        assert_eq!(snapshot, before);
    }

    #[test]
    fn test_ignore_old_session() {
        let (mut sync, _receiver) = listening(true);
        let mut snapshot = WeatherSnapshot::default();
        let events = [changed(WEATHER_PATH, weather_map("72°", "54°", None))];
        assert!(!sync.on_data_changed(SessionId(0), &events, &mut snapshot));
        assert!(!sync.on_pulled(
            SessionId(0),
            Some(WeatherPayload::default()),
            &mut snapshot
        ));
        assert_eq!(snapshot, WeatherSnapshot::default());

        sync.stop();
        assert_eq!(sync.state(), SyncState::Disconnected);
        assert!(!sync.on_data_changed(SessionId(1), &events, &mut snapshot));
    }

    #[test]
    fn test_discard_stale_icon() {
        let (mut sync, receiver) = listening(true);
        let mut snapshot = WeatherSnapshot::default();
        let first = weather_map("72°", "54°", Some("a"));
        let second = weather_map("73°", "55°", Some("b"));
        for map in [first, second] {
            let events = [changed(WEATHER_PATH, map)];
            sync.on_data_changed(SessionId(1), &events, &mut snapshot);
        }

        // Both decodes fail (link isn't connected) and report back
        for _ in 0..2 {
            let event = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(matches!(
                event,
                FaceEvent::Companion(CompanionEvent::IconResolved {
                    icon: None,
                    ..
                })
            ));
        }

        // The first request finishing late doesn't clobber the second
        let red = Some(icon(Rgb565::RED));
        let blue = Some(icon(Rgb565::BLUE));
        assert!(!sync.on_icon_resolved(1, red, &mut snapshot));
        assert_eq!(snapshot.icon, None);
        assert!(sync.on_icon_resolved(2, blue, &mut snapshot));
        assert_eq!(snapshot.icon.as_deref(), Some(&icon(Rgb565::BLUE)));
    }

    #[test]
    fn test_last_icon_wins() {
        let (mut sync, _receiver) = listening(false);
        let mut snapshot = WeatherSnapshot::default();
        let map = weather_map("72°", "54°", Some("a"));
        let events = [changed(WEATHER_PATH, map)];
        sync.on_data_changed(SessionId(1), &events, &mut snapshot);
        sync.on_data_changed(SessionId(1), &events, &mut snapshot);

        let red = Some(icon(Rgb565::RED));
        let blue = Some(icon(Rgb565::BLUE));
        assert!(sync.on_icon_resolved(2, blue, &mut snapshot));
        assert!(sync.on_icon_resolved(1, red, &mut snapshot));
        assert_eq!(snapshot.icon.as_deref(), Some(&icon(Rgb565::RED)));
    }

    #[test]
    fn test_pull_weather() {
        let link = MemoryLink::new();
        link.connect().unwrap();
        assert_eq!(pull_weather(&link).unwrap(), None);

        link.put_data_item(WEATHER_PATH, weather_map("72°", "54°", None));
        let payload = pull_weather(&link).unwrap().unwrap();
        assert_eq!(payload.high_temp.as_deref(), Some("72°"));

        link.disconnect();
        assert!(pull_weather(&link).is_err());
    }

    #[test]
    fn test_load_icon() {
        let link = MemoryLink::new();
        let asset = link.put_asset("sun", icon(Rgb565::YELLOW).encode());
        let garbage = link.put_asset("garbage", b"not an icon".to_vec());
        link.connect().unwrap();

        assert_eq!(
            load_icon(&link, &asset).unwrap(),
            Some(icon(Rgb565::YELLOW))
        );
        assert!(load_icon(&link, &garbage).is_err());
        let missing = Asset {
            digest: "missing".into(),
        };
        assert_eq!(load_icon(&link, &missing).unwrap(), None);
    }
}
