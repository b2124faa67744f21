use crate::companion::{
    Asset, CompanionLink, DataEvent, DataEventKind, DataItem, DataMap,
    DataUri, EventBatch, Node,
};
use anyhow::{anyhow, bail};
use indexmap::IndexMap;
use log::debug;
use std::{
    collections::HashMap,
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// A companion that lives in memory. Used when no companion is configured,
/// and in tests, where it stands in for the phone.
#[derive(Debug, Default)]
pub struct MemoryLink {
    inner: Mutex<Inner>,
    /// Signalled whenever a new event is appended
    changed: Condvar,
}

#[derive(Debug, Default)]
struct Inner {
    connected: bool,
    /// If set, connection attempts fail with this code
    refuse_code: Option<u16>,
    nodes: Vec<Node>,
    items: IndexMap<String, DataMap>,
    assets: HashMap<String, Vec<u8>>,
    /// Every event ever, in order. Cursors index into this.
    log: Vec<DataEvent>,
}

impl MemoryLink {
    pub const NODE_ID: &'static str = "memory";

    pub fn new() -> Self {
        let link = Self::default();
        link.lock().nodes.push(Node {
            id: Self::NODE_ID.into(),
            display_name: "In-memory companion".into(),
        });
        link
    }

    /// A link that can't be connected to
    pub fn refusing(code: u16) -> Self {
        let link = Self::new();
        link.lock().refuse_code = Some(code);
        link
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing in here can panic while holding the lock, so poisoning
        // would have to come from a test assertion. Keep going.
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Set a data item, as the phone would, and notify listeners
    pub fn put_data_item(&self, path: &str, data: DataMap) {
        let mut inner = self.lock();
        inner.items.insert(path.to_owned(), data.clone());
        inner.log.push(DataEvent {
            kind: DataEventKind::Changed,
            item: DataItem {
                path: path.to_owned(),
                data,
            },
        });
        self.changed.notify_all();
    }

    /// Remove a data item and notify listeners
    pub fn delete_data_item(&self, path: &str) {
        let mut inner = self.lock();
        inner.items.shift_remove(path);
        inner.log.push(DataEvent {
            kind: DataEventKind::Deleted,
            item: DataItem {
                path: path.to_owned(),
                data: DataMap::default(),
            },
        });
        self.changed.notify_all();
    }

    /// Store asset bytes, returning a handle to them
    pub fn put_asset(&self, digest: &str, bytes: Vec<u8>) -> Asset {
        self.lock().assets.insert(digest.to_owned(), bytes);
        Asset {
            digest: digest.to_owned(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn check_connected(inner: &Inner) -> anyhow::Result<()> {
        if inner.connected {
            Ok(())
        } else {
            Err(anyhow!("Not connected to companion"))
        }
    }
}

impl CompanionLink for MemoryLink {
    fn name(&self) -> &str {
        "memory"
    }

    fn connect(&self) -> anyhow::Result<()> {
        let mut inner = self.lock();
        if let Some(code) = inner.refuse_code {
            bail!("Companion refused connection (code {code})");
        }
        inner.connected = true;
        Ok(())
    }

    fn disconnect(&self) {
        self.lock().connected = false;
        // Wake up any pollers so they notice
        self.changed.notify_all();
    }

    fn connected_nodes(&self) -> anyhow::Result<Vec<Node>> {
        let inner = self.lock();
        Self::check_connected(&inner)?;
        Ok(inner.nodes.clone())
    }

    fn data_item(&self, uri: &DataUri) -> anyhow::Result<Option<DataItem>> {
        let inner = self.lock();
        Self::check_connected(&inner)?;
        // There's only one node, so any node ID other than ours is a miss
        if uri.node.as_deref().is_some_and(|node| node != Self::NODE_ID) {
            return Ok(None);
        }
        Ok(inner.items.get(&uri.path).map(|data| DataItem {
            path: uri.path.clone(),
            data: data.clone(),
        }))
    }

    fn asset_bytes(&self, asset: &Asset) -> anyhow::Result<Option<Vec<u8>>> {
        let inner = self.lock();
        Self::check_connected(&inner)?;
        Ok(inner.assets.get(&asset.digest).cloned())
    }

    fn poll_events(
        &self,
        cursor: Option<u64>,
        wait: Duration,
    ) -> anyhow::Result<EventBatch> {
        let deadline = Instant::now() + wait;
        let mut inner = self.lock();
        let Some(cursor) = cursor else {
            Self::check_connected(&inner)?;
            return Ok(EventBatch {
                cursor: inner.log.len() as u64,
                events: Vec::new(),
            });
        };
        loop {
            Self::check_connected(&inner)?;
            let next = cursor as usize;
            if inner.log.len() > next {
                let events = inner.log[next..].to_vec();
                debug!("Delivering {} event(s) after {cursor}", events.len());
                return Ok(EventBatch {
                    cursor: inner.log.len() as u64,
                    events,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(EventBatch {
                    cursor,
                    events: Vec::new(),
                });
            }
            inner = self
                .changed
                .wait_timeout(inner, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|err| err.into_inner().0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::companion::DataValue;
    use std::{sync::Arc, thread};

    fn weather(high: &str) -> DataMap {
        [("high_temp", DataValue::String(high.into()))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_refuse() {
        let link = MemoryLink::refusing(16);
        let err = link.connect().unwrap_err();
        assert!(err.to_string().contains("code 16"));
        assert!(!link.is_connected());
    }

    #[test]
    fn test_requires_connection() {
        let link = MemoryLink::new();
        assert!(link.connected_nodes().is_err());
        assert!(link.poll_events(None, Duration::ZERO).is_err());
        link.connect().unwrap();
        assert_eq!(link.connected_nodes().unwrap()[0].id, MemoryLink::NODE_ID);
    }

    #[test]
    fn test_data_item() {
        let link = MemoryLink::new();
        link.connect().unwrap();
        link.put_data_item("/weather", weather("72°"));

        let uri = DataUri::new(Some(MemoryLink::NODE_ID.into()), "/weather");
        let item = link.data_item(&uri).unwrap().unwrap();
        assert_eq!(item.data.get_string("high_temp"), Some("72°"));
        assert_eq!(
            link.data_item(&DataUri::new(Some("other".into()), "/weather"))
                .unwrap(),
            None
        );

        link.delete_data_item("/weather");
        let uri = DataUri::new(None, "/weather");
        assert_eq!(link.data_item(&uri).unwrap(), None);
    }

    #[test]
    fn test_poll_events() {
        let link = MemoryLink::new();
        link.connect().unwrap();
        link.put_data_item("/weather", weather("72°"));

        let batch = link.poll_events(Some(0), Duration::ZERO).unwrap();
        assert_eq!(batch.cursor, 1);
        assert_eq!(batch.events.len(), 1);

        // Nothing new yet
        let empty =
            link.poll_events(Some(1), Duration::from_millis(10)).unwrap();
        assert_eq!(empty.cursor, 1);
        assert!(empty.events.is_empty());

        // Subscribing skips history
        let now = link.poll_events(None, Duration::from_secs(5)).unwrap();
        assert_eq!(now.cursor, 1);
        assert!(now.events.is_empty());
    }

    #[test]
    fn test_poll_wakes_on_change() {
        let link = Arc::new(MemoryLink::new());
        link.connect().unwrap();

        let poller = {
            let link = Arc::clone(&link);
            thread::spawn(move || {
                link.poll_events(Some(0), Duration::from_secs(5))
            })
        };
        thread::sleep(Duration::from_millis(20));
        link.put_data_item("/weather", weather("80°"));

        let batch = poller.join().unwrap().unwrap();
        let data = &batch.events[0].item.data;
        assert_eq!(data.get_string("high_temp"), Some("80°"));
    }
}
