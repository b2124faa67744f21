//! The companion is the paired phone that pushes data to the watch. This
//! module defines the data model of its key-value channel, and the
//! [CompanionLink] trait that transports it. Each transport has a submodule.

pub mod http;
pub mod memory;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display, Formatter},
    time::Duration,
};

/// Connection to the companion's messaging service. Calls are blocking, and
/// are made from worker threads, never from the engine thread.
pub trait CompanionLink: 'static + Send + Sync {
    /// Descriptive name, for logging
    fn name(&self) -> &str;

    /// Establish a session. Errors should include whatever error code the
    /// companion gave us, because that's all that gets logged.
    fn connect(&self) -> anyhow::Result<()>;

    /// Tear down the session. Never fails; there's nothing useful to do if
    /// it does.
    fn disconnect(&self);

    /// Nodes (devices) currently reachable over the session
    fn connected_nodes(&self) -> anyhow::Result<Vec<Node>>;

    /// Fetch the current value of a data item. `None` if it doesn't exist.
    fn data_item(&self, uri: &DataUri) -> anyhow::Result<Option<DataItem>>;

    /// Fetch the bytes behind an asset. `None` if the companion no longer
    /// has it.
    fn asset_bytes(&self, asset: &Asset) -> anyhow::Result<Option<Vec<u8>>>;

    /// Wait up to `wait` for data events newer than `cursor`. An empty batch
    /// just means nothing happened in time. Without a cursor, return
    /// immediately with the current cursor, to subscribe from "now".
    fn poll_events(
        &self,
        cursor: Option<u64>,
        wait: Duration,
    ) -> anyhow::Result<EventBatch>;
}

/// A device on the other end of the link
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

/// Address of a data item: `wear://<node>/<path>`. Without a node, the item
/// is looked up on whichever node has it.
#[derive(Clone, Debug, PartialEq)]
pub struct DataUri {
    pub node: Option<String>,
    pub path: String,
}

impl DataUri {
    pub const SCHEME: &'static str = "wear";

    pub fn new(node: Option<String>, path: impl Into<String>) -> Self {
        Self {
            node,
            path: path.into(),
        }
    }
}

impl Display for DataUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}",
            Self::SCHEME,
            self.node.as_deref().unwrap_or_default(),
            self.path
        )
    }
}

/// Opaque handle to a binary payload. The bytes are only fetched on demand.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub digest: String,
}

/// A single value in a [DataMap]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    String(String),
    Asset(Asset),
    /// Anything else. We don't use these, but they shouldn't make the whole
    /// map fail to parse.
    Other(serde_json::Value),
}

/// Key-value payload of a data item. Order is preserved, to keep logs
/// readable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataMap(IndexMap<String, DataValue>);

impl DataMap {
    /// Get a string value. `None` if missing or not a string.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            DataValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Get an asset value. `None` if missing or not an asset.
    pub fn get_asset(&self, key: &str) -> Option<&Asset> {
        match self.0.get(key)? {
            DataValue::Asset(asset) => Some(asset),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: DataValue) {
        self.0.insert(key.into(), value);
    }

    pub fn keys(&self) -> impl '_ + Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<K: Into<String>> FromIterator<(K, DataValue)> for DataMap {
    fn from_iter<T: IntoIterator<Item = (K, DataValue)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    pub path: String,
    #[serde(default)]
    pub data: DataMap,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataEventKind {
    Changed,
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataEvent {
    #[serde(rename = "type")]
    pub kind: DataEventKind,
    #[serde(flatten)]
    pub item: DataItem,
}

/// Response to [CompanionLink::poll_events]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    /// Pass this back on the next poll
    pub cursor: u64,
    #[serde(default)]
    pub events: Vec<DataEvent>,
}
