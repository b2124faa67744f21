use crate::companion::{
    Asset, CompanionLink, DataItem, DataUri, EventBatch, Node,
};
use anyhow::{anyhow, Context};
use log::{debug, info};
use std::{
    io::Read,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use ureq::{Agent, AgentBuilder};

/// Talks to a companion bridge over HTTP. The bridge exposes the phone's
/// data layer as a handful of JSON endpoints:
///
/// - `GET /status` - 2xx if the messaging service is available
/// - `GET /nodes` - connected nodes
/// - `GET /data/{node}{path}` - data map of one item
/// - `GET /assets/{digest}` - raw asset bytes
/// - `GET /events?after={cursor}&wait={seconds}` - long-poll for changes.
///   Without `after`, responds right away with the current cursor.
#[derive(Debug)]
pub struct HttpLink {
    base_url: String,
    agent: Agent,
    connected: AtomicBool,
}

impl HttpLink {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Added on top of the long-poll wait, so slow responses aren't cut off
    const READ_SLACK: Duration = Duration::from_secs(5);
    const MAX_ASSET_SIZE: u64 = 1024 * 1024;

    pub fn new(base_url: &str) -> Self {
        let agent = AgentBuilder::new()
            .user_agent("weatherface")
            .timeout_connect(Self::CONNECT_TIMEOUT)
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            agent,
            connected: AtomicBool::new(false),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request. A 404 is mapped to `None`, everything else that
    /// isn't a success is an error.
    fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> anyhow::Result<Option<ureq::Response>> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(anyhow!("Not connected to companion"));
        }

        let url = self.url(path);
        let mut request = self.agent.get(&url);
        for (key, value) in query {
            request = request.query(key, value);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        match request.call() {
            Ok(response) => Ok(Some(response)),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(ureq::Error::Status(code, response)) => Err(anyhow!(
                "Companion returned {code} {}",
                response.status_text()
            ))
            .with_context(|| format!("Error requesting {url}")),
            Err(err) => {
                Err(err).with_context(|| format!("Error requesting {url}"))
            }
        }
    }
}

impl CompanionLink for HttpLink {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn connect(&self) -> anyhow::Result<()> {
        let url = self.url("/status");
        match self.agent.get(&url).call() {
            Ok(_) => {
                self.connected.store(true, Ordering::Release);
                info!("Connected to companion at {}", self.base_url);
                Ok(())
            }
            Err(ureq::Error::Status(code, _)) => {
                Err(anyhow!("Companion refused connection (code {code})"))
            }
            Err(err) => Err(err).with_context(|| {
                format!("Error connecting to companion at {}", self.base_url)
            }),
        }
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            debug!("Disconnected from companion at {}", self.base_url);
        }
    }

    fn connected_nodes(&self) -> anyhow::Result<Vec<Node>> {
        let Some(response) = self.get("/nodes", &[], None)? else {
            return Ok(Vec::new());
        };
        response
            .into_json()
            .context("Error parsing node list as JSON")
    }

    fn data_item(&self, uri: &DataUri) -> anyhow::Result<Option<DataItem>> {
        let path = match &uri.node {
            Some(node) => format!("/data/{node}{}", uri.path),
            None => format!("/data{}", uri.path),
        };
        let Some(response) = self.get(&path, &[], None)? else {
            return Ok(None);
        };
        let data = response
            .into_json()
            .with_context(|| format!("Error parsing data item {uri} as JSON"))?;
        Ok(Some(DataItem {
            path: uri.path.clone(),
            data,
        }))
    }

    fn asset_bytes(&self, asset: &Asset) -> anyhow::Result<Option<Vec<u8>>> {
        let path = format!("/assets/{}", asset.digest);
        let Some(response) = self.get(&path, &[], None)? else {
            return Ok(None);
        };
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(Self::MAX_ASSET_SIZE)
            .read_to_end(&mut bytes)
            .with_context(|| {
                format!("Error reading asset {}", asset.digest)
            })?;
        Ok(Some(bytes))
    }

    fn poll_events(
        &self,
        cursor: Option<u64>,
        wait: Duration,
    ) -> anyhow::Result<EventBatch> {
        let wait_secs = wait.as_secs().to_string();
        let after = cursor.map(|cursor| cursor.to_string());
        let mut query = vec![("wait", wait_secs.as_str())];
        if let Some(after) = &after {
            query.push(("after", after.as_str()));
        }
        let response =
            self.get("/events", &query, Some(wait + Self::READ_SLACK))?;
        match (response, cursor) {
            (Some(response), _) => response
                .into_json()
                .context("Error parsing event batch as JSON"),
            // Nothing to report, keep our place
            (None, Some(cursor)) => Ok(EventBatch {
                cursor,
                events: Vec::new(),
            }),
            (None, None) => Err(anyhow!("Companion has no event stream")),
        }
    }
}
