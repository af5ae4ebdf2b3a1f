//! JSON lines backend.

use serde_json::json;
use url::Url;

use super::endpoint;
use crate::backend::Backend;
use crate::backend::BackendError;
use crate::backend::BackendInfo;
use crate::backend::GlobalTags;
use crate::metric::Metric;
use crate::transport::TcpTransport;
use crate::transport::Transport;

/// Port of the JSON collector when the url names none.
pub const DEFAULT_PORT: u16 = 41414;

/// Writes one JSON object per metric and line:
/// `{"measure": .., "ts": <ms>, "tag": {..}, "field": {"value": ..}}`.
pub struct JsonBackend {
    info: BackendInfo,
    transport: Box<dyn Transport>,
    tags: GlobalTags,
}

impl JsonBackend {
    pub fn new(info: BackendInfo, transport: Box<dyn Transport>) -> Self {
        Self {
            info,
            transport,
            tags: GlobalTags::default(),
        }
    }

    pub fn create(info: BackendInfo, url: &Url) -> Result<Box<dyn Backend>, BackendError> {
        let (host, port) = endpoint(url, DEFAULT_PORT)?;
        let transport = TcpTransport::connect(host, port)?;
        Ok(Box::new(Self::new(info, Box::new(transport))))
    }

    fn encode(&self, metric: &Metric) -> String {
        let tags: serde_json::Map<String, serde_json::Value> = self
            .tags
            .merged(metric)
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();

        let line = json!({
            "measure": metric.name(),
            "ts": metric.timestamp().timestamp_millis(),
            "tag": tags,
            "field": { "value": metric.value() },
        });
        line.to_string() + "\n"
    }
}

impl Backend for JsonBackend {
    fn info(&self) -> &BackendInfo {
        &self.info
    }

    fn send(&mut self, metric: &Metric) -> Result<(), BackendError> {
        let line = self.encode(metric);
        self.transport.send(line.as_bytes())?;
        Ok(())
    }

    fn add_global_tag(&mut self, key: &str, value: &str) {
        self.tags.set(key, value);
    }
}
