//! Backend writing metrics to the process log.

use url::Url;
use utils::logging::METRICS_TARGET;

use crate::backend::Backend;
use crate::backend::BackendError;
use crate::backend::BackendInfo;
use crate::backend::GlobalTags;
use crate::metric::Metric;

/// Emits every metric as a `tracing` event under the metrics target.
pub struct LogBackend {
    info: BackendInfo,
    tags: GlobalTags,
}

impl LogBackend {
    pub fn new(info: BackendInfo) -> Self {
        Self {
            info,
            tags: GlobalTags::default(),
        }
    }

    pub fn create(info: BackendInfo, _url: &Url) -> Result<Box<dyn Backend>, BackendError> {
        Ok(Box::new(Self::new(info)))
    }

    fn format_tags(&self, metric: &Metric) -> String {
        self.tags
            .merged(metric)
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Backend for LogBackend {
    fn info(&self) -> &BackendInfo {
        &self.info
    }

    fn send(&mut self, metric: &Metric) -> Result<(), BackendError> {
        tracing::info!(
            target: METRICS_TARGET,
            tags = %self.format_tags(metric),
            ts = metric.timestamp().timestamp_millis(),
            "{}={}",
            metric.name(),
            metric.value(),
        );
        Ok(())
    }

    fn add_global_tag(&mut self, key: &str, value: &str) {
        self.tags.set(key, value);
    }
}
