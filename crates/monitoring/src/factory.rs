//! Collector construction from backend URLs.

use url::Url;

use crate::collector::Collector;
use crate::registry;
use crate::registry::BackendRegistry;
use crate::registry::RegistryError;

pub struct MonitoringFactory;

impl MonitoringFactory {
    /// Builds a collector from a comma separated list of backend urls, e.g.
    /// `log://,influxdb://localhost:8089`, using the process-wide registry.
    pub fn get(urls: &str) -> Result<Collector, RegistryError> {
        registry::with_global(|registry| Self::get_with_registry(urls, registry))
    }

    pub fn get_with_registry(urls: &str, registry: &BackendRegistry) -> Result<Collector, RegistryError> {
        let collector = Collector::new();
        for url in urls.split(',').map(str::trim).filter(|url| !url.is_empty()) {
            let parsed = Url::parse(url).map_err(|source| RegistryError::InvalidUrl {
                url: url.to_string(),
                source,
            })?;
            collector.add_backend(registry.create(&parsed)?);
        }
        Ok(collector)
    }
}
