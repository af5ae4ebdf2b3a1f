//! Backend contract: identity, versioning and the delivery capability set.

use derive_more::Display;
use thiserror::Error;

use crate::metric::Metric;
use crate::transport::TransportError;

/// Semantic version of a backend build, ordered major first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("{major}.{minor}.{patch}")]
pub struct BackendVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl BackendVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// A build is compatible with a host when it shares the major version
    /// and is not newer than the host.
    pub fn is_compatible_with(&self, host: &BackendVersion) -> bool {
        self.major == host.major && self <= host
    }
}

/// Identity of a backend. Two backends are equal when name and version match.
#[derive(Debug, Clone, Display)]
#[display("'{name}', version '{version}', maintainer '{maintainer}', homepage '{homepage}'")]
pub struct BackendInfo {
    pub name: String,
    pub version: BackendVersion,
    pub maintainer: String,
    pub homepage: String,
}

impl BackendInfo {
    pub fn new(
        name: impl Into<String>,
        version: BackendVersion,
        maintainer: impl Into<String>,
        homepage: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            maintainer: maintainer.into(),
            homepage: homepage.into(),
        }
    }
}

impl PartialEq for BackendInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl Eq for BackendInfo {}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to encode metric: {message}")]
    Encode { message: String },

    #[error("backend misconfigured: {message}")]
    Config { message: String },
}

/// Delivery target for metrics.
///
/// Sends are synchronous; a failing send is reported to the caller as is.
pub trait Backend: Send {
    fn info(&self) -> &BackendInfo;

    /// Delivers a single metric.
    fn send(&mut self, metric: &Metric) -> Result<(), BackendError>;

    /// Delivers a batch under one measurement name, preserving order.
    ///
    /// Backends without native batching fall back to one send per metric.
    fn send_multiple(&mut self, measurement: &str, metrics: &[Metric]) -> Result<(), BackendError> {
        let _ = measurement;
        for metric in metrics {
            self.send(metric)?;
        }
        Ok(())
    }

    /// Sets a tag applied to every metric sent afterwards. Last value per key wins.
    fn add_global_tag(&mut self, key: &str, value: &str);
}

impl PartialEq for dyn Backend {
    fn eq(&self, other: &Self) -> bool {
        self.info() == other.info()
    }
}

/// Tag set kept by backends, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct GlobalTags(Vec<(String, String)>);

impl GlobalTags {
    pub fn set(&mut self, key: &str, value: &str) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1 = value.to_string(),
            None => self.0.push((key.to_string(), value.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Global tags followed by the metric's own tags; a metric tag
    /// overrides a global tag with the same key.
    pub fn merged<'a>(&'a self, metric: &'a Metric) -> Vec<(&'a str, &'a str)> {
        let mut tags: Vec<(&str, &str)> = self
            .iter()
            .filter(|(k, _)| !metric.tags().iter().any(|(mk, _)| mk == k))
            .collect();
        tags.extend(metric.tags().iter().map(|(k, v)| (k.as_str(), v.as_str())));
        tags
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    struct CountingBackend {
        info: BackendInfo,
        sent: Vec<String>,
    }

    impl Backend for CountingBackend {
        fn info(&self) -> &BackendInfo {
            &self.info
        }

        fn send(&mut self, metric: &Metric) -> Result<(), BackendError> {
            self.sent.push(metric.name().to_string());
            Ok(())
        }

        fn add_global_tag(&mut self, _key: &str, _value: &str) {}
    }

    fn info(name: &str, version: BackendVersion) -> BackendInfo {
        BackendInfo::new(name, version, "ops", "https://example.org")
    }

    #[test]
    fn version_ordering_is_lexicographic() {
        let v120 = BackendVersion::new(1, 2, 0);
        let v130 = BackendVersion::new(1, 3, 0);
        assert!(v120 < v130);
        assert!(v130 > v120);
        assert!(v120 <= v120);
        assert!(v130 >= v120);
        assert!(v120 != v130);
        assert!(BackendVersion::new(2, 0, 0) > BackendVersion::new(1, 99, 99));
        assert!(BackendVersion::new(1, 2, 3) > BackendVersion::new(1, 2, 2));
    }

    #[test]
    fn identity_equality_ignores_maintainer_and_homepage() {
        let a = info("x", BackendVersion::new(1, 2, 0));
        let b = BackendInfo::new("x", BackendVersion::new(1, 2, 0), "someone", "elsewhere");
        let c = info("x", BackendVersion::new(1, 3, 0));
        assert_eq!(a, b);
        assert!(a != c);
        assert!(c.version > a.version);
    }

    #[test]
    fn identity_display() {
        let info = info("influxdb", BackendVersion::new(1, 0, 2));
        assert_eq!(
            info.to_string().as_str(),
            "'influxdb', version '1.0.2', maintainer 'ops', homepage 'https://example.org'"
        );
    }

    #[test]
    fn compatibility_requires_same_major_and_not_newer() {
        let host = BackendVersion::new(1, 4, 0);
        assert!(BackendVersion::new(1, 0, 0).is_compatible_with(&host));
        assert!(BackendVersion::new(1, 4, 0).is_compatible_with(&host));
        assert!(!BackendVersion::new(1, 5, 0).is_compatible_with(&host));
        assert!(!BackendVersion::new(0, 9, 0).is_compatible_with(&host));
        assert!(!BackendVersion::new(2, 0, 0).is_compatible_with(&host));
    }

    #[test]
    fn default_send_multiple_preserves_order() {
        let mut backend = CountingBackend {
            info: info("counting", BackendVersion::new(0, 1, 0)),
            sent: Vec::new(),
        };
        let batch = vec![Metric::new(1, "a"), Metric::new(2, "b"), Metric::new(3, "c")];
        backend.send_multiple("batch", &batch).expect("send batch");
        assert_eq!(backend.sent, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn backends_compare_by_identity() {
        let a: Box<dyn Backend> = Box::new(CountingBackend {
            info: info("counting", BackendVersion::new(0, 1, 0)),
            sent: vec!["state".to_string()],
        });
        let b: Box<dyn Backend> = Box::new(CountingBackend {
            info: info("counting", BackendVersion::new(0, 1, 0)),
            sent: Vec::new(),
        });
        assert!(*a == *b);
    }

    #[test]
    fn metric_tags_override_global_tags() {
        let mut tags = GlobalTags::default();
        tags.set("hostname", "node-1");
        tags.set("name", "agent");
        tags.set("hostname", "node-2");

        let metric = Metric::new(1, "m").with_tag("name", "worker");
        assert_eq!(tags.merged(&metric), vec![("hostname", "node-2"), ("name", "worker")]);
    }
}
