//! Built-in backends.

use url::Url;

use crate::backend::BackendError;
use crate::backend::BackendInfo;
use crate::backend::BackendVersion;
use crate::registry::BackendRegistration;

pub mod influx;
pub mod json;
pub mod log;

const MAINTAINER: &str = "monitoring maintainers";

/// Registrations for every backend shipped with the agent.
pub(crate) fn builtin() -> Vec<BackendRegistration> {
    vec![
        BackendRegistration::new(
            "log",
            BackendInfo::new(
                "log",
                BackendVersion::new(1, 0, 0),
                MAINTAINER,
                "https://docs.rs/tracing",
            ),
            log::LogBackend::create,
        ),
        BackendRegistration::new(
            "influxdb",
            BackendInfo::new(
                "influxdb",
                BackendVersion::new(1, 0, 0),
                MAINTAINER,
                "https://docs.influxdata.com/influxdb/",
            ),
            influx::InfluxBackend::create,
        ),
        BackendRegistration::new(
            "json",
            BackendInfo::new(
                "json",
                BackendVersion::new(1, 0, 0),
                MAINTAINER,
                "https://www.json.org",
            ),
            json::JsonBackend::create,
        ),
    ]
}

/// Host and port of a network backend url.
fn endpoint(url: &Url, default_port: u16) -> Result<(&str, u16), BackendError> {
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| BackendError::Config {
            message: format!("`{url}` has no host"),
        })?;
    Ok((host, url.port().unwrap_or(default_port)))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::sync::Mutex;

    use crate::transport::Transport;
    use crate::transport::TransportError;

    /// In-memory transport; clones share the same buffer.
    #[derive(Clone, Default)]
    pub(crate) struct MemoryTransport {
        pub(crate) written: Arc<Mutex<Vec<u8>>>,
        pub(crate) fail: bool,
    }

    impl MemoryTransport {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8(self.written.lock().expect("poisoned").clone()).expect("utf8 payload")
        }
    }

    impl Transport for MemoryTransport {
        fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Send(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "peer went away",
                )));
            }
            self.written.lock().expect("poisoned").extend_from_slice(bytes);
            Ok(())
        }
    }
}
