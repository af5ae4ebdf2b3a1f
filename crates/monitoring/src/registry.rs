//! Backend registry.
//!
//! Maps a URL scheme to a backend factory. Built-in backends are registered
//! when the process-wide registry is first used; out-of-tree backends
//! register themselves at load time with [`register_backend!`](crate::register_backend).

use std::collections::HashMap;
use std::sync::LazyLock;
use std::sync::PoisonError;
use std::sync::RwLock;

use thiserror::Error;
use url::Url;

use crate::backend::Backend;
use crate::backend::BackendError;
use crate::backend::BackendInfo;
use crate::backend::BackendVersion;

/// Version of the backend contract implemented by this agent. Registrations
/// built against a newer or different-major contract are rejected.
pub const BACKEND_API_VERSION: BackendVersion = BackendVersion::new(1, 0, 0);

/// Builds a backend from its identity and the URL it was configured with.
pub type BackendFactory = fn(BackendInfo, &Url) -> Result<Box<dyn Backend>, BackendError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no backend registered for scheme `{0}`")]
    UnknownScheme(String),

    #[error("backend {info} targets contract {api_version}, agent provides {host}")]
    IncompatibleVersion {
        info: BackendInfo,
        api_version: BackendVersion,
        host: BackendVersion,
    },

    #[error("invalid backend url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("failed to create backend for `{url}`: {source}")]
    Backend { url: String, source: BackendError },
}

#[derive(Clone)]
pub struct BackendRegistration {
    pub scheme: String,
    pub info: BackendInfo,
    /// Contract version the backend was built against.
    pub api_version: BackendVersion,
    pub factory: BackendFactory,
}

impl std::fmt::Debug for BackendRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistration")
            .field("scheme", &self.scheme)
            .field("info", &self.info)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl BackendRegistration {
    pub fn new(scheme: impl Into<String>, info: BackendInfo, factory: BackendFactory) -> Self {
        Self {
            scheme: scheme.into(),
            info,
            api_version: BACKEND_API_VERSION,
            factory,
        }
    }

    pub fn with_api_version(mut self, api_version: BackendVersion) -> Self {
        self.api_version = api_version;
        self
    }
}

#[derive(Debug, Default)]
pub struct BackendRegistry {
    entries: HashMap<String, BackendRegistration>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in backends.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for registration in crate::backends::builtin() {
            if let Err(e) = registry.register(registration) {
                tracing::error!("failed to register built-in backend: {e}");
            }
        }
        registry
    }

    /// Adds a registration, replacing any previous one for the same scheme.
    pub fn register(&mut self, registration: BackendRegistration) -> Result<(), RegistryError> {
        if !registration
            .api_version
            .is_compatible_with(&BACKEND_API_VERSION)
        {
            return Err(RegistryError::IncompatibleVersion {
                info: registration.info,
                api_version: registration.api_version,
                host: BACKEND_API_VERSION,
            });
        }

        let scheme = registration.scheme.to_lowercase();
        tracing::debug!("registered backend {} for `{scheme}://`", registration.info);
        if let Some(previous) = self.entries.insert(scheme.clone(), registration) {
            tracing::warn!("backend {} for `{scheme}://` was replaced", previous.info);
        }
        Ok(())
    }

    pub fn get(&self, scheme: &str) -> Option<&BackendRegistration> {
        self.entries.get(&scheme.to_lowercase())
    }

    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Instantiates the backend registered for the scheme of `url`.
    pub fn create(&self, url: &Url) -> Result<Box<dyn Backend>, RegistryError> {
        let registration = self
            .get(url.scheme())
            .ok_or_else(|| RegistryError::UnknownScheme(url.scheme().to_string()))?;

        (registration.factory)(registration.info.clone(), url).map_err(|source| {
            RegistryError::Backend {
                url: url.to_string(),
                source,
            }
        })
    }
}

static GLOBAL_REGISTRY: LazyLock<RwLock<BackendRegistry>> =
    LazyLock::new(|| RwLock::new(BackendRegistry::with_builtin()));

/// Registers a backend in the process-wide registry.
pub fn register(registration: BackendRegistration) -> Result<(), RegistryError> {
    GLOBAL_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(registration)
}

/// Runs `f` with read access to the process-wide registry.
pub fn with_global<R>(f: impl FnOnce(&BackendRegistry) -> R) -> R {
    let registry = GLOBAL_REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    f(&registry)
}

/// Registers a backend type in the process-wide registry when the binary
/// containing it is loaded.
///
/// The invoking crate must depend on `ctor`.
///
/// ```ignore
/// register_backend!(register_udp_backend, "udp", UdpBackend::create,
///     BackendVersion::new(0, 1, 0), "ops team", "https://example.org");
/// ```
#[macro_export]
macro_rules! register_backend {
    ($fn_name:ident, $scheme:expr, $factory:expr, $version:expr, $maintainer:expr, $homepage:expr) => {
        #[::ctor::ctor]
        unsafe fn $fn_name() {
            let registration = $crate::registry::BackendRegistration::new(
                $scheme,
                $crate::backend::BackendInfo::new($scheme, $version, $maintainer, $homepage),
                $factory,
            );
            if let Err(e) = $crate::registry::register(registration) {
                $crate::__tracing::error!("failed to register backend `{}`: {e}", $scheme);
            }
        }
    };
}
