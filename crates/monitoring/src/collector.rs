//! Fan-out of metrics to every configured backend.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use derive_more::Display;

use crate::backend::Backend;
use crate::backend::BackendError;
use crate::derived::DerivedMetricMode;
use crate::derived::DerivedMetrics;
use crate::derived::DEFAULT_HISTORY_SIZE;
use crate::metric::Metric;
use crate::metric::MetricValue;
use crate::process;
use crate::process::ProcessDetails;
use crate::process::ResourceSampler;
use crate::process::SysinfoSampler;

/// Lifecycle of the background process monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MonitorState {
    #[display("idle")]
    Idle,
    #[display("running")]
    Running,
    #[display("stopping")]
    Stopping,
    #[display("terminated")]
    Terminated,
}

/// Timing of the monitor loop: it sleeps in `slice` steps and samples every
/// `wakes_per_sample` wake-ups, so shutdown waits at most one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSchedule {
    pub slice: Duration,
    pub wakes_per_sample: u32,
}

impl MonitorSchedule {
    /// Samples roughly every `interval` seconds using `interval * 10` ms slices.
    pub fn from_interval(interval: u64) -> Self {
        Self {
            slice: Duration::from_millis(interval.saturating_mul(10)),
            wakes_per_sample: 100,
        }
    }
}

/// State guarded by the collector's single lock.
struct Shared {
    backends: Vec<Box<dyn Backend>>,
    derived: DerivedMetrics,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sends to every backend in order, then fans out the derived metric if the
/// name is registered. Derivation failures are discarded.
fn dispatch(shared: &Mutex<Shared>, metric: &Metric) -> Result<(), BackendError> {
    let mut guard = lock(shared);
    let Shared { backends, derived } = &mut *guard;

    for backend in backends.iter_mut() {
        backend.send(metric)?;
    }

    if !derived.is_registered(metric.name()) {
        return Ok(());
    }
    let derived_metric = match derived.process_metric(metric) {
        Ok(derived_metric) => derived_metric,
        Err(e) => {
            tracing::debug!("no derived metric for `{}`: {e}", metric.name());
            return Ok(());
        }
    };
    for backend in backends.iter_mut() {
        if let Err(e) = backend.send(&derived_metric) {
            tracing::debug!(
                "dropping derived metric `{}` after backend {} failed: {e}",
                derived_metric.name(),
                backend.info()
            );
            break;
        }
    }
    Ok(())
}

fn monitor_loop(
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    mut sampler: Box<dyn ResourceSampler>,
    schedule: MonitorSchedule,
) {
    let mut wakes = 0u32;
    while running.load(Ordering::Acquire) {
        thread::sleep(schedule.slice);
        wakes += 1;
        if wakes < schedule.wakes_per_sample {
            continue;
        }

        let metrics = sampler
            .process_metrics()
            .into_iter()
            .chain(sampler.network_metrics());
        for metric in metrics {
            if let Err(e) = dispatch(&shared, &metric) {
                tracing::warn!("failed to send `{}`: {e}", metric.name());
            }
        }
        wakes = 0;
    }
}

/// Entry point for applications: owns the backends, the derived metric
/// engine and the optional process monitor.
///
/// Backends and derived history sit behind one mutex, so sends from several
/// threads, the monitor, and late `add_backend` calls are serialized. The
/// collector is `Sync`; share it as `Arc<Collector>` once monitoring is set up.
pub struct Collector {
    shared: Arc<Mutex<Shared>>,
    details: ProcessDetails,
    /// Sampler waiting for `enable_process_monitoring`.
    sampler: Mutex<Option<Box<dyn ResourceSampler>>>,
    running: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
    state: MonitorState,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Self::with_derived_metrics(DerivedMetrics::new(DEFAULT_HISTORY_SIZE))
    }

    pub fn with_derived_metrics(derived: DerivedMetrics) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                backends: Vec::new(),
                derived,
            })),
            details: ProcessDetails::current(),
            sampler: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            monitor: None,
            state: MonitorState::Idle,
        }
    }

    /// Overrides the identity used for the default backend tags.
    pub fn with_process_details(mut self, details: ProcessDetails) -> Self {
        self.details = details;
        self
    }

    /// Overrides the sampler used by the process monitor.
    pub fn with_sampler(mut self, sampler: Box<dyn ResourceSampler>) -> Self {
        self.sampler = Mutex::new(Some(sampler));
        self
    }

    pub fn process_details(&self) -> &ProcessDetails {
        &self.details
    }

    /// Appends a backend and tags it with the host and process name.
    pub fn add_backend(&self, mut backend: Box<dyn Backend>) {
        backend.add_global_tag("hostname", &self.details.hostname);
        backend.add_global_tag("name", &self.details.process_name);
        tracing::info!("Loaded backend: {}", backend.info());
        lock(&self.shared).backends.push(backend);
    }

    /// Adds a tag to every backend added so far.
    pub fn add_global_tag(&self, key: &str, value: &str) {
        for backend in lock(&self.shared).backends.iter_mut() {
            backend.add_global_tag(key, value);
        }
    }

    pub fn backend_count(&self) -> usize {
        lock(&self.shared).backends.len()
    }

    /// Sends `metric` to every backend in order.
    ///
    /// The first backend failure is returned; earlier backends have already
    /// received the metric. Derived metrics are best effort and never fail
    /// this call.
    pub fn send(&self, metric: Metric) -> Result<(), BackendError> {
        dispatch(&self.shared, &metric)
    }

    /// Sends a batch under one measurement name. No derivation is applied.
    pub fn send_multiple(&self, measurement: &str, metrics: Vec<Metric>) -> Result<(), BackendError> {
        let mut guard = lock(&self.shared);
        for backend in guard.backends.iter_mut() {
            backend.send_multiple(measurement, &metrics)?;
        }
        Ok(())
    }

    /// Builds a metric from a raw value and sends it.
    pub fn send_value(&self, value: impl Into<MetricValue>, name: impl Into<String>) -> Result<(), BackendError> {
        self.send(Metric::new(value, name))
    }

    pub fn add_derived_metric(&self, name: impl Into<String>, mode: DerivedMetricMode) {
        lock(&self.shared).derived.register_metric(name, mode);
    }

    /// Starts publishing process and network statistics roughly every
    /// `interval` seconds.
    ///
    /// Without OS support this only logs that monitoring is unavailable.
    pub fn enable_process_monitoring(&mut self, interval: u64) {
        self.enable_process_monitoring_with(MonitorSchedule::from_interval(interval));
    }

    pub fn enable_process_monitoring_with(&mut self, schedule: MonitorSchedule) {
        if self.state != MonitorState::Idle {
            tracing::warn!("Process monitor is {}, not starting it again", self.state);
            return;
        }

        let pending = self
            .sampler
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let sampler = match pending {
            Some(sampler) => sampler,
            None if process::is_supported() => Box::new(SysinfoSampler::new()),
            None => {
                tracing::warn!("Process monitor: automatic updates not supported on this platform");
                return;
            }
        };

        self.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        let spawned = thread::Builder::new()
            .name("process-monitor".to_string())
            .spawn(move || monitor_loop(shared, running, sampler, schedule));

        match spawned {
            Ok(handle) => {
                self.monitor = Some(handle);
                self.state = MonitorState::Running;
                tracing::info!("Process monitor: automatic updates enabled");
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                tracing::error!("Process monitor: failed to start: {e}");
            }
        }
    }

    pub fn monitor_state(&self) -> MonitorState {
        self.state
    }

    /// Stops the process monitor and waits for it. A batch already being
    /// sent is finished first. Monitoring cannot be restarted afterwards.
    pub fn shutdown(&mut self) {
        if self.state != MonitorState::Running {
            return;
        }
        self.state = MonitorState::Stopping;
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.monitor.take() {
            if handle.join().is_err() {
                tracing::error!("Process monitor thread panicked");
            }
        }
        self.state = MonitorState::Terminated;
        tracing::info!("Process monitor stopped");
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.shutdown();
        // unload in reverse registration order
        let mut guard = lock(&self.shared);
        while let Some(backend) = guard.backends.pop() {
            tracing::info!("Unloaded backend: {}", backend.info());
        }
    }
}
