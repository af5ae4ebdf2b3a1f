pub mod backend;
pub mod backends;
pub mod collector;
pub mod derived;
pub mod factory;
pub mod metric;
pub mod process;
pub mod registry;
pub mod transport;

pub use backend::Backend;
pub use backend::BackendError;
pub use backend::BackendInfo;
pub use backend::BackendVersion;
pub use collector::Collector;
pub use collector::MonitorState;
pub use derived::DerivedMetricMode;
pub use factory::MonitoringFactory;
pub use metric::Metric;
pub use metric::MetricType;
pub use metric::MetricValue;

#[doc(hidden)]
pub use tracing as __tracing;
