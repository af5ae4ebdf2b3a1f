//! InfluxDB line protocol backend.

use influxdb_line_protocol::LineProtocolBuilder;
use url::Url;

use super::endpoint;
use crate::backend::Backend;
use crate::backend::BackendError;
use crate::backend::BackendInfo;
use crate::backend::GlobalTags;
use crate::metric::Metric;
use crate::metric::MetricValue;
use crate::transport::TcpTransport;
use crate::transport::Transport;

/// Port of the InfluxDB line protocol listener when the url names none.
pub const DEFAULT_PORT: u16 = 8089;

/// Encodes a single line. `fields` must not be empty.
///
/// Tags with an empty key or value are left out, line protocol has no way to
/// express them. An empty measurement or field key and non-finite floats are
/// rejected since the server would drop the whole line.
fn encode_line<'a>(
    measurement: &str,
    tags: impl IntoIterator<Item = (&'a str, &'a str)>,
    fields: &[(&str, &MetricValue)],
    timestamp: i64,
) -> Result<Vec<u8>, BackendError> {
    if measurement.is_empty() {
        return Err(BackendError::Encode {
            message: "measurement name is empty".to_string(),
        });
    }
    for (key, value) in fields {
        if key.is_empty() {
            return Err(BackendError::Encode {
                message: format!("`{measurement}` has a field without a name"),
            });
        }
        if let MetricValue::Double(d) = value {
            if !d.is_finite() {
                return Err(BackendError::Encode {
                    message: format!("field `{key}` of `{measurement}` is {d}"),
                });
            }
        }
    }

    let mut builder = LineProtocolBuilder::new().measurement(measurement);
    for (key, value) in tags {
        if key.is_empty() || value.is_empty() {
            tracing::debug!("skipping empty tag `{key}={value}` on `{measurement}`");
            continue;
        }
        builder = builder.tag(key, value);
    }

    let Some(((first_key, first_value), rest)) = fields.split_first() else {
        return Err(BackendError::Encode {
            message: format!("`{measurement}` has no fields"),
        });
    };

    // the first field moves the builder into the field state
    let mut line = match first_value {
        MetricValue::Int(i) => builder.field(first_key, *i),
        MetricValue::Double(d) => builder.field(first_key, *d),
        MetricValue::String(s) => builder.field(first_key, s.as_str()),
        MetricValue::UInt64(u) => builder.field(first_key, *u),
    };
    for (key, value) in rest {
        line = match value {
            MetricValue::Int(i) => line.field(key, *i),
            MetricValue::Double(d) => line.field(key, *d),
            MetricValue::String(s) => line.field(key, s.as_str()),
            MetricValue::UInt64(u) => line.field(key, *u),
        };
    }

    Ok(line.timestamp(timestamp).close_line().build())
}

fn nanos(metric_name: &str, timestamp: chrono::DateTime<chrono::Utc>) -> Result<i64, BackendError> {
    timestamp
        .timestamp_nanos_opt()
        .ok_or_else(|| BackendError::Encode {
            message: format!("timestamp of `{metric_name}` does not fit in nanoseconds"),
        })
}

/// Writes metrics as InfluxDB line protocol over a byte-stream transport.
pub struct InfluxBackend {
    info: BackendInfo,
    transport: Box<dyn Transport>,
    tags: GlobalTags,
}

impl InfluxBackend {
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

    fn encode(&self, metric: &Metric) -> Result<Vec<u8>, BackendError> {
        encode_line(
            metric.name(),
            self.tags.merged(metric),
            &[("value", metric.value())],
            nanos(metric.name(), metric.timestamp())?,
        )
    }
}

impl Backend for InfluxBackend {
    fn info(&self) -> &BackendInfo {
        &self.info
    }

    fn send(&mut self, metric: &Metric) -> Result<(), BackendError> {
        let line = self.encode(metric)?;
        self.transport.send(&line)?;
        Ok(())
    }

    /// Writes one line with a field per metric, tagged with the global tags.
    fn send_multiple(&mut self, measurement: &str, metrics: &[Metric]) -> Result<(), BackendError> {
        if metrics.is_empty() {
            return Ok(());
        }
        let fields: Vec<(&str, &MetricValue)> =
            metrics.iter().map(|m| (m.name(), m.value())).collect();
        let line = encode_line(
            measurement,
            self.tags.iter(),
            &fields,
            nanos(measurement, chrono::Utc::now())?,
        )?;
        self.transport.send(&line)?;
        Ok(())
    }

    fn add_global_tag(&mut self, key: &str, value: &str) {
        self.tags.set(key, value);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::backend::BackendVersion;
    use crate::backends::testing::MemoryTransport;
    use crate::transport::TransportError;

    fn backend(transport: MemoryTransport) -> InfluxBackend {
        InfluxBackend::new(
            BackendInfo::new(
                "influxdb",
                BackendVersion::new(1, 0, 0),
                "tests",
                "https://docs.influxdata.com/influxdb/",
            ),
            Box::new(transport),
        )
    }

    fn at_seconds(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn encodes_single_metric_with_tags() {
        let transport = MemoryTransport::default();
        let mut backend = backend(transport.clone());
        backend.add_global_tag("hostname", "node-1");

        backend
            .send(&Metric::new(10, "cpuLoad").set_timestamp(at_seconds(1)))
            .expect("send");

        assert_eq!(transport.contents().as_str(), "cpuLoad,hostname=node-1 value=10i 1000000000\n");
    }

    #[test]
    fn encodes_every_value_kind() {
        let transport = MemoryTransport::default();
        let mut backend = backend(transport.clone());
        let ts = at_seconds(1_609_459_200);

        backend.send(&Metric::new(-42, "int").set_timestamp(ts)).expect("send");
        backend.send(&Metric::new(42u64, "uint").set_timestamp(ts)).expect("send");
        backend.send(&Metric::new(2.5, "float").set_timestamp(ts)).expect("send");
        backend
            .send(&Metric::new("hello world", "text").set_timestamp(ts))
            .expect("send");

        let result = transport.contents();
        assert!(result.contains("int value=-42i 1609459200000000000"));
        assert!(result.contains("uint value=42u 1609459200000000000"));
        assert!(result.contains("float value=2.5 1609459200000000000"));
        assert!(result.contains("text value=\"hello world\" 1609459200000000000"));
        assert_eq!(result.lines().count(), 4);
    }

    #[test]
    fn metric_tags_are_escaped_and_override_globals() {
        let transport = MemoryTransport::default();
        let mut backend = backend(transport.clone());
        backend.add_global_tag("name", "agent");
        backend
            .send(&Metric::new(1, "m").with_tag("name", "my worker"))
            .expect("send");

        let result = transport.contents();
        assert!(result.starts_with("m,name=my\\ worker value=1i"));
        assert!(!result.contains("name=agent"));
    }

    #[test]
    fn batch_is_one_line_with_a_field_per_metric() {
        let transport = MemoryTransport::default();
        let mut backend = backend(transport.clone());
        backend.add_global_tag("hostname", "node-1");

        backend
            .send_multiple("process", &[
                Metric::new(12.5, "pmem"),
                Metric::new(3.0, "pcpu"),
                Metric::new(360u64, "etime"),
            ])
            .expect("send batch");

        let result = transport.contents();
        assert_eq!(result.lines().count(), 1);
        assert!(result.starts_with("process,hostname=node-1 pmem=12.5,pcpu=3,etime=360u "));
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let transport = MemoryTransport::default();
        let mut backend = backend(transport.clone());
        backend.send_multiple("process", &[]).expect("send batch");
        assert_eq!(transport.contents().as_str(), "");
    }

    #[test]
    fn empty_measurement_is_rejected() {
        let transport = MemoryTransport::default();
        let mut backend = backend(transport.clone());
        backend.add_global_tag("hostname", "node-1");

        let err = backend.send(&Metric::new(1, "")).expect_err("no measurement");
        assert!(matches!(err, BackendError::Encode { .. }));
        assert_eq!(transport.contents().as_str(), "");
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let transport = MemoryTransport::default();
        let mut backend = backend(transport.clone());

        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = backend.send(&Metric::new(value, "ratio")).expect_err("not finite");
            assert!(matches!(err, BackendError::Encode { .. }), "{value}");
        }
        let err = backend
            .send_multiple("process", &[Metric::new(1.0, "pcpu"), Metric::new(f64::NAN, "pmem")])
            .expect_err("not finite");
        assert!(matches!(err, BackendError::Encode { .. }));
        assert_eq!(transport.contents().as_str(), "");
    }

    #[test]
    fn empty_tags_are_skipped() {
        let transport = MemoryTransport::default();
        let mut backend = backend(transport.clone());
        backend.add_global_tag("hostname", "");
        backend.add_global_tag("name", "agent");

        backend
            .send(
                &Metric::new(1, "m")
                    .set_timestamp(at_seconds(1))
                    .with_tag("k", "")
                    .with_tag("", "v"),
            )
            .expect("send");

        assert_eq!(transport.contents().as_str(), "m,name=agent value=1i 1000000000\n");
    }

    #[test]
    fn batch_field_needs_a_name() {
        let transport = MemoryTransport::default();
        let mut backend = backend(transport.clone());
        let err = backend
            .send_multiple("process", &[Metric::new(1, "")])
            .expect_err("unnamed field");
        assert!(matches!(err, BackendError::Encode { .. }));
    }

    #[test]
    fn transport_failure_surfaces() {
        let transport = MemoryTransport {
            fail: true,
            ..Default::default()
        };
        let mut backend = backend(transport);
        let err = backend.send(&Metric::new(1, "m")).expect_err("broken transport");
        assert!(matches!(err, BackendError::Transport(TransportError::Send(_))));
    }
}
