use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use monitoring::DerivedMetricMode;
use monitoring::MetricValue;
use utils::version;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[arg(
        long,
        env = "MONITORING_BACKENDS",
        default_value = "log://",
        help = "Comma separated backend urls, e.g. log://,influxdb://localhost:8089"
    )]
    pub backends: String,

    #[arg(
        long = "derived",
        value_name = "NAME=MODE",
        value_parser = parse_derived,
        help = "Derive a metric from NAME, MODE is rate or average. May be repeated"
    )]
    pub derived: Vec<(String, DerivedMetricMode)>,

    #[arg(
        long,
        env = "MONITORING_PROCESS_INTERVAL",
        value_name = "SECONDS",
        help = "Publish process and network statistics every SECONDS"
    )]
    pub process_monitoring: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a single metric
    Send(SendArgs),
    /// Keep the agent alive so the process monitor can publish
    Watch(WatchArgs),
}

#[derive(Parser)]
pub struct SendArgs {
    #[arg(long, help = "Metric name")]
    pub name: String,

    #[arg(long, allow_hyphen_values = true, help = "Metric value")]
    pub value: String,

    #[arg(long = "type", value_enum, default_value_t = ValueKind::Int, help = "How to interpret the value")]
    pub kind: ValueKind,
}

#[derive(Parser)]
pub struct WatchArgs {
    #[arg(long, default_value_t = 60, help = "How long to keep running")]
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ValueKind {
    Int,
    Double,
    Uint,
    String,
}

impl ValueKind {
    pub fn parse(self, raw: &str) -> anyhow::Result<MetricValue> {
        let value = match self {
            ValueKind::Int => MetricValue::Int(raw.parse()?),
            ValueKind::Double => MetricValue::Double(raw.parse()?),
            ValueKind::Uint => MetricValue::UInt64(raw.parse()?),
            ValueKind::String => MetricValue::String(raw.to_string()),
        };
        Ok(value)
    }
}

fn parse_derived(raw: &str) -> Result<(String, DerivedMetricMode), String> {
    let (name, mode) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=MODE, got `{raw}`"))?;
    if name.is_empty() {
        return Err(format!("missing metric name in `{raw}`"));
    }
    let mode = mode.parse::<DerivedMetricMode>().map_err(|e| e.to_string())?;
    Ok((name.to_string(), mode))
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn parses_derived_pairs() {
        assert_eq!(
            parse_derived("cpuLoad=rate"),
            Ok(("cpuLoad".to_string(), DerivedMetricMode::Rate))
        );
        assert!(parse_derived("cpuLoad").is_err());
        assert!(parse_derived("=rate").is_err());
        assert!(parse_derived("cpuLoad=median").is_err());
    }

    #[test]
    fn value_kinds() {
        assert_eq!(ValueKind::Int.parse("-3").expect("int"), MetricValue::Int(-3));
        assert_eq!(ValueKind::Uint.parse("7").expect("uint"), MetricValue::UInt64(7));
        assert_eq!(ValueKind::Double.parse("0.5").expect("double"), MetricValue::Double(0.5));
        assert!(ValueKind::Uint.parse("-1").is_err());
    }

    #[test]
    fn cli_parses_repeated_derived_flags() {
        let cli = Cli::try_parse_from([
            "monitoring-agent",
            "--backends",
            "log://",
            "--derived",
            "a=rate",
            "--derived",
            "b=average",
            "send",
            "--name",
            "a",
            "--value",
            "1",
        ])
        .expect("valid command line");

        assert_eq!(cli.derived, vec![
            ("a".to_string(), DerivedMetricMode::Rate),
            ("b".to_string(), DerivedMetricMode::Average),
        ]);
        assert!(matches!(cli.command, Commands::Send(ref args) if args.kind == ValueKind::Int));
    }
}
