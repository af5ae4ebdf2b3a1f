mod config;

use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use monitoring::Collector;
use monitoring::Metric;
use monitoring::MonitoringFactory;
use utils::version;

use crate::config::Cli;
use crate::config::Commands;
use crate::config::SendArgs;
use crate::config::WatchArgs;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    utils::logging::init();

    tracing::info!("Starting monitoring agent {}", &**version::VERSION);

    let mut collector = MonitoringFactory::get(&cli.backends)
        .with_context(|| format!("failed to set up backends `{}`", cli.backends))?;
    for (name, mode) in cli.derived {
        collector.add_derived_metric(name, mode);
    }
    if let Some(interval) = cli.process_monitoring {
        collector.enable_process_monitoring(interval);
    }

    let result = match cli.command {
        Commands::Send(args) => run_send(&collector, args),
        Commands::Watch(args) => run_watch(&collector, args),
    };

    collector.shutdown();
    result
}

fn run_send(collector: &Collector, args: SendArgs) -> Result<()> {
    let value = args
        .kind
        .parse(&args.value)
        .with_context(|| format!("`{}` is not a valid {:?} value", args.value, args.kind))?;
    collector
        .send(Metric::new(value, args.name))
        .context("failed to send metric")?;
    Ok(())
}

fn run_watch(collector: &Collector, args: WatchArgs) -> Result<()> {
    tracing::info!(
        "watching for {}s, process monitor is {}",
        args.duration_secs,
        collector.monitor_state()
    );
    std::thread::sleep(Duration::from_secs(args.duration_secs));
    Ok(())
}
