use std::path::PathBuf;

use abcc::runtime::config::load_daemon_config;
use abcc::runtime::daemon::ChooserDaemon;
use abcc::runtime::probe::PingProber;
use abcc::runtime::routing::LinuxIpRouteControl;
use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "abccd")]
#[command(about = "Automatic best connection chooser for multi-uplink hosts")]
struct Args {
    #[arg(long)]
    config: PathBuf,
    #[arg(long, default_value = "INFO")]
    log_level: String,
    /// Log intended route changes without touching the routing table.
    #[arg(long)]
    dry_run: bool,
    /// Run a single evaluation pass and print the report as JSON.
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let cfg = load_daemon_config(&args.config)?;
    let prober = Box::new(PingProber::new());
    let routes = Box::new(LinuxIpRouteControl::new(args.dry_run));
    let mut daemon = ChooserDaemon::new(cfg, prober, routes, args.dry_run);

    if args.once {
        let report = daemon.run_pass()?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    daemon.run_forever()?;
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let level = level.parse::<Level>()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .init();
    Ok(())
}
