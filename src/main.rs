// src/main.rs - plotter host entry point
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use vplotter_rs::{load_config, Config, IdleServoPort, Plotter, WebLog, WebLogLayer};

#[derive(Parser, Debug)]
#[command(name = "plotter-host", about = "V-plotter motion core host")]
struct Args {
    /// TOML configuration file
    #[arg(long, default_value = "plotter.toml")]
    config: PathBuf,

    /// Command file to run (overrides the configured path)
    #[arg(long)]
    commands: Option<PathBuf>,

    /// Skip this many command lines before starting
    #[arg(long, default_value_t = 0)]
    start_line: usize,

    /// Parse and plan the whole job without moving
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    let weblog = WebLog::new();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(WebLogLayer::new(weblog.clone()))
        .init();

    tracing::info!("starting plotter host");

    let mut config = if args.config.exists() {
        load_config(&args.config).inspect_err(|e| {
            tracing::error!(error = %e, path = %args.config.display(), "failed to load config");
        })?
    } else {
        tracing::warn!(path = %args.config.display(), "config file missing, using defaults");
        Config::default()
    };
    if let Some(commands) = args.commands {
        config.runner.commands_path = commands;
    }

    let top_distance = config.rig.top_distance_mm;
    if top_distance <= 0 {
        tracing::error!("rig.top_distance_mm is not configured, refusing to move");
        return Err("rig is not calibrated".into());
    }

    let mut plotter = Plotter::new(config, Box::new(IdleServoPort));
    // the host assumes the sled was parked at the home pose
    plotter.resume_top_distance(top_distance)?;

    if args.dry_run {
        plotter.dry_run(args.start_line)?;
        let runner = plotter.runner();
        tracing::info!(
            total_mm = runner.total_distance(),
            "dry run ok, job is executable"
        );
        return Ok(());
    }

    plotter.start_job(args.start_line)?;

    let mut interval = tokio::time::interval(Duration::from_millis(1));
    let mut last = Instant::now();
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                plotter.tick((now - last).as_secs_f64());
                last = now;
                if plotter.runner().is_stopped() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupt received, aborting job");
                plotter.abort_job();
            }
        }
    }

    let status = plotter.status();
    tracing::info!(
        progress = status.progress,
        x = status.x,
        y = status.y,
        logged_events = weblog.last_seq(),
        "job finished"
    );
    Ok(())
}
