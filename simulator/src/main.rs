use anyhow::Context;
use clap::Parser;
use status::bridge::StatusBridge;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod status;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Spectrum anomaly detection and correlation driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Override the number of sweeps to run
    #[arg(long)]
    sweeps: Option<usize>,
    #[arg(long, default_value_t = 2400.0)]
    start_mhz: f64,
    #[arg(long, default_value_t = 2500.0)]
    stop_mhz: f64,
    #[arg(long, default_value_t = 5.0)]
    step_mhz: f64,
    /// Persist the baseline here and resume from it on the next run
    #[arg(long)]
    baseline: Option<PathBuf>,
    /// Keep the status endpoint alive after the run
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long)]
    bind: Option<SocketAddr>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.start_mhz, args.stop_mhz, args.step_mhz, 40)
    };
    if let Some(sweeps) = args.sweeps {
        workflow_config.sweeps = sweeps;
    }
    if args.baseline.is_some() {
        workflow_config.baseline_path = args.baseline.clone();
    }
    if args.bind.is_some() {
        workflow_config.bind = args.bind;
    }

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating correlation runtime")?;

    let bridge = StatusBridge::new();
    let bind = workflow_config
        .bind
        .or_else(|| args.serve.then(|| SocketAddr::from(([127, 0, 0, 1], 9000))));
    if let Some(addr) = bind {
        bridge.serve(addr, runtime.handle());
    }

    let runner = Runner::new(workflow_config);
    let result = runner.execute(runtime.handle(), Some(&bridge))?;

    println!(
        "Run complete -> sweeps {}, detection events {}, correlations {}, still tracked {}, resets {}",
        result.sweeps,
        result.detections.len(),
        result.correlations.len(),
        result.tracked.len(),
        result.session_resets
    );
    for tracked in &result.tracked {
        println!(
            "  {:.3} - {:.3} MHz | delta {:+.1} dB | seen {}x | {}",
            tracked.range.start_hz / 1e6,
            tracked.range.end_hz / 1e6,
            tracked.delta_db(),
            tracked.count,
            tracked
                .label
                .map(|label| label.to_string())
                .unwrap_or_else(|| "unclassified".into())
        );
    }
    println!("{}", serde_json::to_string(&result.metrics)?);

    if args.serve {
        println!("Status endpoint running (Ctrl+C to stop)...");
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    // A stalled aux receiver may still be blocked inside a measurement.
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}
