use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use supply_chain_analytics::config::AnalyticsConfig;
use supply_chain_analytics::forecast::MovingAverageForecaster;
use supply_chain_analytics::ingest::{load_dataset, load_forecast, write_report};
use supply_chain_analytics::logging;
use supply_chain_analytics::pipeline::Pipeline;
use tracing::info;

/// Attribute delays, rank drivers and plan staffing in one run
#[derive(Parser, Debug)]
#[command(name = "supply_chain_analytics")]
#[command(about = "Delay attribution and risk-adjusted staffing pipeline")]
struct Args {
    /// TOML configuration; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding lanes.csv, shipments.csv and milestones.csv
    #[arg(short, long, default_value = "data/raw")]
    data_dir: PathBuf,

    /// Forecast CSV; a moving-average baseline is fitted when omitted
    #[arg(short, long)]
    forecast: Option<PathBuf>,

    /// Output directory for drivers, staffing plan, failures and report.json
    #[arg(short, long, default_value = "reports/outputs")]
    out_dir: PathBuf,

    /// Baseline moving-average window in weeks
    #[arg(long, default_value = "4")]
    window: usize,

    /// Baseline forecast horizon in weeks
    #[arg(long, default_value = "2")]
    horizon: usize,
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let config = AnalyticsConfig::load_or_default(args.config.as_ref())?;
    let data = load_dataset(&args.data_dir)?;
    let forecast = args.forecast.as_deref().map(load_forecast).transpose()?;

    let report = Pipeline::new(&config)
        .with_forecaster(MovingAverageForecaster {
            window: args.window,
            horizon: args.horizon,
        })
        .run(&data, forecast.as_ref())?;

    write_report(&args.out_dir, &report)?;

    let planned = report.planned().count();
    info!(
        attributed = report.attributed,
        failed = report.failures.len(),
        driver_groups = report.drivers.len(),
        planned,
        unplanned = report.plans.len() - planned,
        "Done"
    );
    Ok(())
}
