//! Predictive Analytics - What will happen?
//! Weekly warehouse workload history, moving-average forecast, delay risk buffers
//!
//! Run: ./target/release/analytics_predictive [section] [--window N] [--horizon N] [--out FILE]
//! Sections: all, history, forecast, risk

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use supply_chain_analytics::attribution::AttributionEngine;
use supply_chain_analytics::config::AnalyticsConfig;
use supply_chain_analytics::forecast::{weekly_workload, MovingAverageForecaster, WorkloadForecast};
use supply_chain_analytics::ingest::{load_dataset, write_forecast, Dataset};
use supply_chain_analytics::logging;
use supply_chain_analytics::models::GroupBy;
use supply_chain_analytics::pipeline::staffing_requests;
use supply_chain_analytics::ranking::rank_drivers;

#[derive(Parser, Debug)]
#[command(name = "analytics_predictive")]
#[command(about = "Forecast weekly warehouse workload and its delay risk buffer")]
struct Args {
    /// Section to print: all, history, forecast, risk
    #[arg(default_value = "all")]
    section: String,

    #[arg(long, default_value = "data/raw")]
    data_dir: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Moving-average window in weeks
    #[arg(long, default_value = "4")]
    window: usize,

    /// Weeks to forecast past the last observed week
    #[arg(long, default_value = "2")]
    horizon: usize,

    /// Write the forecast as CSV for the prescriptive run
    #[arg(long)]
    out: Option<PathBuf>,

    /// History weeks shown per region
    #[arg(long, default_value = "8")]
    weeks: usize,
}

fn print_section_header(title: &str) {
    println!("\n{}", "═".repeat(85));
    println!("  {}", title);
    println!("{}\n", "═".repeat(85));
}

fn print_subsection(title: &str) {
    println!("\n{}", title);
    println!("{}", "─".repeat(75));
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let config = AnalyticsConfig::load_or_default(args.config.as_ref())?;
    let data = load_dataset(&args.data_dir)?;
    let forecaster = MovingAverageForecaster {
        window: args.window,
        horizon: args.horizon,
    };
    let forecast = forecaster.forecast(&data.shipments, &data.lanes);

    println!("\n{}", "█".repeat(85));
    println!("{}  PREDICTIVE ANALYTICS - What Will Happen?  {}", "█".repeat(18), "█".repeat(19));
    println!("{}\n", "█".repeat(85));

    match args.section.as_str() {
        "all" => {
            run_history_section(&data, args.weeks);
            run_forecast_section(&forecast, &forecaster);
            run_risk_section(&config, &data, &forecast);
        }
        "history" => run_history_section(&data, args.weeks),
        "forecast" => run_forecast_section(&forecast, &forecaster),
        "risk" => run_risk_section(&config, &data, &forecast),
        other => {
            println!("Unknown section: {}", other);
            println!("Available: all, history, forecast, risk");
        }
    }

    if let Some(out) = &args.out {
        write_forecast(out, &forecast)?;
        println!("\n  Forecast written to {}", out.display());
    }

    println!("\n{}", "█".repeat(85));
    Ok(())
}

fn run_history_section(data: &Dataset, weeks: usize) {
    print_section_header("1. WEEKLY WAREHOUSE WORKLOAD (outbound shipments by planned week)");

    for (region, series) in weekly_workload(&data.shipments, &data.lanes) {
        let values: Vec<f64> = series.values().copied().collect();
        let mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
        let peak = values.iter().copied().fold(0.0, f64::max);

        print_subsection(&format!(
            "Region {} ({} weeks, mean {:.1}, peak {:.0})",
            region,
            values.len(),
            mean,
            peak
        ));
        println!("  {:10} {:>10} {:>10}   {}", "Week", "Units", "vs Mean", "Trend");
        println!("  {}", "─".repeat(70));

        let skip = series.len().saturating_sub(weeks);
        for (week, units) in series.iter().skip(skip) {
            let delta = if mean > 0.0 { (units - mean) / mean * 100.0 } else { 0.0 };
            let bar_len = if peak > 0.0 { (units / peak * 30.0).round() as usize } else { 0 };
            println!(
                "  {:10} {:>10.0} {:>9.1}%   {}",
                week.to_string(),
                units,
                delta,
                "▇".repeat(bar_len)
            );
        }
    }
}

fn run_forecast_section(forecast: &WorkloadForecast, forecaster: &MovingAverageForecaster) {
    print_section_header(&format!(
        "2. WORKLOAD FORECAST ({}-week moving average, {} week horizon)",
        forecaster.window, forecaster.horizon
    ));

    if forecast.is_empty() {
        println!("  No warehouse-to-store history to forecast from");
        return;
    }

    println!("  {:8} {:10} {:>12} {:>12}", "Region", "Week", "Forecast", "Hold-out MAPE");
    println!("  {}", "─".repeat(50));
    for (region, week, entry) in forecast.iter() {
        let mape = entry
            .mape
            .map(|m| format!("{:.1}%", m * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        println!("  {:8} {:10} {:>12.1} {:>12}", region, week.to_string(), entry.forecast_units, mape);
    }
}

fn run_risk_section(config: &AnalyticsConfig, data: &Dataset, forecast: &WorkloadForecast) {
    print_section_header("3. DELAY RISK BUFFER ON FORECAST WEEKS");

    let engine = AttributionEngine::new(&config.attribution, &data.lanes);
    let batch = engine.attribute_all(&data.shipments);
    let regions = rank_drivers(&batch.attributions, GroupBy::Region);
    let (assessments, requests) = staffing_requests(&config.risk, &regions, forecast);

    println!(
        "  Signal: {:?} of {} per shipment",
        config.risk.statistic,
        config
            .risk
            .buckets
            .iter()
            .map(|b| b.as_str())
            .collect::<Vec<_>>()
            .join(" + ")
    );
    println!();
    println!(
        "  {:8} {:10} {:>12} {:>12} {:>8} {:>12} {:>12}",
        "Region", "Week", "Source Week", "Signal (d)", "Factor", "Forecast", "Buffered"
    );
    println!("  {}", "─".repeat(82));
    for (a, r) in assessments.iter().zip(&requests) {
        let source = a.source_week.map(|w| w.to_string()).unwrap_or_else(|| "none".to_string());
        println!(
            "  {:8} {:10} {:>12} {:>12.3} {:>8.2} {:>12.1} {:>12.1}",
            a.region,
            a.week.to_string(),
            source,
            a.signal_days,
            a.factor,
            r.forecast_units,
            r.forecast_units * r.risk_adjustment
        );
    }
}
