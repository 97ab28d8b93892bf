//! Diagnostic Analytics - Why is it happening?
//! Delay root-cause attribution, lane and region driver rankings, data-quality exceptions
//!
//! Run: ./target/release/analytics_diagnostic [section] [--data-dir DIR] [--config FILE]
//! Sections: all, buckets, lanes, regions, failures

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use supply_chain_analytics::attribution::{AttributionBatch, AttributionEngine};
use supply_chain_analytics::config::AnalyticsConfig;
use supply_chain_analytics::ingest::load_dataset;
use supply_chain_analytics::logging;
use supply_chain_analytics::models::{DelayBucket, DriverRanking, GroupBy, LaneType};
use supply_chain_analytics::ranking::rank_drivers;

#[derive(Parser, Debug)]
#[command(name = "analytics_diagnostic")]
#[command(about = "Explain historical delivery delays by causal bucket")]
struct Args {
    /// Section to print: all, buckets, lanes, regions, failures
    #[arg(default_value = "all")]
    section: String,

    /// Directory holding lanes.csv, shipments.csv and milestones.csv
    #[arg(long, default_value = "data/raw")]
    data_dir: PathBuf,

    /// TOML configuration (built-in defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rows per table
    #[arg(long, default_value = "10")]
    top: usize,
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
    let engine = AttributionEngine::new(&config.attribution, &data.lanes);
    let mut batch = engine.attribute_all(&data.shipments);
    // Rows rejected at load are exceptions too
    batch.failures.extend(data.rejected.iter().cloned());
    batch.failures.sort_by(|a, b| a.shipment_id.cmp(&b.shipment_id));

    println!("\n{}", "█".repeat(85));
    println!("{}  DIAGNOSTIC ANALYTICS - Why is it Happening?  {}", "█".repeat(17), "█".repeat(18));
    println!("{}\n", "█".repeat(85));

    let summary = batch.summary();
    let late = batch.attributions.iter().filter(|a| a.total_delay_days > 0.0).count();
    let avg_delay = if batch.attributions.is_empty() {
        0.0
    } else {
        batch.attributions.iter().map(|a| a.total_delay_days).sum::<f64>() / batch.attributions.len() as f64
    };
    println!(
        "  Attributed: {} shipments ({} delivered, {} failed), Late Rate = {:.1}%, Avg Delay = {:.2} days\n",
        summary.attributed,
        summary.delivered,
        summary.failed,
        late as f64 * 100.0 / summary.attributed.max(1) as f64,
        avg_delay
    );

    match args.section.as_str() {
        "all" => {
            run_bucket_section(&batch);
            run_lane_section(&batch, args.top);
            run_region_section(&batch, args.top);
            run_failure_section(&batch, args.top);
        }
        "buckets" => run_bucket_section(&batch),
        "lanes" => run_lane_section(&batch, args.top),
        "regions" => run_region_section(&batch, args.top),
        "failures" => run_failure_section(&batch, args.top),
        other => {
            println!("Unknown section: {}", other);
            println!("Available: all, buckets, lanes, regions, failures");
        }
    }

    println!("\n{}", "█".repeat(85));
    Ok(())
}

fn run_bucket_section(batch: &AttributionBatch) {
    print_section_header("1. DELAY DECOMPOSITION BY BUCKET");

    for lane_type in LaneType::ALL {
        let rows: Vec<_> = batch.attributions.iter().filter(|a| a.lane_type == lane_type).collect();
        if rows.is_empty() {
            continue;
        }
        print_subsection(&format!("{} lanes ({} shipments)", lane_type, rows.len()));

        let total_delay: f64 = rows.iter().map(|a| a.total_delay_days).sum();
        println!("  {:22} {:>12} {:>12} {:>10} {:>10}", "Bucket", "Total (d)", "Mean (d)", "Share", "Hit Rate");
        println!("  {}", "─".repeat(70));
        for bucket in DelayBucket::ALL {
            let values: Vec<f64> = rows.iter().filter_map(|a| a.buckets.get(&bucket).copied()).collect();
            if values.is_empty() {
                continue;
            }
            let total: f64 = values.iter().sum();
            let hits = values.iter().filter(|v| **v > 0.0).count();
            let share = if total_delay.abs() > f64::EPSILON { total / total_delay * 100.0 } else { 0.0 };
            println!(
                "  {:22} {:>12.2} {:>12.3} {:>9.1}% {:>9.1}%",
                bucket.as_str(),
                total,
                total / rows.len() as f64,
                share,
                hits as f64 * 100.0 / rows.len() as f64
            );
        }
        println!("  {}", "─".repeat(70));
        println!("  {:22} {:>12.2} {:>12.3}", "total_delay", total_delay, total_delay / rows.len() as f64);
    }
}

/// Sum each ranking's drivers over all weeks, keyed by lane or region
fn collapse_weeks(rankings: &[DriverRanking]) -> BTreeMap<&str, (usize, BTreeMap<DelayBucket, f64>)> {
    let mut out: BTreeMap<&str, (usize, BTreeMap<DelayBucket, f64>)> = BTreeMap::new();
    for r in rankings {
        let entry = out.entry(r.key.as_str()).or_default();
        entry.0 += r.shipments;
        for d in &r.drivers {
            *entry.1.entry(d.bucket).or_insert(0.0) += d.total_delay_days;
        }
    }
    out
}

fn top_drivers(totals: &BTreeMap<DelayBucket, f64>, n: usize) -> String {
    let mut drivers: Vec<(DelayBucket, f64)> = totals.iter().map(|(b, v)| (*b, *v)).collect();
    drivers.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then(a.0.cmp(&b.0)));
    drivers
        .iter()
        .take(n)
        .map(|(b, v)| format!("{} {:+.2}", b, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn run_lane_section(batch: &AttributionBatch, top: usize) {
    print_section_header("2. LANE DIAGNOSTICS");

    let rankings = rank_drivers(&batch.attributions, GroupBy::Lane);
    let by_lane = collapse_weeks(&rankings);

    let mut lanes: Vec<(&str, usize, f64, &BTreeMap<DelayBucket, f64>)> = by_lane
        .iter()
        .map(|(lane, (n, totals))| (*lane, *n, totals.values().sum::<f64>(), totals))
        .collect();
    lanes.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(b.0)));

    print_subsection(&format!("Top {} lanes by accumulated delay (delivered shipments)", top));
    println!("  {:12} {:>8} {:>11} {:>10}   {}", "Lane", "Volume", "Delay (d)", "Avg (d)", "Top Drivers");
    println!("  {}", "─".repeat(95));
    for (lane, n, total, totals) in lanes.iter().take(top) {
        println!(
            "  {:12} {:>8} {:>11.2} {:>10.3}   {}",
            lane,
            n,
            total,
            total / (*n).max(1) as f64,
            top_drivers(totals, 3)
        );
    }
}

fn run_region_section(batch: &AttributionBatch, top: usize) {
    print_section_header("3. REGIONAL DRIVER RANKING BY WEEK");

    let rankings = rank_drivers(&batch.attributions, GroupBy::Region);
    let mut regions: Vec<&str> = rankings.iter().map(|r| r.key.as_str()).collect();
    regions.dedup();

    for region in regions {
        print_subsection(&format!("Region {} (latest {} weeks)", region, top));
        println!("  {:10} {:>8}   {:30} {:30}", "Week", "Volume", "#1 Driver", "#2 Driver");
        println!("  {}", "─".repeat(85));

        let weeks: Vec<&DriverRanking> = rankings.iter().filter(|r| r.key == region).collect();
        for r in weeks.iter().rev().take(top).rev() {
            let cell = |i: usize| {
                r.drivers
                    .get(i)
                    .map(|d| format!("{} ({:+.3}d avg)", d.bucket, d.mean_delay_days))
                    .unwrap_or_default()
            };
            println!("  {:10} {:>8}   {:30} {:30}", r.week.to_string(), r.shipments, cell(0), cell(1));
        }
    }
}

fn run_failure_section(batch: &AttributionBatch, top: usize) {
    print_section_header("4. DATA QUALITY EXCEPTIONS");

    let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
    for f in &batch.failures {
        *by_kind.entry(f.error.kind()).or_insert(0) += 1;
    }
    let partial = batch.attributions.iter().filter(|a| !a.missing_milestones.is_empty()).count();

    print_subsection("Shipments excluded from attribution");
    println!("  {:28} {:>10}", "Reason", "Shipments");
    println!("  {}", "─".repeat(40));
    for (kind, n) in &by_kind {
        println!("  {:28} {:>10}", kind, n);
    }
    println!("  {:28} {:>10}", "(attributed, gaps unexplained)", partial);

    if !batch.failures.is_empty() {
        print_subsection(&format!("First {} exceptions", top));
        for f in batch.failures.iter().take(top) {
            println!("  {}", f.error);
        }
    }
}
