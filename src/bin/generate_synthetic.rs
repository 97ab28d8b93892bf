//! Synthetic shipment network generator
//!
//! Builds a factory -> regional warehouse -> store network and simulates
//! milestone timestamps with the delay patterns seen in operations:
//! customs congestion on inbound lanes, promo-week pick/pack surges and
//! missed 18:00 dispatch cutoffs on store replenishment.
//!
//! Usage:
//!   cargo run --release --bin generate_synthetic -- [OPTIONS]
//!
//! Options:
//!   --start-date <DATE>          First simulated day (default: 2024-01-01)
//!   --weeks <N>                  Weeks to simulate (default: 26)
//!   --shipments-per-day <N>      Mean daily shipments (default: 120)
//!   --seed <N>                   Random seed for reproducibility (optional)
//!   --out-dir <PATH>             Output directory (default: data/raw)

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use clap::Parser;
use rand::prelude::*;
use rand::rngs::StdRng;
use supply_chain_analytics::ingest::{write_dataset, Dataset};
use supply_chain_analytics::logging;
use supply_chain_analytics::models::{
    Lane, LaneType, MilestoneEvent, MilestoneType, NodeType, Shipment, WeekKey,
};
use tracing::info;

/// Synthetic shipment and milestone generator
#[derive(Parser, Debug)]
#[command(name = "generate_synthetic")]
#[command(about = "Generate synthetic lanes, shipments and milestones")]
struct Args {
    /// First simulated day
    #[arg(long, default_value = "2024-01-01")]
    start_date: NaiveDate,

    /// Number of weeks to simulate
    #[arg(long, default_value = "26")]
    weeks: u32,

    /// Mean number of shipments per day
    #[arg(long, default_value = "120")]
    shipments_per_day: u32,

    /// Number of factories
    #[arg(long, default_value = "3")]
    factories: u32,

    /// Number of stores
    #[arg(long, default_value = "80")]
    stores: u32,

    /// Share of weeks running a promotion (0.0 - 1.0)
    #[arg(long, default_value = "0.18")]
    promo_ratio: f64,

    /// Probability that an intermediate milestone goes unrecorded
    #[arg(long, default_value = "0.01")]
    missing_rate: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory for lanes.csv, shipments.csv and milestones.csv
    #[arg(long, default_value = "data/raw")]
    out_dir: PathBuf,
}

/// Regional warehouse and the region it serves
const WAREHOUSES: [(&str, &str); 2] = [("W1", "EU"), ("W2", "US")];

/// Normal sample via Box-Muller
fn normal(rng: &mut impl Rng, mean: f64, sd: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    mean + sd * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// |N(mean, sd)| in minutes, clamped
fn minutes(rng: &mut impl Rng, mean: f64, sd: f64, lo: i64, hi: i64) -> Duration {
    let m = normal(rng, mean, sd).abs().round() as i64;
    Duration::minutes(m.clamp(lo, hi))
}

fn at(day: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    day.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default())
}

struct Network {
    lanes: Vec<Lane>,
    inbound: Vec<usize>,
    outbound: Vec<usize>,
}

fn build_network(args: &Args, rng: &mut impl Rng) -> Network {
    let mut lanes = Vec::new();
    let mut inbound = Vec::new();
    let mut outbound = Vec::new();

    for f in 1..=args.factories {
        for (wh, region) in WAREHOUSES {
            inbound.push(lanes.len());
            lanes.push(Lane {
                lane_id: format!("F{}-{}", f, wh),
                lane_type: LaneType::FactoryToWarehouse,
                origin_type: NodeType::Factory,
                origin_id: format!("F{}", f),
                destination_type: NodeType::Warehouse,
                destination_id: wh.to_string(),
                region: region.to_string(),
                mode: "AIR".to_string(),
                sla_days: 3.0,
            });
        }
    }

    for s in 1..=args.stores {
        let (wh, region) = if rng.gen_bool(0.52) { WAREHOUSES[0] } else { WAREHOUSES[1] };
        outbound.push(lanes.len());
        lanes.push(Lane {
            lane_id: format!("{}-S{:03}", wh, s),
            lane_type: LaneType::WarehouseToStore,
            origin_type: NodeType::Warehouse,
            origin_id: wh.to_string(),
            destination_type: NodeType::Store,
            destination_id: format!("S{:03}", s),
            region: region.to_string(),
            mode: "ROAD".to_string(),
            sla_days: 1.25,
        });
    }

    Network { lanes, inbound, outbound }
}

/// Factory -> warehouse: export clearance, flight, import clearance
fn inbound_milestones(lane: &Lane, planned: NaiveDateTime, rng: &mut impl Rng) -> (Vec<MilestoneEvent>, bool) {
    let congestion_rate = if lane.region == "EU" { 0.10 } else { 0.12 };
    let congested = rng.gen::<f64>() < congestion_rate;

    let release = planned + Duration::minutes(normal(rng, 0.0, 90.0).round() as i64);
    let export_done = release + minutes(rng, 60.0, 30.0, 0, 240) + minutes(rng, 360.0, 180.0, 60, 960);
    let departed = export_done + minutes(rng, 360.0, 120.0, 60, 960);
    let arrived = departed + minutes(rng, 660.0, 120.0, 360, 1080);
    let mut import_clearance = minutes(rng, 480.0, 240.0, 90, 1440);
    if congested {
        import_clearance = import_clearance + minutes(rng, 600.0, 240.0, 180, 1320);
    }
    let import_done = arrived + minutes(rng, 90.0, 60.0, 20, 300) + import_clearance;
    let received = import_done + minutes(rng, 240.0, 120.0, 60, 720);

    let events = vec![
        MilestoneEvent { milestone: MilestoneType::OrderRelease, timestamp: release },
        MilestoneEvent { milestone: MilestoneType::ExportClearance, timestamp: export_done },
        MilestoneEvent { milestone: MilestoneType::InTransit, timestamp: departed },
        MilestoneEvent { milestone: MilestoneType::ImportClearance, timestamp: import_done },
        MilestoneEvent { milestone: MilestoneType::WarehouseReceived, timestamp: received },
    ];
    (events, congested)
}

/// Warehouse -> store: pick, pack, dispatch against the 18:00 cutoff
fn outbound_milestones(planned: NaiveDateTime, promo: bool, rng: &mut impl Rng) -> (Vec<MilestoneEvent>, bool) {
    let surge = if promo { 1.7 } else { 1.0 };

    let pick_start = planned - minutes(rng, 140.0, 60.0, 30, 420);
    let pick_done = pick_start + Duration::minutes(((normal(rng, 45.0, 20.0).abs() * surge).round() as i64).clamp(10, 240));
    let pack_start = pick_done + minutes(rng, 20.0, 15.0, 0, 120);
    let pack_done = pack_start + Duration::minutes(((normal(rng, 55.0, 25.0).abs() * surge).round() as i64).clamp(10, 360));

    let cutoff = at(planned.date(), 18, 0);
    let missed_cutoff = pack_done > cutoff;
    let dispatched = if missed_cutoff {
        at(planned.date() + Duration::days(1), 9, rng.gen_range(0..60))
    } else {
        pack_done.max(planned) + minutes(rng, 30.0, 25.0, 0, 180)
    };
    let received = dispatched + minutes(rng, 1080.0, 360.0, 240, 2880);

    let events = vec![
        MilestoneEvent { milestone: MilestoneType::PickStart, timestamp: pick_start },
        MilestoneEvent { milestone: MilestoneType::PickComplete, timestamp: pick_done },
        MilestoneEvent { milestone: MilestoneType::PackComplete, timestamp: pack_done },
        MilestoneEvent { milestone: MilestoneType::Dispatch, timestamp: dispatched },
        MilestoneEvent { milestone: MilestoneType::StoreReceived, timestamp: received },
    ];
    (events, missed_cutoff)
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    println!("🔧 Synthetic Network Generator");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Start date:        {}", args.start_date);
    println!("Weeks:             {}", args.weeks);
    println!("Shipments per day: {}", args.shipments_per_day);
    println!("Factories/stores:  {}/{}", args.factories, args.stores);
    println!("Promo ratio:       {:.1}%", args.promo_ratio * 100.0);
    println!("Missing rate:      {:.1}%", args.missing_rate * 100.0);
    println!("Output dir:        {}", args.out_dir.display());
    if let Some(seed) = args.seed {
        println!("Random seed:       {}", seed);
    }
    println!();

    let mut rng: StdRng = match args.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let network = build_network(&args, &mut rng);

    let first_week = WeekKey::of(&at(args.start_date, 0, 0));
    let mut weeks = vec![first_week];
    while weeks.len() < args.weeks as usize {
        match weeks.last().and_then(|w| w.next()) {
            Some(w) => weeks.push(w),
            None => break,
        }
    }
    let promo_count = ((weeks.len() as f64 * args.promo_ratio).round() as usize).min(weeks.len());
    let promo_weeks: HashSet<WeekKey> = weeks.choose_multiple(&mut rng, promo_count).copied().collect();

    println!("🏭 Simulating shipments...");
    let mut shipments = Vec::new();
    let (mut congested, mut missed_cutoffs, mut dropped) = (0usize, 0usize, 0usize);
    let days = i64::from(args.weeks) * 7;
    for d in 0..days {
        let day = args.start_date + Duration::days(d);
        let promo = promo_weeks.contains(&WeekKey::of(&at(day, 12, 0)));
        let mean = f64::from(args.shipments_per_day);
        let n = (normal(&mut rng, mean, mean * 0.12).round() as i64).max(30);

        for _ in 0..n {
            let inbound = rng.gen_bool(0.38);
            let (lane_idx, planned) = if inbound {
                let lane = *network.inbound.choose(&mut rng).context("network has no inbound lanes")?;
                (lane, at(day, rng.gen_range(6..14), rng.gen_range(0..60)))
            } else {
                let lane = *network.outbound.choose(&mut rng).context("network has no stores")?;
                (lane, at(day, rng.gen_range(8..18), rng.gen_range(0..60)))
            };
            let lane = &network.lanes[lane_idx];

            let (mut events, flagged) = match lane.lane_type {
                LaneType::FactoryToWarehouse => inbound_milestones(lane, planned, &mut rng),
                LaneType::WarehouseToStore => outbound_milestones(planned, promo, &mut rng),
            };
            match lane.lane_type {
                LaneType::FactoryToWarehouse if flagged => congested += 1,
                LaneType::WarehouseToStore if flagged => missed_cutoffs += 1,
                _ => {}
            }

            if rng.gen::<f64>() < args.missing_rate {
                let idx = rng.gen_range(1..events.len() - 1);
                events.remove(idx);
                dropped += 1;
            }

            shipments.push(Shipment {
                shipment_id: format!("SH{:07}", shipments.len() + 1),
                lane_id: lane.lane_id.clone(),
                sku_id: format!("SKU{:04}", rng.gen_range(1..=250)),
                planned_ship: planned,
                milestones: events,
            });
        }

        if (d + 1) % 28 == 0 {
            println!("   Simulated {}/{} days...", d + 1, days);
        }
    }

    let dataset = Dataset {
        lanes: network.lanes,
        shipments,
        ..Dataset::default()
    };
    write_dataset(&args.out_dir, &dataset)?;
    info!(
        shipments = dataset.shipments.len(),
        promo_weeks = promo_weeks.len(),
        "Synthetic dataset written"
    );

    println!("\n✅ Generation complete!");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Lanes:              {:>8}", dataset.lanes.len());
    println!("Shipments:          {:>8}", dataset.shipments.len());
    println!("Customs congestion: {:>8}", congested);
    println!("Missed cutoffs:     {:>8}", missed_cutoffs);
    println!("Missing milestones: {:>8}", dropped);
    let mut promo: Vec<String> = promo_weeks.iter().map(|w| w.to_string()).collect();
    promo.sort();
    println!("Promo weeks:        {}", promo.join(", "));

    Ok(())
}
