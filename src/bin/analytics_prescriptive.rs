//! Prescriptive Analytics - What should we do?
//! Minimum-cost weekly staffing plans, binding constraints, infeasible weeks, risk sensitivity
//!
//! Run: ./target/release/analytics_prescriptive [section] [--forecast FILE] [--config FILE]
//! Sections: all, plans, constraints, exceptions, sensitivity

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use supply_chain_analytics::config::AnalyticsConfig;
use supply_chain_analytics::forecast::MovingAverageForecaster;
use supply_chain_analytics::ingest::{load_dataset, load_forecast};
use supply_chain_analytics::logging;
use supply_chain_analytics::models::PlanConstraint;
use supply_chain_analytics::pipeline::Pipeline;
use supply_chain_analytics::report::AnalyticsReport;
use supply_chain_analytics::staffing::{optimize, StaffingRequest};

#[derive(Parser, Debug)]
#[command(name = "analytics_prescriptive")]
#[command(about = "Plan minimum-cost warehouse staffing per region and week")]
struct Args {
    /// Section to print: all, plans, constraints, exceptions, sensitivity
    #[arg(default_value = "all")]
    section: String,

    #[arg(long, default_value = "data/raw")]
    data_dir: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Forecast CSV (region, week, forecast_units); baseline forecast when omitted
    #[arg(long)]
    forecast: Option<PathBuf>,

    #[arg(long, default_value = "4")]
    window: usize,

    #[arg(long, default_value = "2")]
    horizon: usize,
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
    let forecast = args.forecast.as_deref().map(load_forecast).transpose()?;

    let report = Pipeline::new(&config)
        .with_forecaster(MovingAverageForecaster {
            window: args.window,
            horizon: args.horizon,
        })
        .run(&data, forecast.as_ref())?;

    println!("\n{}", "█".repeat(85));
    println!("{}  PRESCRIPTIVE ANALYTICS - What Should We Do?  {}", "█".repeat(17), "█".repeat(18));
    println!("{}\n", "█".repeat(85));

    match args.section.as_str() {
        "all" => {
            run_plan_section(&report);
            run_constraint_section(&report);
            run_exception_section(&report);
            run_sensitivity_section(&config, &report);
        }
        "plans" => run_plan_section(&report),
        "constraints" => run_constraint_section(&report),
        "exceptions" => run_exception_section(&report),
        "sensitivity" => run_sensitivity_section(&config, &report),
        other => {
            println!("Unknown section: {}", other);
            println!("Available: all, plans, constraints, exceptions, sensitivity");
        }
    }

    println!("\n{}", "█".repeat(85));
    Ok(())
}

fn run_plan_section(report: &AnalyticsReport) {
    print_section_header("1. MINIMUM-COST STAFFING PLANS");

    println!(
        "  {:6} {:10} {:>9} {:>7} {:>10} {:>5} {:>5} {:>8} {:>10} {:>11}",
        "Region", "Week", "Forecast", "Risk", "Required", "FT", "PT", "OT (h)", "Capacity", "Cost"
    );
    println!("  {}", "─".repeat(92));

    let mut total_cost = 0.0;
    for plan in report.planned() {
        total_cost += plan.total_cost;
        println!(
            "  {:6} {:10} {:>9.1} {:>7.3} {:>10.1} {:>5} {:>5} {:>8.1} {:>10.1} {:>11.2}",
            plan.region,
            plan.week.to_string(),
            plan.forecast_units,
            plan.risk_adjustment,
            plan.required_capacity,
            plan.full_time,
            plan.part_time,
            plan.overtime_hours,
            plan.total_capacity,
            plan.total_cost
        );
    }
    println!("  {}", "─".repeat(92));
    println!(
        "  {} of {} instances planned, total cost {:.2}",
        report.planned().count(),
        report.plans.len(),
        total_cost
    );
}

fn run_constraint_section(report: &AnalyticsReport) {
    print_section_header("2. BINDING CONSTRAINTS");

    let mut counts: BTreeMap<PlanConstraint, usize> = BTreeMap::new();
    for plan in report.planned() {
        for status in plan.constraints.iter().filter(|c| c.binding) {
            *counts.entry(status.constraint).or_insert(0) += 1;
        }
    }

    let planned = report.planned().count().max(1);
    println!("  {:22} {:>10} {:>10}", "Constraint", "Binding", "Share");
    println!("  {}", "─".repeat(45));
    for (constraint, n) in &counts {
        println!(
            "  {:22} {:>10} {:>9.1}%",
            constraint.to_string(),
            n,
            *n as f64 * 100.0 / planned as f64
        );
    }

    print_subsection("Plans at a headcount or overtime limit");
    let limits = [
        PlanConstraint::MaxFullTime,
        PlanConstraint::MaxPartTime,
        PlanConstraint::MaxOvertimeHours,
        PlanConstraint::OvertimeShare,
    ];
    let mut any = false;
    for plan in report.planned() {
        let hit: Vec<String> = limits
            .iter()
            .filter(|c| plan.is_binding(**c))
            .map(|c| c.to_string())
            .collect();
        if !hit.is_empty() {
            any = true;
            println!("  {:6} {:10} {}", plan.region, plan.week.to_string(), hit.join(", "));
        }
    }
    if !any {
        println!("  None: every plan has headroom on all limits");
    }
}

fn run_exception_section(report: &AnalyticsReport) {
    print_section_header("3. UNPLANNED WEEKS");

    let failures: Vec<_> = report.plans.values().filter_map(|o| o.as_ref().err()).collect();
    if failures.is_empty() {
        println!("  Every (region, week) instance produced a plan");
        return;
    }
    println!("  {:20} {}", "Status", "Detail");
    println!("  {}", "─".repeat(80));
    for e in failures {
        println!("  {:20} {}", e.kind(), e);
    }
}

fn run_sensitivity_section(config: &AnalyticsConfig, report: &AnalyticsReport) {
    print_section_header("4. RISK BUFFER SENSITIVITY");

    // Re-plan the first week of each region across a sweep of risk factors
    let mut firsts: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for plan in report.planned() {
        firsts
            .entry(plan.region.as_str())
            .or_insert((plan.forecast_units, plan.risk_adjustment));
    }

    for (region, (units, actual)) in firsts {
        let Some(plan) = report.planned().find(|p| p.region == region) else {
            continue;
        };
        print_subsection(&format!(
            "Region {} {} ({:.0} units, applied factor {:.3})",
            region, plan.week, units, actual
        ));
        println!("  {:>8} {:>10} {:>5} {:>5} {:>8} {:>11}", "Factor", "Required", "FT", "PT", "OT (h)", "Cost");
        println!("  {}", "─".repeat(55));

        let constraints = config.staffing.constraints_for(region);
        for step in 0..=6 {
            let factor = 1.0 + step as f64 * 0.1;
            let request = StaffingRequest::new(region, plan.week, units, factor);
            match optimize(&request, constraints) {
                Ok(p) => println!(
                    "  {:>8.2} {:>10.1} {:>5} {:>5} {:>8.1} {:>11.2}",
                    factor, p.required_capacity, p.full_time, p.part_time, p.overtime_hours, p.total_cost
                ),
                Err(e) => println!("  {:>8.2} {:>10.1}   {}", factor, request.required_capacity(constraints), e.kind()),
            }
        }
    }
}
