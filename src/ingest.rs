//! CSV loading of the network tables and writing of analytics outputs

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::attribution::AttributionFailure;
use crate::error::AttributionError;
use crate::forecast::WorkloadForecast;
use crate::models::{
    format_timestamp, ForecastRecord, Lane, LaneRecord, MilestoneRecord, Shipment, ShipmentRecord,
};
use crate::report::AnalyticsReport;

pub const LANES_FILE: &str = "lanes.csv";
pub const SHIPMENTS_FILE: &str = "shipments.csv";
pub const MILESTONES_FILE: &str = "milestones.csv";
pub const FORECAST_FILE: &str = "forecast.csv";

pub const DRIVERS_FILE: &str = "drivers.csv";
pub const STAFFING_FILE: &str = "staffing_plan.csv";
pub const FAILURES_FILE: &str = "attribution_failures.csv";
pub const REPORT_FILE: &str = "report.json";

/// Lanes plus shipments with their milestones joined in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub lanes: Vec<Lane>,
    pub shipments: Vec<Shipment>,
    /// Shipments dropped at load because a row could not be parsed
    pub rejected: Vec<AttributionFailure>,
}

pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, row) in reader.deserialize().enumerate() {
        let row: T = row.with_context(|| format!("{}: invalid row {}", path.display(), i + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_lanes(path: &Path) -> Result<Vec<Lane>> {
    let records: Vec<LaneRecord> = read_csv(path)?;
    let mut seen = HashSet::new();
    let mut lanes = Vec::with_capacity(records.len());
    for rec in &records {
        if !seen.insert(rec.lane_id.clone()) {
            bail!("{}: duplicate lane_id {}", path.display(), rec.lane_id);
        }
        lanes.push(rec.to_lane().with_context(|| path.display().to_string())?);
    }
    info!("Loaded {} lanes from {}", lanes.len(), path.display());
    Ok(lanes)
}

/// Load shipments and attach their milestone events.
///
/// Milestone rows referencing an unknown shipment are skipped with a warning.
/// A shipment whose own row or any of its milestone rows cannot be parsed is
/// left out and returned as a failure; the rest of the file still loads.
pub fn load_shipments(
    shipments_path: &Path,
    milestones_path: &Path,
) -> Result<(Vec<Shipment>, Vec<AttributionFailure>)> {
    let records: Vec<ShipmentRecord> = read_csv(shipments_path)?;
    let mut slots: Vec<Result<Shipment, String>> = Vec::with_capacity(records.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    for rec in &records {
        if index.contains_key(&rec.shipment_id) {
            bail!("{}: duplicate shipment_id {}", shipments_path.display(), rec.shipment_id);
        }
        index.insert(rec.shipment_id.clone(), slots.len());
        slots.push(rec.to_shipment().map_err(|e| format!("{:#}", e)));
    }

    let milestones: Vec<MilestoneRecord> = read_csv(milestones_path)?;
    let mut orphaned = 0usize;
    for rec in &milestones {
        let Some(&i) = index.get(&rec.shipment_id) else {
            orphaned += 1;
            warn!(shipment_id = %rec.shipment_id, milestone = %rec.milestone, "Milestone for unknown shipment skipped");
            continue;
        };
        match rec.to_event() {
            Ok(event) => {
                if let Ok(s) = &mut slots[i] {
                    s.milestones.push(event);
                }
            }
            Err(e) => {
                if slots[i].is_ok() {
                    slots[i] = Err(format!("{:#}", e));
                }
            }
        }
    }

    let mut shipments = Vec::with_capacity(slots.len());
    let mut rejected = Vec::new();
    for (rec, slot) in records.iter().zip(slots) {
        match slot {
            Ok(s) => shipments.push(s),
            Err(message) => {
                warn!(shipment_id = %rec.shipment_id, "{}", message);
                rejected.push(AttributionFailure {
                    shipment_id: rec.shipment_id.clone(),
                    error: AttributionError::MalformedRecord {
                        shipment_id: rec.shipment_id.clone(),
                        message,
                    },
                });
            }
        }
    }

    info!(
        shipments = shipments.len(),
        rejected = rejected.len(),
        milestones = milestones.len() - orphaned,
        orphaned,
        "Loaded shipments"
    );
    Ok((shipments, rejected))
}

pub fn load_forecast(path: &Path) -> Result<WorkloadForecast> {
    let records: Vec<ForecastRecord> = read_csv(path)?;
    let forecast = WorkloadForecast::from_records(&records).with_context(|| path.display().to_string())?;
    info!("Loaded {} forecast entries from {}", forecast.len(), path.display());
    Ok(forecast)
}

/// Load `lanes.csv`, `shipments.csv` and `milestones.csv` from `dir`
pub fn load_dataset(dir: &Path) -> Result<Dataset> {
    let lanes = load_lanes(&dir.join(LANES_FILE))?;
    let (shipments, rejected) = load_shipments(&dir.join(SHIPMENTS_FILE), &dir.join(MILESTONES_FILE))?;
    Ok(Dataset { lanes, shipments, rejected })
}

/// Write the network tables in the same layout [`load_dataset`] reads
pub fn write_dataset(dir: &Path, dataset: &Dataset) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let lanes: Vec<LaneRecord> = dataset.lanes.iter().map(LaneRecord::from).collect();
    write_csv(&dir.join(LANES_FILE), &lanes)?;

    let shipments: Vec<ShipmentRecord> = dataset
        .shipments
        .iter()
        .map(|s| ShipmentRecord {
            shipment_id: s.shipment_id.clone(),
            lane_id: s.lane_id.clone(),
            sku_id: s.sku_id.clone(),
            planned_ship: format_timestamp(&s.planned_ship),
        })
        .collect();
    write_csv(&dir.join(SHIPMENTS_FILE), &shipments)?;

    let milestones: Vec<MilestoneRecord> = dataset
        .shipments
        .iter()
        .flat_map(|s| {
            s.milestones.iter().map(move |m| MilestoneRecord {
                shipment_id: s.shipment_id.clone(),
                milestone: m.milestone.to_string(),
                timestamp: format_timestamp(&m.timestamp),
            })
        })
        .collect();
    write_csv(&dir.join(MILESTONES_FILE), &milestones)?;

    info!(
        lanes = lanes.len(),
        shipments = shipments.len(),
        milestones = milestones.len(),
        "Wrote dataset to {}",
        dir.display()
    );
    Ok(())
}

pub fn write_forecast(path: &Path, forecast: &WorkloadForecast) -> Result<()> {
    write_csv(path, &forecast.to_records())
}

/// Write drivers, staffing plan, failures and the JSON report into `dir`
pub fn write_report(dir: &Path, report: &AnalyticsReport) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    write_csv(&dir.join(DRIVERS_FILE), &report.driver_records())?;
    write_csv(&dir.join(STAFFING_FILE), &report.plan_records())?;
    write_csv(&dir.join(FAILURES_FILE), &report.failure_records())?;

    let json = report.to_json()?;
    let report_path = dir.join(REPORT_FILE);
    fs::write(&report_path, json).with_context(|| format!("failed to write {}", report_path.display()))?;
    info!("Wrote analytics outputs to {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    const LANES: &str = "\
lane_id,lane_type,origin_type,origin_id,destination_type,destination_id,region,mode,sla_days
F1-W1,F2W,FACTORY,F1,WAREHOUSE,W1,EU,SEA,5
W1-S001,W2S,WAREHOUSE,W1,STORE,S001,EU,ROAD,1.5
";

    #[test]
    fn test_load_dataset_joins_milestones() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), LANES_FILE, LANES);
        write_file(
            dir.path(),
            SHIPMENTS_FILE,
            "shipment_id,lane_id,sku_id,planned_ship\nA1,W1-S001,SKU1,2024-03-04 08:00:00\n",
        );
        write_file(
            dir.path(),
            MILESTONES_FILE,
            "shipment_id,milestone,timestamp\n\
             A1,store_received,2024-03-05 10:00:00\n\
             A1,pick_start,2024-03-04 08:00:00\n\
             ZZ,pick_start,2024-03-04 08:00:00\n",
        );
        let data = load_dataset(dir.path()).unwrap();
        assert_eq!(data.lanes.len(), 2);
        assert_eq!(data.lanes[1].sla_days, 1.5);
        assert_eq!(data.shipments.len(), 1);
        assert_eq!(data.shipments[0].milestones.len(), 2);
    }

    #[test]
    fn test_malformed_rows_reject_only_their_shipment() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), LANES_FILE, LANES);
        write_file(
            dir.path(),
            SHIPMENTS_FILE,
            "shipment_id,lane_id,sku_id,planned_ship\n\
             A1,W1-S001,SKU1,2024-03-04 08:00:00\n\
             A2,W1-S001,SKU1,2024-03-04 09:00:00\n\
             A3,W1-S001,SKU1,yesterday\n",
        );
        write_file(
            dir.path(),
            MILESTONES_FILE,
            "shipment_id,milestone,timestamp\n\
             A1,pick_start,2024-03-04 08:00:00\n\
             A1,store_received,2024-03-05 10:00:00\n\
             A2,pick_start,2024-03-04 09:00:00\n\
             A2,pick_strat,2024-03-04 10:00:00\n\
             A3,pick_start,2024-03-04 09:00:00\n",
        );

        let data = load_dataset(dir.path()).unwrap();
        assert_eq!(data.shipments.len(), 1);
        assert_eq!(data.shipments[0].shipment_id, "A1");
        assert_eq!(data.shipments[0].milestones.len(), 2);

        let ids: Vec<&str> = data.rejected.iter().map(|f| f.shipment_id.as_str()).collect();
        assert_eq!(ids, vec!["A2", "A3"]);
        assert!(data.rejected.iter().all(|f| f.error.kind() == "malformed_record"));
        assert!(data.rejected[0].error.to_string().contains("pick_strat"));
        assert!(data.rejected[1].error.to_string().contains("yesterday"));
    }

    #[test]
    fn test_duplicate_shipment_id_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            SHIPMENTS_FILE,
            "shipment_id,lane_id,sku_id,planned_ship\n\
             A1,W1-S001,SKU1,2024-03-04 08:00:00\n\
             A1,W1-S001,SKU2,2024-03-04 09:00:00\n",
        );
        write_file(dir.path(), MILESTONES_FILE, "shipment_id,milestone,timestamp\n");
        let err = load_shipments(&dir.path().join(SHIPMENTS_FILE), &dir.path().join(MILESTONES_FILE)).unwrap_err();
        assert!(err.to_string().contains("duplicate shipment_id A1"));
    }

    #[test]
    fn test_non_positive_sla_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            LANES_FILE,
            "lane_id,lane_type,origin_type,origin_id,destination_type,destination_id,region,mode,sla_days\n\
             W1-S001,W2S,WAREHOUSE,W1,STORE,S001,EU,ROAD,0\n",
        );
        assert!(load_lanes(&dir.path().join(LANES_FILE)).is_err());
    }

    #[test]
    fn test_dataset_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), LANES_FILE, LANES);
        write_file(
            dir.path(),
            SHIPMENTS_FILE,
            "shipment_id,lane_id,sku_id,planned_ship\nB7,F1-W1,SKU9,2024-03-01 00:00:00\n",
        );
        write_file(
            dir.path(),
            MILESTONES_FILE,
            "shipment_id,milestone,timestamp\nB7,order_release,2024-03-01 00:00:00\nB7,warehouse_received,2024-03-06 12:00:00\n",
        );
        let original = load_dataset(dir.path()).unwrap();

        let out = tempfile::tempdir().unwrap();
        write_dataset(out.path(), &original).unwrap();
        assert_eq!(load_dataset(out.path()).unwrap(), original);
    }

    #[test]
    fn test_forecast_file_rejects_negative_units() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), FORECAST_FILE, "region,week,forecast_units,mape\nEU,2024-W10,-5,\n");
        assert!(load_forecast(&dir.path().join(FORECAST_FILE)).is_err());

        write_file(dir.path(), FORECAST_FILE, "region,week,forecast_units,mape\nEU,2024-W10,520,0.12\nUS,2024-W10,300,\n");
        let forecast = load_forecast(&dir.path().join(FORECAST_FILE)).unwrap();
        assert_eq!(forecast.len(), 2);
        assert_eq!(forecast.get("US", "2024-W10".parse().unwrap()).and_then(|e| e.mape), None);
    }
}
