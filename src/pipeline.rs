//! End-to-end run: attribution, driver ranking, risk adjustment, staffing,
//! then aggregation into one report.

use tracing::info;

use crate::attribution::AttributionEngine;
use crate::config::{AnalyticsConfig, RiskConfig};
use crate::error::AggregationError;
use crate::forecast::{MovingAverageForecaster, WorkloadForecast};
use crate::ingest::Dataset;
use crate::models::{DriverRanking, GroupBy};
use crate::ranking::rank_drivers;
use crate::report::AnalyticsReport;
use crate::risk::{RiskAssessment, RiskIndex};
use crate::staffing::{CapacityOptimizer, StaffingRequest};

/// One staffing request per forecast entry, buffered by the risk factor of
/// the region's attributed delay
pub fn staffing_requests(
    risk: &RiskConfig,
    region_rankings: &[DriverRanking],
    forecast: &WorkloadForecast,
) -> (Vec<RiskAssessment>, Vec<StaffingRequest>) {
    let index = RiskIndex::new(risk, region_rankings);
    forecast
        .iter()
        .map(|(region, week, entry)| {
            let assessment = index.assess(region, week);
            let request = StaffingRequest::new(region, week, entry.forecast_units, assessment.factor);
            (assessment, request)
        })
        .unzip()
}

pub struct Pipeline<'a> {
    config: &'a AnalyticsConfig,
    forecaster: MovingAverageForecaster,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a AnalyticsConfig) -> Self {
        Self {
            config,
            forecaster: MovingAverageForecaster::default(),
        }
    }

    /// Forecaster used when no external forecast is supplied
    pub fn with_forecaster(mut self, forecaster: MovingAverageForecaster) -> Self {
        self.forecaster = forecaster;
        self
    }

    pub fn run(&self, data: &Dataset, forecast: Option<&WorkloadForecast>) -> Result<AnalyticsReport, AggregationError> {
        info!(
            lanes = data.lanes.len(),
            shipments = data.shipments.len(),
            rejected = data.rejected.len(),
            "Running supply chain analytics"
        );

        let engine = AttributionEngine::new(&self.config.attribution, &data.lanes);
        let batch = engine.attribute_all(&data.shipments);

        let lane_rankings = rank_drivers(&batch.attributions, GroupBy::Lane);
        let region_rankings = rank_drivers(&batch.attributions, GroupBy::Region);
        info!(
            lane_groups = lane_rankings.len(),
            region_groups = region_rankings.len(),
            "Delay drivers ranked"
        );

        let baseline;
        let forecast = match forecast {
            Some(f) => f,
            None => {
                baseline = self.forecaster.forecast(&data.shipments, &data.lanes);
                &baseline
            }
        };

        let (assessments, requests) = staffing_requests(&self.config.risk, &region_rankings, forecast);
        let outcomes = CapacityOptimizer::new().plan_all(&requests, &self.config.staffing);

        let mut report = AnalyticsReport::new();
        report.attributed = batch.attributions.len();
        report.add_rankings(lane_rankings)?;
        report.add_rankings(region_rankings)?;
        report.add_risk(assessments)?;
        report.add_demand(&requests)?;
        report.add_plans(outcomes)?;
        report.add_failures(batch.failures)?;
        report.add_failures(data.rejected.clone())?;
        Ok(report)
    }
}
