//! Supply chain delay attribution and staffing optimisation.
//!
//! Shipment milestones are decomposed into causal delay buckets, ranked per
//! lane/region and week, and the warehouse bottleneck share of that delay
//! buffers the workload forecast fed to a minimum-cost staffing optimizer.

pub mod attribution;
pub mod config;
pub mod error;
pub mod forecast;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod ranking;
pub mod report;
pub mod risk;
pub mod solver;
pub mod staffing;
