//! Driver aggregation: which causes dominate per lane/region and week

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::{DelayAttribution, DelayBucket, DriverContribution, DriverRanking, GroupBy, WeekKey};

fn group_key(a: &DelayAttribution, group_by: GroupBy) -> &str {
    match group_by {
        GroupBy::Lane => &a.lane_id,
        GroupBy::Region => &a.region,
    }
}

/// Aggregate delivered shipments by (dimension, completion week) and rank
/// buckets by absolute summed delay, ties in bucket enumeration order.
///
/// A bucket's mean is taken over the shipments whose lane type can carry
/// it, so inbound volume never dilutes warehouse buckets in a region.
///
/// Output is ordered by (key, week). Sums are taken in shipment-id order so
/// the result is bit-identical whatever order `attributions` arrives in.
pub fn rank_drivers(attributions: &[DelayAttribution], group_by: GroupBy) -> Vec<DriverRanking> {
    let mut groups: BTreeMap<(&str, WeekKey), Vec<&DelayAttribution>> = BTreeMap::new();
    let mut skipped = 0usize;
    for a in attributions {
        if !a.delivered {
            skipped += 1;
            continue;
        }
        groups.entry((group_key(a, group_by), a.week)).or_default().push(a);
    }
    if skipped > 0 {
        debug!(skipped, "Undelivered shipments left out of driver ranking");
    }

    groups
        .into_iter()
        .map(|((key, week), mut members)| {
            members.sort_by(|a, b| a.shipment_id.cmp(&b.shipment_id));

            // (total, shipments whose lane type maps the bucket)
            let mut totals: BTreeMap<DelayBucket, (f64, usize)> = BTreeMap::new();
            for a in &members {
                for (bucket, days) in &a.buckets {
                    let entry = totals.entry(*bucket).or_insert((0.0, 0));
                    entry.0 += *days;
                    entry.1 += 1;
                }
            }

            let n = members.len();
            let mut drivers: Vec<DriverContribution> = totals
                .into_iter()
                .map(|(bucket, (total, scope))| DriverContribution {
                    bucket,
                    rank: 0,
                    total_delay_days: total,
                    mean_delay_days: total / scope as f64,
                })
                .collect();
            drivers.sort_by(|a, b| {
                b.total_delay_days
                    .abs()
                    .total_cmp(&a.total_delay_days.abs())
                    .then(a.bucket.cmp(&b.bucket))
            });
            for (i, d) in drivers.iter_mut().enumerate() {
                d.rank = i + 1;
            }

            DriverRanking {
                dimension: group_by,
                key: key.to_string(),
                week,
                shipments: n,
                drivers,
            }
        })
        .collect()
}
