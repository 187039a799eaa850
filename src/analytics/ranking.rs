use std::{cmp::Ordering, collections::BTreeMap};

use serde::Serialize;
use tracing::instrument;

use crate::{
    error::RenewablesError,
    preprocessing::{
        cleaner::is_aggregate_region,
        merger::{MergedDataset, MergedRecord, ValueColumn},
    },
    util::math_utils::{linear_regression, mean},
};

use super::{no_data, points, trend::percent_change, trend::SHARE_METRIC, QueryFilter};

pub const RANKING_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionStats {
    pub region: String,
    pub nuts_code: Option<String>,
    pub latest_year: i32,
    pub current_value: f64,
    pub growth_rate: f64,
    pub total_change_pct: f64,
    pub first_value: f64,
    pub last_value: f64,
    pub data_points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionRanking {
    pub leading_by_value: Vec<RegionStats>,
    pub fastest_growing: Vec<RegionStats>,
    pub lagging: Vec<RegionStats>,
    pub total_regions: usize,
    pub metric_used: String,
}

fn region_stats(region: &str, mut rows: Vec<(&MergedRecord, f64)>) -> Option<RegionStats> {
    if rows.len() < 2 {
        return None;
    }
    rows.sort_by_key(|(r, _)| r.year);
    let years: Vec<f64> = rows.iter().map(|(r, _)| r.year as f64).collect();
    let values: Vec<f64> = rows.iter().map(|(_, v)| *v).collect();
    let (slope, _) = linear_regression(&years, &values)?;

    let latest_year = rows.last()?.0.year;
    let latest: Vec<f64> = rows
        .iter()
        .filter(|(r, _)| r.year == latest_year)
        .map(|(_, v)| *v)
        .collect();
    let first_value = *values.first()?;
    let last_value = *values.last()?;

    Some(RegionStats {
        region: region.to_string(),
        nuts_code: rows.iter().find_map(|(r, _)| r.nuts_code.clone()),
        latest_year,
        current_value: mean(&latest)?,
        growth_rate: slope,
        total_change_pct: percent_change(first_value, last_value),
        first_value,
        last_value,
        data_points: rows.len(),
    })
}

fn top_by(stats: &[RegionStats], key: impl Fn(&RegionStats) -> f64, descending: bool) -> Vec<RegionStats> {
    let mut sorted = stats.to_vec();
    sorted.sort_by(|a, b| {
        let ord = key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    sorted.truncate(RANKING_SIZE);
    sorted
}

/// Leading, fastest growing and lagging regions by renewable share.
/// Regions need at least two years of data; aggregates never rank.
#[instrument(skip(merged))]
pub fn rank_regions(merged: &MergedDataset, filter: &QueryFilter) -> Result<RegionRanking, RenewablesError> {
    let points = points(merged, filter, ValueColumn::Secondary);
    if points.is_empty() {
        return Err(no_data("No renewable share data for ranking"));
    }

    let mut by_region: BTreeMap<&str, Vec<(&MergedRecord, f64)>> = BTreeMap::new();
    for (record, value) in points {
        if is_aggregate_region(&record.region) {
            continue;
        }
        by_region.entry(record.region.as_str()).or_default().push((record, value));
    }

    let stats: Vec<RegionStats> = by_region
        .into_iter()
        .filter_map(|(region, rows)| region_stats(region, rows))
        .collect();

    Ok(RegionRanking {
        leading_by_value: top_by(&stats, |s| s.current_value, true),
        fastest_growing: top_by(&stats, |s| s.growth_rate, true),
        lagging: top_by(&stats, |s| s.current_value, false),
        total_regions: stats.len(),
        metric_used: SHARE_METRIC.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::schema::SourceKind, preprocessing::merger::SourceValues};

    fn record(region: &str, year: i32, share: f64) -> MergedRecord {
        MergedRecord {
            nuts_code: None,
            region: region.to_string(),
            year,
            frequency: None,
            primary: SourceValues::default(),
            secondary: SourceValues {
                value: Some(share),
                ..Default::default()
            },
        }
    }

    #[test]
    fn ranks_and_skips_short_series() {
        let merged = MergedDataset {
            primary: SourceKind::EnergyBalance,
            secondary: SourceKind::RenewableShare,
            records: vec![
                record("Sweden", 2019, 56.0),
                record("Sweden", 2020, 60.0),
                record("Malta", 2019, 8.0),
                record("Malta", 2020, 10.0),
                record("Denmark", 2019, 30.0),
                record("Denmark", 2020, 40.0),
                record("Iceland", 2020, 80.0),
                record("European Union", 2019, 20.0),
                record("European Union", 2020, 22.0),
            ],
        };
        let ranking = rank_regions(&merged, &QueryFilter::default()).unwrap();
        assert_eq!(ranking.total_regions, 3);
        assert_eq!(ranking.leading_by_value[0].region, "Sweden");
        assert_eq!(ranking.fastest_growing[0].region, "Denmark");
        assert_eq!(ranking.lagging[0].region, "Malta");
        assert!((ranking.lagging[0].total_change_pct - 25.0).abs() < 1e-9);
        assert_eq!(ranking.leading_by_value[0].data_points, 2);
    }
}
