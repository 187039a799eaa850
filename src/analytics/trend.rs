use std::cmp::Ordering;

use serde::Serialize;
use tracing::instrument;

use crate::{
    error::RenewablesError,
    preprocessing::merger::{MergedDataset, ValueColumn},
    util::math_utils::linear_regression,
};

use super::{group_mean, no_data, points, QueryFilter};

/// Slope magnitude below which a series counts as flat.
pub const STABLE_THRESHOLD: f64 = 0.1;
pub const TOP_REGIONS: usize = 10;
pub const SHARE_METRIC: &str = "Renewable energy percentage (%)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn classify(slope: f64) -> Self {
        if slope > STABLE_THRESHOLD {
            TrendDirection::Increasing
        } else if slope < -STABLE_THRESHOLD {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyAverage {
    pub year: i32,
    pub average_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearOverYear {
    pub from_year: i32,
    pub to_year: i32,
    pub change_pct: f64,
    pub from_value: f64,
    pub to_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionAverage {
    pub region: String,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Period {
    pub from: i32,
    pub to: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub overall_growth_rate: f64,
    pub trend_direction: TrendDirection,
    pub yearly_averages: Vec<YearlyAverage>,
    pub year_over_year_changes: Vec<YearOverYear>,
    pub top_regions: Vec<RegionAverage>,
    pub period: Period,
    pub metric_used: String,
}

/// Percent change, 0 when the starting value is 0.
pub fn percent_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        0.0
    } else {
        (to - from) / from * 100.0
    }
}

/// Builds the trend report from already averaged yearly values.
pub fn trend_from_yearly(yearly: &[YearlyAverage]) -> (f64, TrendDirection, Vec<YearOverYear>) {
    let years: Vec<f64> = yearly.iter().map(|y| y.year as f64).collect();
    let values: Vec<f64> = yearly.iter().map(|y| y.average_value).collect();
    let slope = linear_regression(&years, &values).map_or(0.0, |(slope, _)| slope);

    let changes = yearly
        .windows(2)
        .map(|pair| YearOverYear {
            from_year: pair[0].year,
            to_year: pair[1].year,
            change_pct: percent_change(pair[0].average_value, pair[1].average_value),
            from_value: pair[0].average_value,
            to_value: pair[1].average_value,
        })
        .collect();
    (slope, TrendDirection::classify(slope), changes)
}

/// Average renewable share per year, its regression slope and the leading regions.
#[instrument(skip(merged))]
pub fn global_trend(merged: &MergedDataset, filter: &QueryFilter) -> Result<TrendReport, RenewablesError> {
    let points = points(merged, filter, ValueColumn::Secondary);
    if points.is_empty() {
        return Err(no_data("No renewable share data for the selected period"));
    }

    let yearly: Vec<YearlyAverage> = group_mean(points.iter().map(|(r, v)| (r.year, *v)))
        .into_iter()
        .map(|(year, average_value)| YearlyAverage { year, average_value })
        .collect();
    let (slope, direction, changes) = trend_from_yearly(&yearly);

    let mut regions: Vec<RegionAverage> = group_mean(points.iter().map(|(r, v)| (r.region.as_str(), *v)))
        .into_iter()
        .map(|(region, average)| RegionAverage {
            region: region.to_string(),
            average,
        })
        .collect();
    regions.sort_by(|a, b| b.average.partial_cmp(&a.average).unwrap_or(Ordering::Equal));
    regions.truncate(TOP_REGIONS);

    let period = Period {
        from: yearly.first().map_or(0, |y| y.year),
        to: yearly.last().map_or(0, |y| y.year),
    };

    Ok(TrendReport {
        overall_growth_rate: slope,
        trend_direction: direction,
        yearly_averages: yearly,
        year_over_year_changes: changes,
        top_regions: regions,
        period,
        metric_used: SHARE_METRIC.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yearly(values: &[f64]) -> Vec<YearlyAverage> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| YearlyAverage {
                year: 2018 + i as i32,
                average_value: *v,
            })
            .collect()
    }

    #[test]
    fn small_slope_is_stable() {
        let (slope, direction, _) = trend_from_yearly(&yearly(&[10.0, 10.05, 10.08]));
        assert!((slope - 0.04).abs() < 1e-9);
        assert_eq!(direction, TrendDirection::Stable);
    }

    #[test]
    fn steady_growth_is_increasing() {
        let (slope, direction, changes) = trend_from_yearly(&yearly(&[10.0, 12.0, 14.0]));
        assert!((slope - 2.0).abs() < 1e-9);
        assert_eq!(direction, TrendDirection::Increasing);
        assert_eq!(changes.len(), 2);
        assert!((changes[0].change_pct - 20.0).abs() < 1e-9);
    }

    #[test]
    fn decline_and_zero_base() {
        assert_eq!(TrendDirection::classify(-0.5), TrendDirection::Decreasing);
        assert_eq!(percent_change(0.0, 5.0), 0.0);
        let (slope, direction, changes) = trend_from_yearly(&yearly(&[3.0]));
        assert_eq!(slope, 0.0);
        assert_eq!(direction, TrendDirection::Stable);
        assert!(changes.is_empty());
    }
}
