//! Comparison of energy source types over the cleaned energy balance series.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
};

use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    data::{observation::CleanedSeries, schema::Role},
    error::RenewablesError,
    preprocessing::merger::MergedDataset,
    util::math_utils::{cagr, linear_regression, mean},
};

use super::{filtered::YearValue, group_mean, no_data, QueryFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthMethod {
    Cagr,
    RegressionSlope,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub average: f64,
    pub total: f64,
    pub min: f64,
    pub max: f64,
    pub share_pct: f64,
    pub growth_rate: Option<f64>,
    pub growth_method: Option<GrowthMethod>,
    pub data_points: usize,
    pub avg_renewable_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceComparison {
    pub sources: Vec<SourceSummary>,
    pub timeseries_by_source: BTreeMap<String, Vec<YearValue>>,
    pub source_column: String,
    pub renewable_pct_available: bool,
}

/// Growth of a yearly series in percent per year.
///
/// CAGR when both ends are positive and at least a year apart, otherwise the
/// regression slope as a percentage of the series mean. `None` when neither
/// is defined.
pub fn growth_rate(yearly: &[YearValue]) -> Option<(f64, GrowthMethod)> {
    let first = yearly.first()?;
    let last = yearly.last()?;
    let span = (last.year - first.year) as f64;
    if let Some(rate) = cagr(first.value, last.value, span) {
        return Some((rate, GrowthMethod::Cagr));
    }

    let years: Vec<f64> = yearly.iter().map(|p| p.year as f64).collect();
    let values: Vec<f64> = yearly.iter().map(|p| p.value).collect();
    let (slope, _) = linear_regression(&years, &values)?;
    let average = mean(&values)?;
    if average <= 0.0 {
        return None;
    }
    Some((slope / average * 100.0, GrowthMethod::RegressionSlope))
}

/// Per-source statistics over absolute values, excluding the total source type.
#[instrument(skip(energy, merged))]
pub fn compare_sources(
    energy: &CleanedSeries,
    merged: &MergedDataset,
    filter: &QueryFilter,
    total_source_type: &str,
) -> Result<SourceComparison, RenewablesError> {
    let source_column = energy
        .schema
        .column(Role::SourceType)
        .ok_or_else(|| RenewablesError::Schema(format!("{} has no source type column", energy.kind())))?;

    let codes: HashMap<&str, &str> = merged
        .records
        .iter()
        .filter_map(|r| r.nuts_code.as_deref().map(|c| (r.region.as_str(), c)))
        .collect();
    let shares: HashMap<(&str, i32), f64> = merged
        .records
        .iter()
        .filter_map(|r| r.secondary.value.map(|v| ((r.region.as_str(), r.year), v)))
        .collect();

    let mut by_source: BTreeMap<&str, Vec<(&str, i32, f64)>> = BTreeMap::new();
    for obs in energy.iter() {
        let Some(source) = obs.source_type.as_deref() else {
            continue;
        };
        if source == total_source_type
            || !filter.matches_year(obs.year)
            || !filter.matches_region(&obs.region, codes.get(obs.region.as_str()).copied())
        {
            continue;
        }
        by_source
            .entry(source)
            .or_default()
            .push((obs.region.as_str(), obs.year, obs.value.abs()));
    }
    if by_source.is_empty() {
        return Err(no_data("No energy source data for the selected filters"));
    }

    let grand_total: f64 = by_source.values().flatten().map(|(_, _, v)| v).sum();
    let mut summaries = Vec::with_capacity(by_source.len());
    let mut timeseries = BTreeMap::new();
    for (source, rows) in &by_source {
        let values: Vec<f64> = rows.iter().map(|(_, _, v)| *v).collect();
        let total: f64 = values.iter().sum();
        let yearly: Vec<YearValue> = group_mean(rows.iter().map(|(_, year, v)| (*year, *v)))
            .into_iter()
            .map(|(year, value)| YearValue { year, value })
            .collect();
        let growth = growth_rate(&yearly);
        let renewable: Vec<f64> = rows
            .iter()
            .filter_map(|(region, year, _)| shares.get(&(*region, *year)).copied())
            .collect();

        summaries.push(SourceSummary {
            source: source.to_string(),
            average: total / values.len() as f64,
            total,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            share_pct: if grand_total > 0.0 { total / grand_total * 100.0 } else { 0.0 },
            growth_rate: growth.map(|(rate, _)| rate),
            growth_method: growth.map(|(_, method)| method),
            data_points: values.len(),
            avg_renewable_pct: mean(&renewable),
        });
        timeseries.insert(source.to_string(), yearly);
    }
    summaries.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(Ordering::Equal));
    debug!(sources = summaries.len(), "Compared energy sources");

    Ok(SourceComparison {
        sources: summaries,
        timeseries_by_source: timeseries,
        source_column: source_column.to_string(),
        renewable_pct_available: !shares.is_empty(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{observation::Observation, schema::SourceKind};

    fn point(year: i32, value: f64) -> YearValue {
        YearValue { year, value }
    }

    fn obs(region: &str, year: i32, siec: &str, value: f64) -> Observation {
        Observation {
            region: region.to_string(),
            year,
            value,
            frequency: None,
            category: Some("Primary production".to_string()),
            source_type: Some(siec.to_string()),
            unit: Some("Terajoule".to_string()),
            last_update: None,
        }
    }

    #[test]
    fn cagr_when_both_ends_positive() {
        let (rate, method) = growth_rate(&[point(2010, 100.0), point(2020, 200.0)]).unwrap();
        assert_eq!(method, GrowthMethod::Cagr);
        assert!((rate - 7.18).abs() < 0.01);
    }

    #[test]
    fn slope_fallback_and_undefined() {
        let (rate, method) = growth_rate(&[point(2010, 0.0), point(2011, 2.0), point(2012, 4.0)]).unwrap();
        assert_eq!(method, GrowthMethod::RegressionSlope);
        assert!((rate - 100.0).abs() < 1e-9);
        assert!(growth_rate(&[point(2010, 0.0), point(2011, 0.0)]).is_none());
        assert!(growth_rate(&[point(2010, 5.0)]).is_none());
    }

    #[test]
    fn total_is_excluded_and_values_are_absolute() {
        let energy = CleanedSeries::new(
            SourceKind::EnergyBalance.schema(),
            vec![
                obs("Portugal", 2020, "Total", 1000.0),
                obs("Portugal", 2020, "Solar", 30.0),
                obs("Portugal", 2021, "Solar", 40.0),
                obs("Portugal", 2020, "Natural gas", -10.0),
            ],
        );
        let merged = MergedDataset {
            primary: SourceKind::EnergyBalance,
            secondary: SourceKind::RenewableShare,
            records: vec![],
        };
        let report = compare_sources(&energy, &merged, &QueryFilter::default(), "Total").unwrap();
        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.sources[0].source, "Solar");
        assert_eq!(report.sources[0].total, 70.0);
        assert_eq!(report.sources[1].min, 10.0);
        assert!((report.sources[0].share_pct - 87.5).abs() < 1e-9);
        assert!(!report.renewable_pct_available);
        assert_eq!(report.timeseries_by_source["Solar"].len(), 2);
    }
}
