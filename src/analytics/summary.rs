use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::Serialize;
use tracing::instrument;

use crate::{
    error::RenewablesError,
    preprocessing::merger::{MergedDataset, MergedRecord, ValueColumn},
    util::math_utils::{mean, median, percentile_ranks, std_deviation},
};

use super::{no_data, points, trend::SHARE_METRIC, QueryFilter};

pub const DEFAULT_AGGREGATIONS: [Aggregation; 4] =
    [Aggregation::Mean, Aggregation::Min, Aggregation::Max, Aggregation::Count];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Region,
    Year,
    RegionYear,
}

impl FromStr for GroupBy {
    type Err = RenewablesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "region" | "geo" => Ok(GroupBy::Region),
            "year" => Ok(GroupBy::Year),
            "region_year" | "region-year" => Ok(GroupBy::RegionYear),
            other => Err(RenewablesError::InvalidSelection(format!("Unknown grouping: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Mean,
    Median,
    Sum,
    Min,
    Max,
    Count,
    Std,
}

impl Aggregation {
    pub fn name(&self) -> &'static str {
        match self {
            Aggregation::Mean => "mean",
            Aggregation::Median => "median",
            Aggregation::Sum => "sum",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Count => "count",
            Aggregation::Std => "std",
        }
    }

    /// `None` when the aggregate is undefined for `values`.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        match self {
            Aggregation::Mean => mean(values),
            Aggregation::Median => Some(median(values)).filter(|m| !m.is_nan()),
            Aggregation::Sum => Some(values.iter().sum()),
            Aggregation::Min => values.iter().copied().reduce(f64::min),
            Aggregation::Max => values.iter().copied().reduce(f64::max),
            Aggregation::Count => Some(values.len() as f64),
            Aggregation::Std => std_deviation(values),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Aggregation {
    type Err = RenewablesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(Aggregation::Mean),
            "median" => Ok(Aggregation::Median),
            "sum" => Ok(Aggregation::Sum),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "count" => Ok(Aggregation::Count),
            "std" => Ok(Aggregation::Std),
            other => Err(RenewablesError::Schema(format!("Unknown aggregation: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub values: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryTable {
    pub group_by: GroupBy,
    pub metric_used: String,
    pub rows: Vec<SummaryRow>,
}

fn group_key(record: &MergedRecord, group_by: GroupBy) -> (Option<String>, Option<i32>) {
    match group_by {
        GroupBy::Region => (Some(record.region.clone()), None),
        GroupBy::Year => (None, Some(record.year)),
        GroupBy::RegionYear => (Some(record.region.clone()), Some(record.year)),
    }
}

/// Aggregates renewable share values per group. An empty aggregation list
/// means mean, min, max and count.
#[instrument(skip(merged))]
pub fn summary_table(
    merged: &MergedDataset,
    filter: &QueryFilter,
    group_by: GroupBy,
    aggregations: &[String],
) -> Result<SummaryTable, RenewablesError> {
    let aggregations: Vec<Aggregation> = if aggregations.is_empty() {
        DEFAULT_AGGREGATIONS.to_vec()
    } else {
        aggregations.iter().map(|a| a.parse()).collect::<Result<_, _>>()?
    };

    let mut groups: BTreeMap<(Option<String>, Option<i32>), Vec<f64>> = BTreeMap::new();
    for (record, value) in points(merged, filter, ValueColumn::Secondary) {
        groups.entry(group_key(record, group_by)).or_default().push(value);
    }
    if groups.is_empty() {
        return Err(no_data("No renewable share data to summarize"));
    }

    let rows = groups
        .into_iter()
        .map(|((region, year), values)| SummaryRow {
            region,
            year,
            values: aggregations
                .iter()
                .map(|agg| (agg.name().to_string(), agg.apply(&values)))
                .collect(),
        })
        .collect();

    Ok(SummaryTable {
        group_by,
        metric_used: SHARE_METRIC.to_string(),
        rows,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMethod {
    MinMax,
    ZScore,
    Percentile,
}

impl FromStr for ScalingMethod {
    type Err = RenewablesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minmax" | "min_max" | "min-max" => Ok(ScalingMethod::MinMax),
            "zscore" | "z_score" | "z-score" => Ok(ScalingMethod::ZScore),
            "percentile" => Ok(ScalingMethod::Percentile),
            other => Err(RenewablesError::InvalidSelection(format!("Unknown scaling method: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaledValue {
    pub region: String,
    pub year: i32,
    pub value: f64,
    pub normalized_value: f64,
}

/// Scales one region's values.
pub fn scale(values: &[f64], method: ScalingMethod) -> Vec<f64> {
    match method {
        ScalingMethod::MinMax => {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let range = max - min;
            values
                .iter()
                .map(|v| if range > 0.0 { (v - min) / range } else { 0.0 })
                .collect()
        }
        ScalingMethod::ZScore => {
            let average = mean(values).unwrap_or_default();
            match std_deviation(values).filter(|s| *s > 0.0) {
                Some(std) => values.iter().map(|v| (v - average) / std).collect(),
                None => vec![0.0; values.len()],
            }
        }
        ScalingMethod::Percentile => percentile_ranks(values),
    }
}

/// Renewable share scaled within each region, ordered by region then year.
#[instrument(skip(merged))]
pub fn scale_by_region(
    merged: &MergedDataset,
    filter: &QueryFilter,
    method: ScalingMethod,
) -> Result<Vec<ScaledValue>, RenewablesError> {
    let mut by_region: BTreeMap<&str, Vec<(i32, f64)>> = BTreeMap::new();
    for (record, value) in points(merged, filter, ValueColumn::Secondary) {
        by_region.entry(record.region.as_str()).or_default().push((record.year, value));
    }
    if by_region.is_empty() {
        return Err(no_data("No renewable share data to scale"));
    }

    let mut scaled = Vec::new();
    for (region, mut rows) in by_region {
        rows.sort_by_key(|(year, _)| *year);
        let values: Vec<f64> = rows.iter().map(|(_, v)| *v).collect();
        for ((year, value), normalized_value) in rows.into_iter().zip(scale(&values, method)) {
            scaled.push(ScaledValue {
                region: region.to_string(),
                year,
                value,
                normalized_value,
            });
        }
    }
    Ok(scaled)
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

    fn merged() -> MergedDataset {
        MergedDataset {
            primary: SourceKind::EnergyBalance,
            secondary: SourceKind::RenewableShare,
            records: vec![
                record("Portugal", 2019, 30.0),
                record("Portugal", 2020, 34.0),
                record("Spain", 2019, 18.0),
                record("Spain", 2020, 18.0),
            ],
        }
    }

    #[test]
    fn summary_by_region_with_default_aggregations() {
        let table = summary_table(&merged(), &QueryFilter::default(), GroupBy::Region, &[]).unwrap();
        assert_eq!(table.rows.len(), 2);
        let portugal = &table.rows[0];
        assert_eq!(portugal.region.as_deref(), Some("Portugal"));
        assert_eq!(portugal.values["mean"], Some(32.0));
        assert_eq!(portugal.values["count"], Some(2.0));
        assert!(!portugal.values.contains_key("median"));
    }

    #[test]
    fn summary_by_year_with_std() {
        let aggs = vec!["std".to_string(), "sum".to_string()];
        let table = summary_table(&merged(), &QueryFilter::default(), GroupBy::Year, &aggs).unwrap();
        assert_eq!(table.rows[0].year, Some(2019));
        assert_eq!(table.rows[0].values["sum"], Some(48.0));
        assert!((table.rows[0].values["std"].unwrap_or_default() - 8.485_281).abs() < 1e-5);
    }

    #[test]
    fn unknown_aggregation_is_schema_error() {
        let aggs = vec!["mode".to_string()];
        let result = summary_table(&merged(), &QueryFilter::default(), GroupBy::Year, &aggs);
        assert!(matches!(result, Err(RenewablesError::Schema(_))));
    }

    #[test]
    fn scaling_handles_constant_series() {
        let scaled = scale_by_region(&merged(), &QueryFilter::default(), ScalingMethod::MinMax).unwrap();
        assert_eq!(scaled.len(), 4);
        assert_eq!(scaled[0].normalized_value, 0.0);
        assert_eq!(scaled[1].normalized_value, 1.0);
        assert_eq!(scaled[2].normalized_value, 0.0);
        assert_eq!(scaled[3].normalized_value, 0.0);

        assert_eq!(scale(&[5.0, 5.0], ScalingMethod::ZScore), vec![0.0, 0.0]);
        assert_eq!(scale(&[1.0, 2.0, 2.0, 3.0], ScalingMethod::Percentile), vec![0.25, 0.625, 0.625, 1.0]);
    }
}
