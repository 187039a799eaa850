//! Region and energy-type views over the cleaned energy balance series.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::instrument;

use crate::{
    data::observation::{CleanedSeries, Observation},
    error::RenewablesError,
};

use super::{group_mean, no_data, QueryFilter};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearValue {
    pub year: i32,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceValue {
    pub source: String,
    pub value: f64,
}

fn selected(regions: &[String], region: &str) -> bool {
    regions.is_empty() || regions.iter().any(|r| r.trim().eq_ignore_ascii_case(region))
}

/// Non-total observations inside `filter` and the requested regions.
fn matching<'a>(
    energy: &'a CleanedSeries,
    regions: &'a [String],
    filter: &'a QueryFilter,
    total_source_type: &'a str,
) -> impl Iterator<Item = &'a Observation> + 'a {
    energy.iter().filter(move |obs| {
        obs.source_type.as_deref() != Some(total_source_type)
            && filter.matches_year(obs.year)
            && filter.matches_region(&obs.region, None)
            && selected(regions, &obs.region)
    })
}

fn yearly_sums<'a>(rows: impl Iterator<Item = &'a Observation>) -> BTreeMap<String, Vec<YearValue>> {
    let mut sums: BTreeMap<String, BTreeMap<i32, f64>> = BTreeMap::new();
    for obs in rows {
        *sums.entry(obs.region.clone()).or_default().entry(obs.year).or_insert(0.0) += obs.value;
    }
    sums.into_iter()
        .map(|(region, years)| {
            let series: Vec<YearValue> = years.into_iter().map(|(year, value)| YearValue { year, value }).collect();
            (region, series)
        })
        .collect()
}

/// Mean energy value per year for each requested region.
#[instrument(skip(energy))]
pub fn yearly_trends_by_regions(
    energy: &CleanedSeries,
    regions: &[String],
    filter: &QueryFilter,
    total_source_type: &str,
) -> Result<BTreeMap<String, Vec<YearValue>>, RenewablesError> {
    let mut by_region: BTreeMap<&str, Vec<(i32, f64)>> = BTreeMap::new();
    for obs in matching(energy, regions, filter, total_source_type) {
        by_region.entry(obs.region.as_str()).or_default().push((obs.year, obs.value));
    }
    if by_region.is_empty() {
        return Err(no_data("No energy data for the requested regions"));
    }
    Ok(by_region
        .into_iter()
        .map(|(region, rows)| {
            let series: Vec<YearValue> = group_mean(rows)
                .into_iter()
                .map(|(year, value)| YearValue { year, value })
                .collect();
            (region.to_string(), series)
        })
        .collect())
}

/// Summed energy value per source type for each requested region, largest first.
#[instrument(skip(energy))]
pub fn sources_by_regions(
    energy: &CleanedSeries,
    regions: &[String],
    filter: &QueryFilter,
    total_source_type: &str,
) -> Result<BTreeMap<String, Vec<SourceValue>>, RenewablesError> {
    let mut sums: BTreeMap<&str, BTreeMap<&str, f64>> = BTreeMap::new();
    for obs in matching(energy, regions, filter, total_source_type) {
        let Some(source) = obs.source_type.as_deref() else {
            continue;
        };
        *sums.entry(obs.region.as_str()).or_default().entry(source).or_insert(0.0) += obs.value;
    }
    if sums.is_empty() {
        return Err(no_data("No energy source data for the requested regions"));
    }
    Ok(sums
        .into_iter()
        .map(|(region, sources)| {
            let mut values: Vec<SourceValue> = sources
                .into_iter()
                .map(|(source, value)| SourceValue {
                    source: source.to_string(),
                    value,
                })
                .collect();
            values.sort_by(|a, b| b.value.total_cmp(&a.value));
            (region.to_string(), values)
        })
        .collect())
}

/// Yearly sums of the source types whose name contains `energy_type`,
/// case-insensitive. An empty region list means every region.
#[instrument(skip(energy))]
pub fn series_by_energy_type(
    energy: &CleanedSeries,
    energy_type: &str,
    regions: &[String],
    filter: &QueryFilter,
    total_source_type: &str,
) -> Result<BTreeMap<String, Vec<YearValue>>, RenewablesError> {
    let needle = energy_type.trim().to_lowercase();
    let series = yearly_sums(matching(energy, regions, filter, total_source_type).filter(|obs| {
        obs.source_type
            .as_deref()
            .is_some_and(|s| s.to_lowercase().contains(&needle))
    }));
    if series.is_empty() {
        return Err(no_data(format!("No data for energy type '{}'", energy_type)));
    }
    Ok(series)
}
