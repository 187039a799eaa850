//! Read-only queries over prepared data.
//!
//! Every query is a plain function returning `Result`. [`AnalyticsEngine`]
//! wraps them and folds errors into [`Analysis::Unavailable`], so one failing
//! query never prevents another from running.

pub mod correlation;
pub mod filtered;
pub mod forecast;
pub mod ranking;
pub mod sources;
pub mod summary;
pub mod trend;

use std::collections::{BTreeMap, BTreeSet};

use derive_builder::Builder;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    config::RenewablesConfig,
    data::{observation::CleanedSeries, region::RegionCodeResolver, schema::SourceKind},
    error::RenewablesError,
    preprocessing::{
        merger::{MergedDataset, MergedRecord, ValueColumn},
        orchestrator::PreparedData,
    },
};

use self::{
    correlation::{CorrelationReport, GdpIndicator, Indicator},
    filtered::{SourceValue, YearValue},
    forecast::ForecastReport,
    ranking::RegionRanking,
    sources::SourceComparison,
    summary::{GroupBy, ScaledValue, ScalingMethod, SummaryTable},
    trend::TrendReport,
};

/// Optional restrictions shared by every query.
#[derive(Debug, Clone, Default, PartialEq, Builder)]
#[builder(default)]
pub struct QueryFilter {
    #[builder(setter(into, strip_option))]
    pub year_from: Option<i32>,
    #[builder(setter(into, strip_option))]
    pub year_to: Option<i32>,
    /// Exact region name or region code, case-insensitive.
    #[builder(setter(into, strip_option))]
    pub region: Option<String>,
    /// Case-insensitive substring of the region name.
    #[builder(setter(into, strip_option))]
    pub country: Option<String>,
}

impl QueryFilter {
    pub fn matches_year(&self, year: i32) -> bool {
        self.year_from.map_or(true, |from| year >= from) && self.year_to.map_or(true, |to| year <= to)
    }

    pub fn matches_region(&self, region: &str, code: Option<&str>) -> bool {
        let region_ok = self.region.as_deref().map_or(true, |wanted| {
            region.eq_ignore_ascii_case(wanted) || code.is_some_and(|c| c.eq_ignore_ascii_case(wanted))
        });
        let country_ok = self
            .country
            .as_deref()
            .map_or(true, |needle| region.to_lowercase().contains(&needle.to_lowercase()));
        region_ok && country_ok
    }

    pub fn matches(&self, record: &MergedRecord) -> bool {
        self.matches_year(record.year) && self.matches_region(&record.region, record.nuts_code.as_deref())
    }
}

/// A query outcome: the report, or a marker the caller can render as an
/// empty state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Analysis<T> {
    Report(T),
    Unavailable { error: String },
}

impl<T> Analysis<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Analysis::Report(_))
    }

    pub fn report(&self) -> Option<&T> {
        match self {
            Analysis::Report(report) => Some(report),
            Analysis::Unavailable { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Analysis::Report(_) => None,
            Analysis::Unavailable { error } => Some(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Analysis<U> {
        match self {
            Analysis::Report(report) => Analysis::Report(f(report)),
            Analysis::Unavailable { error } => Analysis::Unavailable { error },
        }
    }
}

impl<T> From<Result<T, RenewablesError>> for Analysis<T> {
    fn from(result: Result<T, RenewablesError>) -> Self {
        match result {
            Ok(report) => Analysis::Report(report),
            Err(e) => {
                warn!("Query returned no result: {}", e);
                Analysis::Unavailable { error: e.to_string() }
            }
        }
    }
}

/// The closed set of core query outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisResult {
    Trend(TrendReport),
    SourceComparison(SourceComparison),
    Ranking(RegionRanking),
    Correlation(CorrelationReport),
    Forecast(ForecastReport),
}

/// One of the five core queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Query {
    Trend,
    SourceComparison,
    Ranking,
    Correlation(Indicator),
    Forecast { years: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RegionEntry {
    pub region: String,
    pub nuts_code: Option<String>,
}

pub(crate) fn no_data(context: impl Into<String>) -> RenewablesError {
    RenewablesError::InsufficientData {
        got: 0,
        required: 1,
        context: context.into(),
    }
}

/// Filtered (record, value) pairs for rows where `column` has a value.
pub(crate) fn points<'a>(
    merged: &'a MergedDataset,
    filter: &QueryFilter,
    column: ValueColumn,
) -> Vec<(&'a MergedRecord, f64)> {
    merged
        .records
        .iter()
        .filter(|r| filter.matches(r))
        .filter_map(|r| r.value(column).map(|v| (r, v)))
        .collect()
}

/// Mean per key, keys in ascending order.
pub(crate) fn group_mean<K: Ord>(pairs: impl IntoIterator<Item = (K, f64)>) -> BTreeMap<K, f64> {
    let mut sums: BTreeMap<K, (f64, usize)> = BTreeMap::new();
    for (key, value) in pairs {
        let entry = sums.entry(key).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(key, (sum, count))| (key, sum / count as f64))
        .collect()
}

/// Read-only queries bound to one preparation result.
pub struct AnalyticsEngine<'a> {
    data: &'a PreparedData,
    config: &'a RenewablesConfig,
    resolver: RegionCodeResolver<'a>,
}

impl<'a> AnalyticsEngine<'a> {
    pub fn new(data: &'a PreparedData, config: &'a RenewablesConfig, resolver: RegionCodeResolver<'a>) -> Self {
        Self {
            data,
            config,
            resolver,
        }
    }

    pub fn merged(&self) -> &MergedDataset {
        &self.data.merged
    }

    fn energy_balance(&self) -> Result<&'a CleanedSeries, RenewablesError> {
        self.data
            .cleaned(SourceKind::EnergyBalance)
            .ok_or_else(|| RenewablesError::NotFound("No cleaned energy balance series".to_string()))
    }

    pub fn run(&self, query: Query, filter: &QueryFilter) -> Analysis<AnalysisResult> {
        debug!(?query, ?filter, "Running query");
        match query {
            Query::Trend => self.global_trend(filter).map(AnalysisResult::Trend),
            Query::SourceComparison => self.compare_sources(filter).map(AnalysisResult::SourceComparison),
            Query::Ranking => self.rank_regions(filter).map(AnalysisResult::Ranking),
            Query::Correlation(indicator) => self.correlate(indicator, filter).map(AnalysisResult::Correlation),
            Query::Forecast { years } => self.forecast(filter, years).map(AnalysisResult::Forecast),
        }
    }

    pub fn global_trend(&self, filter: &QueryFilter) -> Analysis<TrendReport> {
        trend::global_trend(self.merged(), filter).into()
    }

    pub fn compare_sources(&self, filter: &QueryFilter) -> Analysis<SourceComparison> {
        self.energy_balance()
            .and_then(|energy| {
                sources::compare_sources(energy, self.merged(), filter, &self.config.total_source_type)
            })
            .into()
    }

    pub fn rank_regions(&self, filter: &QueryFilter) -> Analysis<RegionRanking> {
        ranking::rank_regions(self.merged(), filter).into()
    }

    pub fn correlate(&self, indicator: Indicator, filter: &QueryFilter) -> Analysis<CorrelationReport> {
        let gdp = GdpIndicator::from_source(self.data.gdp.as_ref(), &self.resolver);
        correlation::correlate(self.merged(), indicator, &gdp, filter).into()
    }

    pub fn forecast(&self, filter: &QueryFilter, years: usize) -> Analysis<ForecastReport> {
        forecast::forecast(self.merged(), filter, years).into()
    }

    pub fn summary_table(&self, filter: &QueryFilter, group_by: GroupBy, aggregations: &[String]) -> Analysis<SummaryTable> {
        summary::summary_table(self.merged(), filter, group_by, aggregations).into()
    }

    pub fn scale_by_region(&self, filter: &QueryFilter, method: ScalingMethod) -> Analysis<Vec<ScaledValue>> {
        summary::scale_by_region(self.merged(), filter, method).into()
    }

    pub fn yearly_trends_by_regions(
        &self,
        regions: &[String],
        filter: &QueryFilter,
    ) -> Analysis<BTreeMap<String, Vec<YearValue>>> {
        self.energy_balance()
            .and_then(|energy| filtered::yearly_trends_by_regions(energy, regions, filter, &self.config.total_source_type))
            .into()
    }

    pub fn sources_by_regions(
        &self,
        regions: &[String],
        filter: &QueryFilter,
    ) -> Analysis<BTreeMap<String, Vec<SourceValue>>> {
        self.energy_balance()
            .and_then(|energy| filtered::sources_by_regions(energy, regions, filter, &self.config.total_source_type))
            .into()
    }

    pub fn series_by_energy_type(
        &self,
        energy_type: &str,
        regions: &[String],
        filter: &QueryFilter,
    ) -> Analysis<BTreeMap<String, Vec<YearValue>>> {
        self.energy_balance()
            .and_then(|energy| {
                filtered::series_by_energy_type(energy, energy_type, regions, filter, &self.config.total_source_type)
            })
            .into()
    }

    /// Distinct regions of the merged dataset, sorted by name.
    pub fn regions(&self) -> Vec<RegionEntry> {
        self.merged()
            .records
            .iter()
            .map(|r| RegionEntry {
                region: r.region.clone(),
                nuts_code: r.nuts_code.clone(),
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_builder_and_matching() {
        let filter = QueryFilterBuilder::default()
            .year_from(2015)
            .year_to(2020)
            .country("port")
            .build()
            .unwrap();
        assert!(filter.matches_year(2015));
        assert!(!filter.matches_year(2021));
        assert!(filter.matches_region("Portugal", Some("PT")));
        assert!(!filter.matches_region("Spain", Some("ES")));

        let by_code = QueryFilterBuilder::default().region("pt").build().unwrap();
        assert!(by_code.matches_region("Portugal", Some("PT")));
        assert!(!by_code.matches_region("Portugal", None));
    }

    #[test]
    fn errors_become_unavailable_markers() {
        let analysis: Analysis<u32> = Err(no_data("nothing here")).into();
        assert!(!analysis.is_available());
        assert!(analysis.error().unwrap_or_default().contains("nothing here"));
        let json = serde_json::to_value(&analysis).unwrap();
        assert!(json.get("error").is_some());

        let ok: Analysis<u32> = Ok(3).into();
        assert_eq!(ok.report(), Some(&3));
    }

    #[test]
    fn group_mean_orders_keys() {
        let means = group_mean(vec![(2021, 4.0), (2020, 1.0), (2021, 6.0)]);
        assert_eq!(means.into_iter().collect::<Vec<_>>(), vec![(2020, 1.0), (2021, 5.0)]);
    }
}
