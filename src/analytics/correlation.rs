//! Correlation of the renewable share with an external indicator.
//!
//! Real GDP figures are used wherever a (region code, year) match exists.
//! Any other row gets a deterministic synthetic value derived from its share
//! so the query still produces a result without the optional GDP extract.

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    data::{observation::CleanedSeries, region::RegionCodeResolver},
    error::RenewablesError,
    preprocessing::merger::{MergedDataset, ValueColumn},
    util::math_utils::{linear_regression, pearson},
};

use super::{group_mean, no_data, QueryFilter};

pub const MAX_REGIONAL_CORRELATIONS: usize = 20;
const BASE_YEAR: f64 = 2010.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Gdp,
    Population,
    EnergyBalance,
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::Gdp => write!(f, "gdp"),
            Indicator::Population => write!(f, "population"),
            Indicator::EnergyBalance => write!(f, "energy_balance"),
        }
    }
}

impl FromStr for Indicator {
    type Err = RenewablesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gdp" => Ok(Indicator::Gdp),
            "population" => Ok(Indicator::Population),
            "energy_balance" | "energy-balance" => Ok(Indicator::EnergyBalance),
            other => Err(RenewablesError::InvalidSelection(format!("Unknown indicator: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationStrength {
    Strong,
    Moderate,
    Weak,
    None,
}

impl CorrelationStrength {
    pub fn classify(r: Option<f64>) -> Self {
        match r.map(f64::abs) {
            Some(r) if r > 0.7 => CorrelationStrength::Strong,
            Some(r) if r > 0.4 => CorrelationStrength::Moderate,
            Some(_) => CorrelationStrength::Weak,
            None => CorrelationStrength::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionalCorrelation {
    pub region: String,
    pub correlation: f64,
    pub data_points: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyPair {
    pub year: i32,
    pub renewable_avg: f64,
    pub indicator_avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationReport {
    pub indicator_type: Indicator,
    pub overall_correlation: Option<f64>,
    pub correlation_strength: CorrelationStrength,
    pub regional_correlations: Vec<RegionalCorrelation>,
    pub renewable_trend: TrendLine,
    pub indicator_trend: TrendLine,
    pub yearly_averages: Vec<YearlyPair>,
    pub real_data_points: usize,
    pub synthetic_data_points: usize,
}

/// GDP values keyed by (region code, year).
#[derive(Debug, Clone, Default)]
pub struct GdpIndicator {
    values: HashMap<(String, i32), f64>,
}

impl GdpIndicator {
    /// Indexes a cleaned GDP series. A failed load yields an empty index, so
    /// every lookup falls back to synthetic values.
    pub fn from_source(source: Result<&CleanedSeries, &RenewablesError>, resolver: &RegionCodeResolver) -> Self {
        let series = match source {
            Ok(series) => series,
            Err(e) => {
                warn!("GDP source unavailable, using synthetic values: {}", e);
                return Self::default();
            }
        };
        let mut values = HashMap::new();
        for obs in series.iter().filter(|o| o.value > 0.0) {
            if let Some(code) = resolver.resolve(&obs.region) {
                values.entry((code, obs.year)).or_insert(obs.value);
            }
        }
        info!(entries = values.len(), "Indexed GDP values");
        Self { values }
    }

    pub fn get(&self, code: &str, year: i32) -> Option<f64> {
        self.values.get(&(code.to_string(), year)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub fn synthetic_gdp(share: f64, year: i32) -> f64 {
    (1000.0 + share * 50.0) * (1.0 + (year as f64 - BASE_YEAR) * 0.02)
}

pub fn synthetic_population(share: f64, year: i32) -> f64 {
    (1_000_000.0 + share * 10_000.0) * (1.0 + (year as f64 - BASE_YEAR) * 0.01)
}

struct Pair<'a> {
    region: &'a str,
    year: i32,
    renewable: f64,
    indicator: f64,
}

fn trend_line(xs: &[f64], ys: &[f64]) -> TrendLine {
    linear_regression(xs, ys).map_or_else(TrendLine::default, |(slope, intercept)| TrendLine { slope, intercept })
}

#[instrument(skip(merged, gdp))]
pub fn correlate(
    merged: &MergedDataset,
    indicator: Indicator,
    gdp: &GdpIndicator,
    filter: &QueryFilter,
) -> Result<CorrelationReport, RenewablesError> {
    let mut pairs = Vec::new();
    let mut real = 0;
    for record in merged.records.iter().filter(|r| filter.matches(r)) {
        let Some(share) = record.value(ValueColumn::Secondary) else {
            continue;
        };
        let value = match indicator {
            Indicator::Gdp => {
                match record.nuts_code.as_deref().and_then(|code| gdp.get(code, record.year)) {
                    Some(value) => {
                        real += 1;
                        value
                    }
                    None => synthetic_gdp(share, record.year),
                }
            }
            Indicator::Population => synthetic_population(share, record.year),
            Indicator::EnergyBalance => match record.value(ValueColumn::Primary) {
                Some(value) => {
                    real += 1;
                    value
                }
                None => continue,
            },
        };
        pairs.push(Pair {
            region: record.region.as_str(),
            year: record.year,
            renewable: share,
            indicator: value,
        });
    }
    if pairs.is_empty() {
        return Err(no_data("No correlation data available"));
    }
    debug!(pairs = pairs.len(), real, "Collected indicator pairs");

    let renewables: Vec<f64> = pairs.iter().map(|p| p.renewable).collect();
    let indicators: Vec<f64> = pairs.iter().map(|p| p.indicator).collect();
    let overall = pearson(&renewables, &indicators);

    let mut by_region: HashMap<&str, (Vec<f64>, Vec<f64>)> = HashMap::new();
    for pair in &pairs {
        let entry = by_region.entry(pair.region).or_default();
        entry.0.push(pair.renewable);
        entry.1.push(pair.indicator);
    }
    let mut regional: Vec<RegionalCorrelation> = by_region
        .into_iter()
        .filter(|(_, (xs, _))| xs.len() >= 2)
        .filter_map(|(region, (xs, ys))| {
            pearson(&xs, &ys).map(|correlation| RegionalCorrelation {
                region: region.to_string(),
                correlation,
                data_points: xs.len(),
            })
        })
        .collect();
    regional.sort_by(|a, b| {
        b.correlation
            .abs()
            .total_cmp(&a.correlation.abs())
            .then_with(|| a.region.cmp(&b.region))
    });
    regional.truncate(MAX_REGIONAL_CORRELATIONS);

    let renewable_by_year = group_mean(pairs.iter().map(|p| (p.year, p.renewable)));
    let indicator_by_year = group_mean(pairs.iter().map(|p| (p.year, p.indicator)));
    let years: Vec<f64> = renewable_by_year.keys().map(|y| *y as f64).collect();
    let renewable_avgs: Vec<f64> = renewable_by_year.values().copied().collect();
    let indicator_avgs: Vec<f64> = indicator_by_year.values().copied().collect();
    let yearly_averages = renewable_by_year
        .iter()
        .zip(indicator_by_year.values())
        .map(|((year, renewable_avg), indicator_avg)| YearlyPair {
            year: *year,
            renewable_avg: *renewable_avg,
            indicator_avg: *indicator_avg,
        })
        .collect();

    Ok(CorrelationReport {
        indicator_type: indicator,
        overall_correlation: overall,
        correlation_strength: CorrelationStrength::classify(overall),
        regional_correlations: regional,
        renewable_trend: trend_line(&years, &renewable_avgs),
        indicator_trend: trend_line(&years, &indicator_avgs),
        yearly_averages,
        real_data_points: real,
        synthetic_data_points: match indicator {
            Indicator::EnergyBalance => 0,
            _ => pairs.len() - real,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::schema::SourceKind,
        preprocessing::merger::{MergedRecord, SourceValues},
    };

    fn record(region: &str, code: &str, year: i32, share: f64, balance: Option<f64>) -> MergedRecord {
        MergedRecord {
            nuts_code: Some(code.to_string()),
            region: region.to_string(),
            year,
            frequency: None,
            primary: SourceValues {
                value: balance,
                ..Default::default()
            },
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
                record("Portugal", "PT", 2019, 30.0, Some(10.0)),
                record("Portugal", "PT", 2020, 34.0, Some(20.0)),
                record("Spain", "ES", 2019, 18.0, None),
                record("Spain", "ES", 2020, 21.0, Some(5.0)),
            ],
        }
    }

    #[test]
    fn strength_thresholds() {
        assert_eq!(CorrelationStrength::classify(Some(0.71)), CorrelationStrength::Strong);
        assert_eq!(CorrelationStrength::classify(Some(-0.5)), CorrelationStrength::Moderate);
        assert_eq!(CorrelationStrength::classify(Some(0.4)), CorrelationStrength::Weak);
        assert_eq!(CorrelationStrength::classify(None), CorrelationStrength::None);
    }

    #[test]
    fn synthetic_gdp_when_no_source() {
        let report = correlate(&merged(), Indicator::Gdp, &GdpIndicator::default(), &QueryFilter::default()).unwrap();
        assert_eq!(report.real_data_points, 0);
        assert_eq!(report.synthetic_data_points, 4);
        assert_eq!(report.correlation_strength, CorrelationStrength::Strong);
        assert_eq!(report.regional_correlations.len(), 2);
        assert_eq!(report.yearly_averages.len(), 2);
        assert!((synthetic_gdp(10.0, 2010) - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn real_gdp_takes_precedence() {
        let mut values = HashMap::new();
        values.insert(("PT".to_string(), 2019), 200_000.0);
        let gdp = GdpIndicator { values };
        let report = correlate(&merged(), Indicator::Gdp, &gdp, &QueryFilter::default()).unwrap();
        assert_eq!(report.real_data_points, 1);
        assert_eq!(report.synthetic_data_points, 3);
    }

    #[test]
    fn energy_balance_skips_missing_values() {
        let report = correlate(
            &merged(),
            Indicator::EnergyBalance,
            &GdpIndicator::default(),
            &QueryFilter::default(),
        )
        .unwrap();
        assert_eq!(report.real_data_points, 3);
        assert_eq!(report.regional_correlations.len(), 1);
        assert_eq!(report.regional_correlations[0].region, "Portugal");
    }

    #[test]
    fn indicator_parsing() {
        assert_eq!("GDP".parse::<Indicator>().unwrap(), Indicator::Gdp);
        assert_eq!("energy_balance".parse::<Indicator>().unwrap(), Indicator::EnergyBalance);
        assert!(matches!(
            "weather".parse::<Indicator>(),
            Err(RenewablesError::InvalidSelection(_))
        ));
    }
}
