use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    error::RenewablesError,
    preprocessing::merger::{MergedDataset, ValueColumn},
    util::math_utils::{linear_regression, r_squared},
};

use super::{
    group_mean, points,
    trend::{YearlyAverage, SHARE_METRIC},
    QueryFilter,
};

/// Forecasts target a percentage.
pub const VALUE_DOMAIN: (f64, f64) = (0.0, 100.0);

/// Longest accepted forecast horizon in years.
pub const MAX_HORIZON_YEARS: usize = 100;

/// Rejects horizons outside `1..=MAX_HORIZON_YEARS`.
pub fn check_horizon(years: usize) -> Result<i32, RenewablesError> {
    i32::try_from(years)
        .ok()
        .filter(|y| (1..=MAX_HORIZON_YEARS as i32).contains(y))
        .ok_or_else(|| {
            RenewablesError::InvalidArgument(format!(
                "Forecast horizon must be between 1 and {} years, got {}",
                MAX_HORIZON_YEARS, years
            ))
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub year: i32,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub historical: Vec<YearlyAverage>,
    pub forecast: Vec<ForecastPoint>,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub horizon_years: usize,
    pub metric_used: String,
}

/// Extrapolates a regression line fitted to yearly averages.
pub fn forecast_yearly(historical: Vec<YearlyAverage>, years: usize) -> Result<ForecastReport, RenewablesError> {
    let horizon = check_horizon(years)?;
    let insufficient = |got: usize| RenewablesError::InsufficientData {
        got,
        required: 2,
        context: "Forecasting needs at least two years of history".to_string(),
    };
    if historical.len() < 2 {
        return Err(insufficient(historical.len()));
    }
    let xs: Vec<f64> = historical.iter().map(|p| p.year as f64).collect();
    let ys: Vec<f64> = historical.iter().map(|p| p.average_value).collect();
    let (slope, intercept) = linear_regression(&xs, &ys).ok_or_else(|| insufficient(historical.len()))?;
    let fit = r_squared(&xs, &ys, slope, intercept);

    let last_year = historical.last().map_or(0, |p| p.year);
    let forecast = (1..=horizon)
        .map(|offset| {
            let year = last_year.checked_add(offset).ok_or_else(|| {
                RenewablesError::InvalidArgument(format!("Forecast year overflows after {}", last_year))
            })?;
            let predicted = slope * year as f64 + intercept;
            Ok(ForecastPoint {
                year,
                value: predicted.clamp(VALUE_DOMAIN.0, VALUE_DOMAIN.1),
            })
        })
        .collect::<Result<Vec<_>, RenewablesError>>()?;
    debug!(slope, intercept, r_squared = fit, "Fitted forecast line");

    Ok(ForecastReport {
        historical,
        forecast,
        slope,
        intercept,
        r_squared: fit,
        horizon_years: years,
        metric_used: SHARE_METRIC.to_string(),
    })
}

/// Renewable share forecast for the next `years` years.
#[instrument(skip(merged))]
pub fn forecast(merged: &MergedDataset, filter: &QueryFilter, years: usize) -> Result<ForecastReport, RenewablesError> {
    let historical: Vec<YearlyAverage> = group_mean(
        points(merged, filter, ValueColumn::Secondary)
            .into_iter()
            .map(|(r, v)| (r.year, v)),
    )
    .into_iter()
    .map(|(year, average_value)| YearlyAverage { year, average_value })
    .collect();
    forecast_yearly(historical, years)
}
