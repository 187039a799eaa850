use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::merger::{MergedRecord, ValueColumn};

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

/// How gaps in a region's series are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingStrategy {
    #[default]
    Interpolate,
    ForwardFill,
    BackwardFill,
    Zero,
    Drop,
}

impl fmt::Display for MissingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissingStrategy::Interpolate => "interpolate",
            MissingStrategy::ForwardFill => "forward_fill",
            MissingStrategy::BackwardFill => "backward_fill",
            MissingStrategy::Zero => "zero",
            MissingStrategy::Drop => "drop",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub missing_values_filled: usize,
    pub rows_removed: usize,
    pub invalid_years_removed: usize,
}

/// Fills gaps in `column` within each region's year-ordered series, then drops
/// rows whose year falls outside [`MIN_YEAR`, `MAX_YEAR`].
///
/// Records come back sorted by (region, year). A region's values are never
/// used to fill another region.
#[instrument(skip(records), fields(rows = records.len()))]
pub fn normalize(
    mut records: Vec<MergedRecord>,
    column: ValueColumn,
    strategy: MissingStrategy,
) -> (Vec<MergedRecord>, NormalizationStats) {
    let mut stats = NormalizationStats::default();
    records.sort_by(|a, b| a.region.cmp(&b.region).then(a.year.cmp(&b.year)));

    let mut start = 0;
    while start < records.len() {
        let end = records[start..]
            .iter()
            .position(|r| r.region != records[start].region)
            .map_or(records.len(), |offset| start + offset);
        stats.missing_values_filled += fill_region(&mut records[start..end], column, strategy);
        start = end;
    }

    if strategy == MissingStrategy::Drop {
        let before = records.len();
        records.retain(|r| r.value(column).is_some());
        stats.rows_removed = before - records.len();
    }

    let before = records.len();
    records.retain(|r| (MIN_YEAR..=MAX_YEAR).contains(&r.year));
    stats.invalid_years_removed = before - records.len();

    debug!(
        filled = stats.missing_values_filled,
        removed = stats.rows_removed,
        invalid_years = stats.invalid_years_removed,
        "Normalized value column"
    );
    (records, stats)
}

/// Fills one region's slice in place and returns how many values were filled.
fn fill_region(group: &mut [MergedRecord], column: ValueColumn, strategy: MissingStrategy) -> usize {
    let values: Vec<Option<f64>> = group.iter().map(|r| r.value(column)).collect();
    let filled = match strategy {
        MissingStrategy::Interpolate => interpolate(group, &values),
        MissingStrategy::ForwardFill => carry(&values, false),
        MissingStrategy::BackwardFill => carry(&values, true),
        MissingStrategy::Zero => values.iter().map(|v| Some(v.unwrap_or(0.0))).collect(),
        MissingStrategy::Drop => return 0,
    };
    let mut count = 0;
    for (record, (old, new)) in group.iter_mut().zip(values.iter().zip(filled)) {
        if old.is_none() && new.is_some() {
            record.set_value(column, new);
            count += 1;
        }
    }
    count
}

/// Linear in the year; gaps touching either edge take the nearest observed value.
fn interpolate(group: &[MergedRecord], values: &[Option<f64>]) -> Vec<Option<f64>> {
    let known: Vec<(f64, f64)> = group
        .iter()
        .zip(values)
        .filter_map(|(r, v)| v.map(|v| (r.year as f64, v)))
        .collect();
    if known.is_empty() {
        return values.to_vec();
    }

    group
        .iter()
        .zip(values)
        .map(|(record, value)| {
            if value.is_some() {
                return *value;
            }
            let x = record.year as f64;
            let next = known.iter().position(|(kx, _)| *kx > x);
            let filled = match next {
                Some(0) => known[0].1,
                Some(i) => {
                    let (x0, y0) = known[i - 1];
                    let (x1, y1) = known[i];
                    if x1 == x0 {
                        y0
                    } else {
                        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
                    }
                }
                None => known[known.len() - 1].1,
            };
            Some(filled)
        })
        .collect()
}

fn carry(values: &[Option<f64>], backward: bool) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    let mut last = None;
    let indices: Box<dyn Iterator<Item = usize>> = if backward {
        Box::new((0..values.len()).rev())
    } else {
        Box::new(0..values.len())
    };
    for i in indices {
        match out[i] {
            Some(v) => last = Some(v),
            None => out[i] = last,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::merger::SourceValues;

    fn record(region: &str, year: i32, value: Option<f64>) -> MergedRecord {
        MergedRecord {
            nuts_code: None,
            region: region.to_string(),
            year,
            frequency: None,
            primary: SourceValues {
                value,
                ..Default::default()
            },
            secondary: SourceValues::default(),
        }
    }

    fn values(records: &[MergedRecord]) -> Vec<Option<f64>> {
        records.iter().map(|r| r.primary.value).collect()
    }

    #[test]
    fn interpolates_middle_gap() {
        let records = vec![
            record("X", 2020, Some(5.0)),
            record("X", 2021, None),
            record("X", 2022, Some(15.0)),
        ];
        let (out, stats) = normalize(records, ValueColumn::Primary, MissingStrategy::Interpolate);
        assert_eq!(values(&out), vec![Some(5.0), Some(10.0), Some(15.0)]);
        assert_eq!(stats.missing_values_filled, 1);
    }

    #[test]
    fn interpolation_uses_year_spacing_and_edges() {
        let records = vec![
            record("X", 2010, None),
            record("X", 2011, Some(2.0)),
            record("X", 2012, None),
            record("X", 2015, Some(8.0)),
            record("X", 2016, None),
        ];
        let (out, _) = normalize(records, ValueColumn::Primary, MissingStrategy::Interpolate);
        assert_eq!(
            values(&out),
            vec![Some(2.0), Some(2.0), Some(3.5), Some(8.0), Some(8.0)]
        );
    }

    #[test]
    fn regions_are_filled_independently() {
        let records = vec![
            record("B", 2021, None),
            record("A", 2020, Some(1.0)),
            record("B", 2020, None),
            record("A", 2021, None),
        ];
        let (out, stats) = normalize(records, ValueColumn::Primary, MissingStrategy::ForwardFill);
        assert_eq!(out[0].region, "A");
        assert_eq!(values(&out), vec![Some(1.0), Some(1.0), None, None]);
        assert_eq!(stats.missing_values_filled, 1);
    }

    #[test]
    fn backward_fill_and_zero() {
        let records = vec![record("X", 2020, None), record("X", 2021, Some(4.0)), record("X", 2022, None)];
        let (out, _) = normalize(records.clone(), ValueColumn::Primary, MissingStrategy::BackwardFill);
        assert_eq!(values(&out), vec![Some(4.0), Some(4.0), None]);

        let (out, stats) = normalize(records, ValueColumn::Primary, MissingStrategy::Zero);
        assert_eq!(values(&out), vec![Some(0.0), Some(4.0), Some(0.0)]);
        assert_eq!(stats.missing_values_filled, 2);
    }

    #[test]
    fn drop_and_invalid_years() {
        let records = vec![
            record("X", 1850, Some(1.0)),
            record("X", 2020, None),
            record("X", 2021, Some(3.0)),
            record("X", 2150, Some(4.0)),
        ];
        let (out, stats) = normalize(records, ValueColumn::Primary, MissingStrategy::Drop);
        assert_eq!(out.len(), 1);
        assert_eq!(stats.rows_removed, 1);
        assert_eq!(stats.invalid_years_removed, 2);
    }

    #[test]
    fn secondary_column_is_left_alone_when_normalizing_primary() {
        let mut r = record("X", 2020, Some(1.0));
        r.secondary.value = None;
        let (out, _) = normalize(vec![r], ValueColumn::Primary, MissingStrategy::Zero);
        assert_eq!(out[0].secondary.value, None);
    }

    #[test]
    fn strategy_names_deserialize() {
        let strategy: MissingStrategy = serde_yaml::from_str("backward_fill").unwrap();
        assert_eq!(strategy, MissingStrategy::BackwardFill);
        assert_eq!(MissingStrategy::default().to_string(), "interpolate");
    }
}
