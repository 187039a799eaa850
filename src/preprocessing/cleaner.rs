use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    data::{
        observation::{CleanedSeries, Observation},
        schema::{Role, SourceSchema},
        table::RawTable,
    },
    error::RenewablesError,
};

/// Case-insensitive substrings marking supranational aggregates.
pub const AGGREGATE_PATTERNS: [&str; 5] = ["union", "european", "countries", "euro area", "eurozone"];

pub fn is_aggregate_region(region: &str) -> bool {
    let lower = region.to_lowercase();
    AGGREGATE_PATTERNS.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningStats {
    pub source: String,
    pub rows_before: usize,
    pub rows_after: usize,
    pub rows_removed_missing: usize,
    pub rows_removed_aggregate: usize,
    pub rows_removed_duplicate: usize,
    pub removed_regions: Vec<String>,
}

struct Projection {
    region: usize,
    year: usize,
    value: usize,
    frequency: Option<usize>,
    category: Option<usize>,
    source_type: Option<usize>,
    unit: Option<usize>,
    last_update: Option<usize>,
}

impl Projection {
    fn new(table: &RawTable, schema: &SourceSchema) -> Result<Self, RenewablesError> {
        let required = |role: Role| -> Result<usize, RenewablesError> {
            let name = schema.required(role)?;
            table.column_index(name).ok_or_else(|| {
                RenewablesError::Schema(format!(
                    "{} has no {} column (found: {})",
                    table.path().display(),
                    name,
                    table.headers().join(", ")
                ))
            })
        };
        let optional = |role: Role| -> Option<usize> {
            let name = schema.column(role)?;
            let idx = table.column_index(name);
            if idx.is_none() {
                warn!(column = name, source = %schema.kind, "Declared column absent, reading as empty");
            }
            idx
        };
        Ok(Self {
            region: required(Role::Region)?,
            year: required(Role::Year)?,
            value: required(Role::Value)?,
            frequency: optional(Role::Frequency),
            category: optional(Role::Category),
            source_type: optional(Role::SourceType),
            unit: optional(Role::Unit),
            last_update: optional(Role::LastUpdate),
        })
    }
}

fn parse_year(raw: &str) -> Option<i32> {
    let year = raw.parse::<f64>().ok()?;
    if year.is_finite() && year.fract() == 0.0 && year.abs() < i32::MAX as f64 {
        Some(year as i32)
    } else {
        None
    }
}

fn parse_value(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Projects, coerces, filters and deduplicates one raw extract.
///
/// The input table is not modified. Duplicates are resolved by keeping the
/// first occurrence in file order.
#[instrument(skip(table, schema), fields(source = %schema.kind, rows = table.len()))]
pub fn clean(
    table: &RawTable,
    schema: &SourceSchema,
) -> Result<(CleanedSeries, CleaningStats), RenewablesError> {
    let projection = Projection::new(table, schema)?;
    let dedup_roles = schema.dedup_roles();

    let mut stats = CleaningStats {
        source: schema.kind.to_string(),
        rows_before: table.len(),
        ..Default::default()
    };
    let mut removed_regions = BTreeSet::new();
    let mut seen = HashSet::new();
    let mut observations = Vec::new();

    for row in 0..table.len() {
        let text = |idx: Option<usize>| idx.and_then(|i| table.cell(row, i)).map(str::to_string);
        let region = table.cell(row, projection.region);
        let year = table.cell(row, projection.year).and_then(parse_year);
        let value = table.cell(row, projection.value).and_then(parse_value);
        let (Some(region), Some(year), Some(value)) = (region, year, value) else {
            stats.rows_removed_missing += 1;
            continue;
        };

        let region = region.to_string();
        if is_aggregate_region(&region) {
            stats.rows_removed_aggregate += 1;
            removed_regions.insert(region);
            continue;
        }

        let observation = Observation {
            region,
            year,
            value,
            frequency: text(projection.frequency),
            category: text(projection.category),
            source_type: text(projection.source_type),
            unit: text(projection.unit),
            last_update: text(projection.last_update),
        };

        let key: (i32, Vec<Option<String>>) = (
            observation.year,
            dedup_roles
                .iter()
                .filter(|role| **role != Role::Year)
                .map(|role| observation.text(*role).map(str::to_string))
                .collect(),
        );
        if !seen.insert(key) {
            stats.rows_removed_duplicate += 1;
            continue;
        }
        observations.push(observation);
    }

    stats.rows_after = observations.len();
    stats.removed_regions = removed_regions.into_iter().collect();
    if !stats.removed_regions.is_empty() {
        debug!(regions = ?stats.removed_regions, "Removed aggregate regions");
    }
    info!(
        rows_before = stats.rows_before,
        rows_after = stats.rows_after,
        missing = stats.rows_removed_missing,
        aggregate = stats.rows_removed_aggregate,
        duplicate = stats.rows_removed_duplicate,
        "Cleaned source"
    );
    Ok((CleanedSeries::new(schema.clone(), observations), stats))
}
