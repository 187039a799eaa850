//! Reconciles the base source and the joined source into one row per
//! (region, year).

use std::{
    collections::{hash_map::Entry, HashMap},
    fs,
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    config::RenewablesConfig,
    data::{
        loader::read_table,
        observation::{format_value, tmp_path, CleanedSeries, Observation},
        schema::{Role, SourceKind, SourceSchema},
    },
    error::RenewablesError,
};

/// Domain values that pick the pre-aggregated rows of the base source.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSettings {
    pub primary_category: String,
    pub total_source_type: String,
    pub canonical_unit: String,
}

impl From<&RenewablesConfig> for MergeSettings {
    fn from(config: &RenewablesConfig) -> Self {
        Self {
            primary_category: config.primary_category.clone(),
            total_source_type: config.total_source_type.clone(),
            canonical_unit: config.canonical_unit.clone(),
        }
    }
}

/// Which source's value a computation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueColumn {
    Primary,
    Secondary,
}

/// Fields carried over from one source, suffixed with its id when persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceValues {
    pub value: Option<f64>,
    pub last_update: Option<String>,
    pub unit: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub nuts_code: Option<String>,
    pub region: String,
    pub year: i32,
    pub frequency: Option<String>,
    pub primary: SourceValues,
    pub secondary: SourceValues,
}

impl MergedRecord {
    pub fn value(&self, column: ValueColumn) -> Option<f64> {
        match column {
            ValueColumn::Primary => self.primary.value,
            ValueColumn::Secondary => self.secondary.value,
        }
    }

    pub fn set_value(&mut self, column: ValueColumn, value: Option<f64>) {
        match column {
            ValueColumn::Primary => self.primary.value = value,
            ValueColumn::Secondary => self.secondary.value = value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeStats {
    pub primary_rows: usize,
    pub primary_rows_after_filter: usize,
    pub primary_duplicates_resolved: usize,
    pub secondary_rows: usize,
    pub secondary_duplicates_dropped: usize,
    pub matched_rows: usize,
    pub unmatched_rows: usize,
    pub merged_rows: usize,
}

/// Merged rows plus the two sources they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDataset {
    pub primary: SourceKind,
    pub secondary: SourceKind,
    pub records: Vec<MergedRecord>,
}

type Key = (String, i32);

fn ensure_keys(schema: &SourceSchema) -> Result<(), RenewablesError> {
    if schema.has(Role::Region) && schema.has(Role::Year) {
        Ok(())
    } else {
        Err(RenewablesError::Schema(format!(
            "No common (region, year) key columns between sources: {} lacks one",
            schema.kind
        )))
    }
}

fn source_values(obs: &Observation, keep_category: bool) -> SourceValues {
    SourceValues {
        value: Some(obs.value),
        last_update: obs.last_update.clone(),
        unit: obs.unit.clone(),
        category: if keep_category { obs.category.clone() } else { None },
    }
}

/// Left-joins `secondary` onto the filtered, key-unique `primary` rows.
///
/// The result has exactly one row per distinct primary (region, year), in
/// order of first appearance in the primary source.
#[instrument(skip_all, fields(primary = %primary.kind(), secondary = %secondary.kind()))]
pub fn merge(
    primary: &CleanedSeries,
    secondary: &CleanedSeries,
    settings: &MergeSettings,
) -> Result<(MergedDataset, MergeStats), RenewablesError> {
    ensure_keys(&primary.schema)?;
    ensure_keys(&secondary.schema)?;

    let mut stats = MergeStats {
        primary_rows: primary.len(),
        secondary_rows: secondary.len(),
        ..Default::default()
    };

    let filter_category = primary.schema.has(Role::Category);
    let filter_source = primary.schema.has(Role::SourceType);
    let filtered = primary.iter().filter(|obs| {
        (!filter_category || obs.category.as_deref() == Some(settings.primary_category.as_str()))
            && (!filter_source
                || obs.source_type.as_deref() == Some(settings.total_source_type.as_str()))
    });

    let mut order: Vec<Key> = Vec::new();
    let mut base: HashMap<Key, &Observation> = HashMap::new();
    for obs in filtered {
        stats.primary_rows_after_filter += 1;
        let key = (obs.region.clone(), obs.year);
        match base.entry(key) {
            Entry::Vacant(slot) => {
                order.push(slot.key().clone());
                slot.insert(obs);
            }
            Entry::Occupied(mut slot) => {
                stats.primary_duplicates_resolved += 1;
                let canonical = |o: &Observation| {
                    o.unit
                        .as_deref()
                        .is_some_and(|u| u.contains(settings.canonical_unit.as_str()))
                };
                if !canonical(*slot.get()) && canonical(obs) {
                    slot.insert(obs);
                }
            }
        }
    }

    let mut joined: HashMap<Key, &Observation> = HashMap::new();
    for obs in secondary.iter() {
        match joined.entry((obs.region.clone(), obs.year)) {
            Entry::Vacant(slot) => {
                slot.insert(obs);
            }
            Entry::Occupied(_) => stats.secondary_duplicates_dropped += 1,
        }
    }

    let mut records = Vec::with_capacity(order.len());
    for key in order {
        let Some(obs) = base.get(&key) else {
            continue;
        };
        let matched = joined.get(&key);
        if matched.is_some() {
            stats.matched_rows += 1;
        } else {
            stats.unmatched_rows += 1;
        }
        records.push(MergedRecord {
            nuts_code: None,
            region: key.0,
            year: key.1,
            frequency: obs
                .frequency
                .clone()
                .or_else(|| matched.and_then(|m| m.frequency.clone())),
            primary: source_values(obs, false),
            secondary: matched.map(|m| source_values(m, true)).unwrap_or_default(),
        });
    }
    stats.merged_rows = records.len();

    info!(
        primary_after_filter = stats.primary_rows_after_filter,
        matched = stats.matched_rows,
        unmatched = stats.unmatched_rows,
        merged = stats.merged_rows,
        "Merged sources"
    );
    Ok((
        MergedDataset {
            primary: primary.kind(),
            secondary: secondary.kind(),
            records,
        },
        stats,
    ))
}

/// Persisted column names for the merged file.
#[derive(Debug, Clone)]
struct MergedLayout {
    primary: SourceKind,
    secondary: SourceKind,
}

enum Field {
    Code,
    Region,
    Year,
    Frequency,
    Value(ValueColumn),
    LastUpdate(ValueColumn),
    Unit(ValueColumn),
    Category(ValueColumn),
}

impl MergedLayout {
    fn category_column(kind: SourceKind) -> Option<String> {
        kind.schema().column(Role::Category).map(|c| format!("{}_category", c))
    }

    /// Code, region and year first, then one group per source ordered by
    /// dataset id, then the remaining columns alphabetically.
    fn columns(&self) -> Vec<(String, Field)> {
        let mut columns = vec![
            ("nuts_code".to_string(), Field::Code),
            ("geo".to_string(), Field::Region),
            ("TIME_PERIOD".to_string(), Field::Year),
        ];
        let mut groups = [
            (self.primary, ValueColumn::Primary),
            (self.secondary, ValueColumn::Secondary),
        ];
        groups.sort_by_key(|(kind, _)| kind.dataset_id());
        for (kind, side) in groups {
            let id = kind.dataset_id();
            columns.push((format!("LAST UPDATE_{}", id), Field::LastUpdate(side)));
            columns.push((format!("OBS_VALUE_{}", id), Field::Value(side)));
            columns.push((format!("unit_{}", id), Field::Unit(side)));
            if side == ValueColumn::Secondary {
                if let Some(name) = Self::category_column(kind) {
                    columns.push((name, Field::Category(side)));
                }
            }
        }
        columns.push(("freq".to_string(), Field::Frequency));
        columns
    }
}

fn side<'a>(record: &'a MergedRecord, column: &ValueColumn) -> &'a SourceValues {
    match column {
        ValueColumn::Primary => &record.primary,
        ValueColumn::Secondary => &record.secondary,
    }
}

fn side_mut<'a>(record: &'a mut MergedRecord, column: &ValueColumn) -> &'a mut SourceValues {
    match column {
        ValueColumn::Primary => &mut record.primary,
        ValueColumn::Secondary => &mut record.secondary,
    }
}

impl MergedDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn layout(&self) -> MergedLayout {
        MergedLayout {
            primary: self.primary,
            secondary: self.secondary,
        }
    }

    pub fn header(&self) -> Vec<String> {
        self.layout().columns().into_iter().map(|(name, _)| name).collect()
    }

    /// Writes to a sibling temp file and renames it over `path`, so readers
    /// never see a partially written merged file.
    #[instrument(skip(self), fields(rows = self.records.len()))]
    pub fn write_csv(&self, path: &Path) -> Result<(), RenewablesError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let columns = self.layout().columns();
        let tmp = tmp_path(path);
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            writer.write_record(columns.iter().map(|(name, _)| name.as_str()))?;
            for record in &self.records {
                let row: Vec<String> = columns
                    .iter()
                    .map(|(_, field)| match field {
                        Field::Code => record.nuts_code.clone().unwrap_or_default(),
                        Field::Region => record.region.clone(),
                        Field::Year => record.year.to_string(),
                        Field::Frequency => record.frequency.clone().unwrap_or_default(),
                        Field::Value(s) => side(record, s).value.map(format_value).unwrap_or_default(),
                        Field::LastUpdate(s) => side(record, s).last_update.clone().unwrap_or_default(),
                        Field::Unit(s) => side(record, s).unit.clone().unwrap_or_default(),
                        Field::Category(s) => side(record, s).category.clone().unwrap_or_default(),
                    })
                    .collect();
                writer.write_record(&row)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Wrote merged dataset");
        Ok(())
    }

    /// Reads a merged file written by [`MergedDataset::write_csv`].
    pub fn read(path: &Path, primary: SourceKind, secondary: SourceKind) -> Result<Self, RenewablesError> {
        let table = read_table(path)?;
        let layout = MergedLayout { primary, secondary };
        let columns: Vec<(usize, Field)> = layout
            .columns()
            .into_iter()
            .filter_map(|(name, field)| table.column_index(&name).map(|idx| (idx, field)))
            .collect();
        for required in ["geo", "TIME_PERIOD"] {
            if table.column_index(required).is_none() {
                return Err(RenewablesError::Schema(format!(
                    "{} is missing the {} column",
                    path.display(),
                    required
                )));
            }
        }

        let mut records = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let mut record = MergedRecord {
                nuts_code: None,
                region: String::new(),
                year: 0,
                frequency: None,
                primary: SourceValues::default(),
                secondary: SourceValues::default(),
            };
            for (idx, field) in &columns {
                let cell = table.cell(row, *idx).map(str::to_string);
                match field {
                    Field::Code => record.nuts_code = cell,
                    Field::Region => record.region = cell.unwrap_or_default(),
                    Field::Year => {
                        record.year = cell.and_then(|v| v.parse().ok()).ok_or_else(|| {
                            RenewablesError::Parse {
                                path: path.to_path_buf(),
                                reason: format!("row {}: invalid year", row + 1),
                            }
                        })?
                    }
                    Field::Frequency => record.frequency = cell,
                    Field::Value(s) => side_mut(&mut record, s).value = cell.and_then(|v| v.parse().ok()),
                    Field::LastUpdate(s) => side_mut(&mut record, s).last_update = cell,
                    Field::Unit(s) => side_mut(&mut record, s).unit = cell,
                    Field::Category(s) => side_mut(&mut record, s).category = cell,
                }
            }
            records.push(record);
        }
        Ok(Self {
            primary,
            secondary,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn settings() -> MergeSettings {
        MergeSettings::from(&RenewablesConfig::default())
    }

    fn balance(region: &str, year: i32, category: &str, siec: &str, unit: &str, value: f64) -> Observation {
        Observation {
            region: region.to_string(),
            year,
            value,
            frequency: Some("Annual".to_string()),
            category: Some(category.to_string()),
            source_type: Some(siec.to_string()),
            unit: Some(unit.to_string()),
            last_update: Some("2024-02-01".to_string()),
        }
    }

    fn share(region: &str, year: i32, value: f64) -> Observation {
        Observation {
            region: region.to_string(),
            year,
            value,
            frequency: Some("Annual".to_string()),
            category: Some("Renewable energy sources".to_string()),
            source_type: None,
            unit: Some("Percentage".to_string()),
            last_update: Some("2024-03-01".to_string()),
        }
    }

    fn sources() -> (CleanedSeries, CleanedSeries) {
        let primary = CleanedSeries::new(
            SourceKind::EnergyBalance.schema(),
            vec![
                balance("Portugal", 2020, "Primary production", "Total", "Thousand tonnes of oil equivalent", 1.0),
                balance("Portugal", 2020, "Primary production", "Total", "Terajoule", 250.0),
                balance("Portugal", 2020, "Primary production", "Solid fossil fuels", "Terajoule", 9.0),
                balance("Portugal", 2020, "Imports", "Total", "Terajoule", 7.0),
                balance("Austria", 2020, "Primary production", "Total", "Terajoule", 500.0),
                balance("Austria", 2021, "Primary production", "Total", "Terajoule", 510.0),
            ],
        );
        let secondary = CleanedSeries::new(
            SourceKind::RenewableShare.schema(),
            vec![
                share("Portugal", 2020, 33.9),
                share("Portugal", 2020, 40.0),
                share("Austria", 2020, 36.5),
                share("Spain", 2020, 21.0),
            ],
        );
        (primary, secondary)
    }

    #[test]
    fn one_row_per_primary_key() {
        let (primary, secondary) = sources();
        let (merged, stats) = merge(&primary, &secondary, &settings()).unwrap();

        assert_eq!(merged.len(), 3);
        let keys: HashSet<_> = merged.records.iter().map(|r| (r.region.clone(), r.year)).collect();
        assert_eq!(keys.len(), merged.len());
        assert!(merged.len() <= stats.primary_rows_after_filter);
        // Spain only exists on the joined side.
        assert!(!keys.contains(&("Spain".to_string(), 2020)));

        let portugal = &merged.records[0];
        assert_eq!(portugal.region, "Portugal");
        assert_eq!(portugal.primary.value, Some(250.0));
        assert_eq!(portugal.primary.category, None);
        assert_eq!(portugal.secondary.value, Some(33.9));
        assert_eq!(portugal.secondary.category.as_deref(), Some("Renewable energy sources"));

        let austria_2021 = &merged.records[2];
        assert_eq!(austria_2021.secondary, SourceValues::default());
        assert_eq!(stats.unmatched_rows, 1);
        assert_eq!(stats.secondary_duplicates_dropped, 1);
    }

    #[test]
    fn persisted_layout_and_read_back() {
        let (primary, secondary) = sources();
        let (mut merged, _) = merge(&primary, &secondary, &settings()).unwrap();
        merged.records[0].nuts_code = Some("PT".to_string());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged_dataset.csv");
        merged.write_csv(&path).unwrap();

        assert_eq!(
            merged.header(),
            vec![
                "nuts_code",
                "geo",
                "TIME_PERIOD",
                "LAST UPDATE_nrg_bal",
                "OBS_VALUE_nrg_bal",
                "unit_nrg_bal",
                "LAST UPDATE_nrg_ind_ren",
                "OBS_VALUE_nrg_ind_ren",
                "unit_nrg_ind_ren",
                "nrg_bal_category",
                "freq",
            ]
        );
        let read = MergedDataset::read(&path, SourceKind::EnergyBalance, SourceKind::RenewableShare).unwrap();
        assert_eq!(read, merged);
    }

    #[test]
    fn missing_key_column_is_schema_error() {
        let (primary, _) = sources();
        let mut schema = SourceKind::RenewableShare.schema();
        schema.columns.retain(|c| c.role != Role::Year);
        let broken = CleanedSeries::new(schema, vec![]);
        assert!(matches!(
            merge(&primary, &broken, &settings()),
            Err(RenewablesError::Schema(_))
        ));
    }
}
