use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::RenewablesError;

use super::{
    loader::read_table,
    schema::{Role, SourceKind, SourceSchema},
};

/// One measured fact from a single source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub region: String,
    pub year: i32,
    pub value: f64,
    pub frequency: Option<String>,
    pub category: Option<String>,
    pub source_type: Option<String>,
    pub unit: Option<String>,
    pub last_update: Option<String>,
}

impl Observation {
    /// The field holding the value of a dimension or text role.
    pub fn text(&self, role: Role) -> Option<&str> {
        match role {
            Role::Frequency => self.frequency.as_deref(),
            Role::Category => self.category.as_deref(),
            Role::SourceType => self.source_type.as_deref(),
            Role::Unit => self.unit.as_deref(),
            Role::Region => Some(self.region.as_str()),
            Role::LastUpdate => self.last_update.as_deref(),
            Role::Year | Role::Value => None,
        }
    }

    fn cell(&self, role: Role) -> String {
        match role {
            Role::Year => self.year.to_string(),
            Role::Value => format_value(self.value),
            _ => self.text(role).unwrap_or_default().to_string(),
        }
    }
}

/// Formats a value for persisted output. Rust's shortest round-trip float
/// formatting keeps repeated runs byte identical.
pub fn format_value(value: f64) -> String {
    format!("{}", value)
}

/// Observations of one source after cleaning, in original order.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedSeries {
    pub schema: SourceSchema,
    pub observations: Vec<Observation>,
}

impl CleanedSeries {
    pub fn new(schema: SourceSchema, observations: Vec<Observation>) -> Self {
        Self {
            schema,
            observations,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.schema.kind
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    /// Writes the series with the source's own header order. The file is
    /// written to a sibling temp path first and renamed into place.
    #[instrument(skip(self), fields(source = %self.schema.kind, rows = self.observations.len()))]
    pub fn write_csv(&self, path: &Path) -> Result<(), RenewablesError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path(path);
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            writer.write_record(self.schema.header())?;
            for obs in &self.observations {
                let record: Vec<String> = self.schema.columns.iter().map(|c| obs.cell(c.role)).collect();
                writer.write_record(&record)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Wrote cleaned series");
        Ok(())
    }

    /// Reads a previously persisted cleaned file back, strictly: every row
    /// must carry a numeric year and value.
    pub fn load(path: &Path, kind: SourceKind) -> Result<Self, RenewablesError> {
        let table = read_table(path)?;
        let schema = kind.schema();
        let column = |role: Role| schema.column(role).and_then(|name| table.column_index(name));
        let region = required_index(&table, &schema, Role::Region)?;
        let year = required_index(&table, &schema, Role::Year)?;
        let value = required_index(&table, &schema, Role::Value)?;
        let frequency = column(Role::Frequency);
        let category = column(Role::Category);
        let source_type = column(Role::SourceType);
        let unit = column(Role::Unit);
        let last_update = column(Role::LastUpdate);

        let text = |row: usize, idx: Option<usize>| idx.and_then(|i| table.cell(row, i)).map(str::to_string);
        let mut observations = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let parse_err = |what: &str| RenewablesError::Parse {
                path: path.to_path_buf(),
                reason: format!("row {}: invalid {}", row + 1, what),
            };
            let year = table
                .cell(row, year)
                .and_then(|v| v.parse::<i32>().ok())
                .ok_or_else(|| parse_err("year"))?;
            let value = table
                .cell(row, value)
                .and_then(|v| v.parse::<f64>().ok())
                .ok_or_else(|| parse_err("value"))?;
            observations.push(Observation {
                region: table.cell(row, region).unwrap_or_default().to_string(),
                year,
                value,
                frequency: text(row, frequency),
                category: text(row, category),
                source_type: text(row, source_type),
                unit: text(row, unit),
                last_update: text(row, last_update),
            });
        }
        Ok(Self::new(schema, observations))
    }
}

fn required_index(
    table: &super::table::RawTable,
    schema: &SourceSchema,
    role: Role,
) -> Result<usize, RenewablesError> {
    let name = schema.required(role)?;
    table.column_index(name).ok_or_else(|| {
        RenewablesError::Schema(format!(
            "{} is missing the {} column",
            table.path().display(),
            name
        ))
    })
}

/// Sibling path used for write-then-rename.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
