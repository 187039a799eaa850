use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::data::table::RawTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnQuality {
    pub column: String,
    pub missing_values: usize,
    pub missing_percentage: f64,
}

/// Completeness summary of a raw extract, taken before cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_rows: usize,
    pub total_columns: usize,
    pub columns: Vec<ColumnQuality>,
    pub duplicate_rows: usize,
}

impl QualityReport {
    pub fn from_table(table: &RawTable) -> Self {
        let total_rows = table.len();
        let columns = table
            .headers()
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let missing_values = (0..total_rows).filter(|&row| table.cell(row, idx).is_none()).count();
                let missing_percentage = if total_rows == 0 {
                    0.0
                } else {
                    round2(missing_values as f64 / total_rows as f64 * 100.0)
                };
                ColumnQuality {
                    column: name.clone(),
                    missing_values,
                    missing_percentage,
                }
            })
            .collect();

        let mut seen = HashSet::new();
        let duplicate_rows = table.rows().iter().filter(|row| !seen.insert(*row)).count();

        Self {
            total_rows,
            total_columns: table.headers().len(),
            columns,
            duplicate_rows,
        }
    }

    pub fn missing_values(&self) -> usize {
        self.columns.iter().map(|c| c.missing_values).sum()
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn counts_missing_cells_and_duplicates() {
        let rows = vec![
            vec!["Portugal".to_string(), "2020".to_string(), "".to_string()],
            vec!["Portugal".to_string(), "2020".to_string(), "".to_string()],
            vec!["Spain".to_string(), "2020".to_string(), "21".to_string()],
        ];
        let table = RawTable::new(
            PathBuf::from("x.csv"),
            vec!["geo".to_string(), "TIME_PERIOD".to_string(), "OBS_VALUE".to_string()],
            rows,
        );
        let report = QualityReport::from_table(&table);
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.total_columns, 3);
        assert_eq!(report.duplicate_rows, 1);
        assert_eq!(report.columns[2].missing_values, 2);
        assert_eq!(report.columns[2].missing_percentage, 66.67);
        assert_eq!(report.missing_values(), 2);
    }
}
