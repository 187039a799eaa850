use std::{
    fs::File,
    io::{BufReader, Write as _},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_yaml::from_reader;
use tracing::{debug, info, instrument};

use crate::{
    analytics::forecast::MAX_HORIZON_YEARS, data::schema::SourceKind, error::RenewablesError,
    preprocessing::normalizer::MissingStrategy,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RenewablesConfig {
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,
    #[serde(rename = "clean-dir")]
    pub clean_dir: PathBuf,
    pub datasets: Vec<String>,
    #[serde(rename = "gdp-dataset", default)]
    pub gdp_dataset: Option<String>,
    #[serde(rename = "missing-strategy", default)]
    pub missing_strategy: MissingStrategy,
    #[serde(rename = "primary-category", default = "default_primary_category")]
    pub primary_category: String,
    #[serde(rename = "total-source-type", default = "default_total_source_type")]
    pub total_source_type: String,
    #[serde(rename = "canonical-unit", default = "default_canonical_unit")]
    pub canonical_unit: String,
    #[serde(rename = "forecast-years", default = "default_forecast_years")]
    pub forecast_years: usize,
    #[serde(rename = "log-dir", default)]
    pub log_dir: Option<String>,
}

const DEFAULT_DATA: &str = r#"
data-dir: "data"
clean-dir: "data_clean"
datasets:
  - "nrg_bal"
  - "nrg_ind_ren"
gdp-dataset: "nama_10_gdp"
missing-strategy: "interpolate"
primary-category: "Primary production"
total-source-type: "Total"
canonical-unit: "Terajoule"
forecast-years: 5
log-dir: "logs"
"#;

fn default_primary_category() -> String {
    "Primary production".to_string()
}

fn default_total_source_type() -> String {
    "Total".to_string()
}

fn default_canonical_unit() -> String {
    "Terajoule".to_string()
}

fn default_forecast_years() -> usize {
    5
}

impl Default for RenewablesConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            clean_dir: PathBuf::from("data_clean"),
            datasets: vec!["nrg_bal".to_string(), "nrg_ind_ren".to_string()],
            gdp_dataset: Some("nama_10_gdp".to_string()),
            missing_strategy: MissingStrategy::Interpolate,
            primary_category: default_primary_category(),
            total_source_type: default_total_source_type(),
            canonical_unit: default_canonical_unit(),
            forecast_years: default_forecast_years(),
            log_dir: Some("logs".to_string()),
        }
    }
}

/// A dataset whose backing file is present in the data directory.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatasetInfo {
    pub id: String,
    pub name: String,
    pub filename: String,
    pub path: PathBuf,
}

impl RenewablesConfig {
    /// Reads the configuration from a YAML file.
    ///
    /// If the file does not exist, a default configuration file is written
    /// and the defaults are returned.
    #[instrument(level = "info", skip(filename))]
    pub fn read_config<P: AsRef<Path>>(filename: Option<P>) -> Result<Self, RenewablesError> {
        let path = filename
            .map(|p| p.as_ref().to_path_buf())
            .unwrap_or_else(|| Path::new("config.yml").to_path_buf());

        info!(path = %path.display(), "Reading configuration");

        if !path.exists() {
            info!(
                "Config file does not exist. Creating default config at {}",
                path.display()
            );
            let mut file = File::create(&path)?;
            file.write_all(DEFAULT_DATA.as_bytes())?;
            debug!("Default configuration file created");
            return Ok(RenewablesConfig::default());
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let config: Self = from_reader(reader)?;
        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Checks invariants serde cannot express.
    pub fn validate(&self) -> Result<(), RenewablesError> {
        if self.datasets.len() != 2 {
            return Err(RenewablesError::ConfigError(format!(
                "Exactly 2 datasets must be configured, got {}",
                self.datasets.len()
            )));
        }
        if self.datasets[0] == self.datasets[1] {
            return Err(RenewablesError::ConfigError(format!(
                "Configured datasets must be distinct, got {} twice",
                self.datasets[0]
            )));
        }
        if !(1..=MAX_HORIZON_YEARS).contains(&self.forecast_years) {
            return Err(RenewablesError::ConfigError(format!(
                "forecast-years must be between 1 and {}, got {}",
                MAX_HORIZON_YEARS, self.forecast_years
            )));
        }
        Ok(())
    }

    /// Path of the raw extract backing `dataset_id`.
    pub fn raw_path(&self, dataset_id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", dataset_id))
    }

    /// Path of the cleaned per-source output for `dataset_id`.
    pub fn clean_path(&self, dataset_id: &str) -> PathBuf {
        self.clean_dir.join(format!("clean_{}.csv", dataset_id))
    }

    pub fn merged_path(&self) -> PathBuf {
        self.clean_dir.join("merged_dataset.csv")
    }

    /// Statistics of the last committed preprocessing run. Its presence marks
    /// the cleaned and merged files next to it as one consistent set.
    pub fn stats_path(&self) -> PathBuf {
        self.clean_dir.join("preprocessing_stats.json")
    }

    /// Lists the known datasets whose raw file exists in the data directory.
    pub fn available_datasets(&self) -> Vec<DatasetInfo> {
        SourceKind::ALL
            .iter()
            .map(|kind| kind.dataset_id())
            .filter_map(|id| {
                let path = self.raw_path(id);
                if !path.exists() {
                    return None;
                }
                Some(DatasetInfo {
                    id: id.to_string(),
                    name: title_case(id),
                    filename: format!("{}.csv", id),
                    path,
                })
            })
            .collect()
    }
}

fn title_case(id: &str) -> String {
    id.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
