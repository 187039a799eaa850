use std::{fmt, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum RenewablesError {
    #[error("Dataset not found: {0}")]
    NotFound(String),
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Insufficient data: got {got}, required {required}. {context}")]
    InsufficientData {
        got: usize,
        required: usize,
        context: String,
    },
    #[error("Invalid dataset selection: {0}")]
    InvalidSelection(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("{stage} failed for dataset {dataset}: {source}")]
    Stage {
        stage: Stage,
        dataset: String,
        #[source]
        source: Box<RenewablesError>,
    },
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV Error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Serde YAML Error: {0}")]
    SerdeYamlError(#[from] serde_yaml::Error),
    #[error("Serde JSON Error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl RenewablesError {
    /// Wraps an error with the preprocessing stage and dataset it came from.
    pub fn in_stage(self, stage: Stage, dataset: impl Into<String>) -> Self {
        RenewablesError::Stage {
            stage,
            dataset: dataset.into(),
            source: Box::new(self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Clean,
    Merge,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Load => write!(f, "load"),
            Stage::Clean => write!(f, "clean"),
            Stage::Merge => write!(f, "merge"),
            Stage::Persist => write!(f, "persist"),
        }
    }
}
