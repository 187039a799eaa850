//! Dataset selection plus the lazily prepared data behind it.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::{
    analytics::{Analysis, AnalyticsEngine},
    config::{DatasetInfo, RenewablesConfig},
    data::region::{RegionCodeCache, RegionCodeResolver},
    error::RenewablesError,
    preprocessing::orchestrator::{resolve_pair, PreparedData, PreprocessingOrchestrator},
};

/// Holds the active selection and the preparation result for it.
///
/// On first use the output committed by an earlier run is loaded when it
/// matches the selection. The pipeline only runs when nothing usable is
/// stored, when [`Session::preprocess`] is called, or after the selection
/// changes. Code resolutions are cleared together with the prepared data.
pub struct Session {
    config: RenewablesConfig,
    selection: Vec<String>,
    codes: RegionCodeCache,
    prepared: Option<Arc<PreparedData>>,
    reuse_stored: bool,
}

impl Session {
    pub fn new(config: RenewablesConfig) -> Self {
        let selection = config.datasets.clone();
        Self {
            config,
            selection,
            codes: RegionCodeCache::new(),
            prepared: None,
            reuse_stored: true,
        }
    }

    pub fn config(&self) -> &RenewablesConfig {
        &self.config
    }

    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    pub fn available_datasets(&self) -> Vec<DatasetInfo> {
        self.config.available_datasets()
    }

    /// Replaces the selection. The previous selection stays active when
    /// `datasets` is not a valid pairing or a file is missing.
    #[instrument(skip(self))]
    pub fn select_datasets(&mut self, datasets: &[String]) -> Result<(), RenewablesError> {
        resolve_pair(datasets)?;
        for id in datasets {
            let path = self.config.raw_path(id);
            if !path.exists() {
                return Err(RenewablesError::NotFound(format!(
                    "Dataset {} has no file at {}",
                    id,
                    path.display()
                )));
            }
        }

        self.prepared = None;
        self.reuse_stored = false;
        self.codes.clear();
        self.selection = datasets.to_vec();
        info!(selection = ?self.selection, "Dataset selection changed");
        Ok(())
    }

    /// Returns the prepared data for the current selection, loading the
    /// committed output or running the pipeline when none is held yet.
    pub fn prepare(&mut self) -> Result<Arc<PreparedData>, RenewablesError> {
        if let Some(prepared) = &self.prepared {
            return Ok(Arc::clone(prepared));
        }
        if self.reuse_stored {
            match PreparedData::from_store(&self.config, &self.selection) {
                Ok(stored) => {
                    let prepared = Arc::new(stored);
                    self.prepared = Some(Arc::clone(&prepared));
                    return Ok(prepared);
                }
                Err(e) => warn!("Committed output not usable, running preprocessing: {}", e),
            }
        }
        self.preprocess()
    }

    /// Runs the pipeline for the current selection and replaces both the
    /// held data and the committed output.
    #[instrument(skip(self))]
    pub fn preprocess(&mut self) -> Result<Arc<PreparedData>, RenewablesError> {
        self.prepared = None;
        let orchestrator = PreprocessingOrchestrator::with_datasets(&self.config, &self.codes, &self.selection)?;
        let prepared = Arc::new(orchestrator.run()?);
        info!("{}", prepared.stats);
        self.prepared = Some(Arc::clone(&prepared));
        self.reuse_stored = true;
        Ok(prepared)
    }

    /// Prepares if needed and hands the data to `query`. A failed
    /// preparation becomes an unavailable result.
    pub fn analyze<T>(&mut self, query: impl FnOnce(&AnalyticsEngine<'_>) -> Analysis<T>) -> Analysis<T> {
        let prepared = match self.prepare() {
            Ok(prepared) => prepared,
            Err(e) => return Err::<T, _>(e).into(),
        };
        let engine = AnalyticsEngine::new(&prepared, &self.config, RegionCodeResolver::new(&self.codes));
        query(&engine)
    }
}
