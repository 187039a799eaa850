use std::{
    collections::{BTreeMap, HashSet},
    fmt, fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::RenewablesConfig,
    data::{
        loader::RawLoader,
        observation::{tmp_path, CleanedSeries},
        region::{RegionCodeCache, RegionCodeResolver},
        schema::SourceKind,
    },
    error::{RenewablesError, Stage},
};

use super::{
    cleaner::{clean, CleaningStats},
    merger::{merge, MergeSettings, MergeStats, MergedDataset, ValueColumn},
    normalizer::{normalize, NormalizationStats},
    quality::QualityReport,
};

/// Checks that `ids` name exactly the energy-balance and renewable-share
/// sources, in any order, and returns them as (primary, secondary).
pub fn resolve_pair(ids: &[String]) -> Result<(SourceKind, SourceKind), RenewablesError> {
    if ids.len() != 2 {
        return Err(RenewablesError::InvalidSelection(format!(
            "Exactly 2 datasets are required, got {}",
            ids.len()
        )));
    }
    let kinds = ids
        .iter()
        .map(|id| SourceKind::from_dataset_id(id))
        .collect::<Result<HashSet<_>, _>>()?;
    let expected: HashSet<_> = [SourceKind::EnergyBalance, SourceKind::RenewableShare].into();
    if kinds != expected {
        return Err(RenewablesError::InvalidSelection(format!(
            "Datasets {} and {} cannot be merged, expected {} with {}",
            ids[0],
            ids[1],
            SourceKind::EnergyBalance,
            SourceKind::RenewableShare
        )));
    }
    Ok((SourceKind::EnergyBalance, SourceKind::RenewableShare))
}

pub fn value_column_name(kind: SourceKind) -> String {
    format!("OBS_VALUE_{}", kind.dataset_id())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStats {
    pub dataset: String,
    pub quality: QualityReport,
    pub cleaning: CleaningStats,
    pub clean_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingStats {
    pub generated_at: DateTime<Utc>,
    pub sources: Vec<SourceStats>,
    pub gdp: Option<SourceStats>,
    pub gdp_error: Option<String>,
    pub merge: MergeStats,
    pub normalization: BTreeMap<String, NormalizationStats>,
    pub merged_rows: usize,
    pub nuts_codes_added: usize,
    pub nuts_codes_failed: usize,
    pub nuts_codes_failed_values: Vec<String>,
    pub merged_rows_after_code_filter: usize,
    pub merged_path: PathBuf,
}

impl fmt::Display for PreprocessingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Preprocessing ({})", self.generated_at.format("%Y-%m-%d %H:%M:%S"))?;
        for source in self.sources.iter().chain(self.gdp.iter()) {
            writeln!(
                f,
                "  {}: {} -> {} rows ({} aggregate, {} duplicate, {} missing)",
                source.dataset,
                source.cleaning.rows_before,
                source.cleaning.rows_after,
                source.cleaning.rows_removed_aggregate,
                source.cleaning.rows_removed_duplicate,
                source.cleaning.rows_removed_missing
            )?;
        }
        if let Some(err) = &self.gdp_error {
            writeln!(f, "  GDP unavailable: {}", err)?;
        }
        for (column, stats) in &self.normalization {
            writeln!(
                f,
                "  {}: {} filled, {} removed, {} invalid years",
                column, stats.missing_values_filled, stats.rows_removed, stats.invalid_years_removed
            )?;
        }
        write!(
            f,
            "  merged: {} rows, {} coded, {} without code -> {} rows",
            self.merged_rows,
            self.nuts_codes_added,
            self.nuts_codes_failed,
            self.merged_rows_after_code_filter
        )
    }
}

/// Everything a preprocessing run produces that the analytics layer reads.
#[derive(Debug)]
pub struct PreparedData {
    pub merged: MergedDataset,
    pub cleaned: Vec<CleanedSeries>,
    pub gdp: Result<CleanedSeries, RenewablesError>,
    pub stats: PreprocessingStats,
}

impl PreparedData {
    pub fn cleaned(&self, kind: SourceKind) -> Option<&CleanedSeries> {
        self.cleaned.iter().find(|s| s.kind() == kind)
    }

    /// Loads the output of the last committed run for `datasets` without
    /// touching the raw extracts.
    ///
    /// Fails with `NotFound` when no run was committed, or when the committed
    /// run was made for another pair of datasets.
    #[instrument(skip(config))]
    pub fn from_store(config: &RenewablesConfig, datasets: &[String]) -> Result<Self, RenewablesError> {
        let (primary, secondary) = resolve_pair(datasets)?;
        let stats_path = config.stats_path();
        let bytes = fs::read(&stats_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RenewablesError::NotFound(format!(
                "No committed preprocessing run at {}",
                stats_path.display()
            )),
            _ => RenewablesError::IoError(e),
        })?;
        let stats: PreprocessingStats = serde_json::from_slice(&bytes)?;

        let stored: Vec<&str> = stats.sources.iter().map(|s| s.dataset.as_str()).collect();
        if stored != [primary.dataset_id(), secondary.dataset_id()] {
            return Err(RenewablesError::NotFound(format!(
                "Committed run covers {:?}, not {}+{}",
                stored, primary, secondary
            )));
        }

        let cleaned = [primary, secondary]
            .into_iter()
            .map(|kind| CleanedSeries::load(&config.clean_path(kind.dataset_id()), kind))
            .collect::<Result<Vec<_>, _>>()?;
        let gdp = match (&stats.gdp, &config.gdp_dataset) {
            (Some(source), Some(id)) if source.dataset == *id => SourceKind::from_dataset_id(id)
                .and_then(|kind| CleanedSeries::load(&config.clean_path(id), kind)),
            _ => Err(RenewablesError::NotFound(
                stats
                    .gdp_error
                    .clone()
                    .unwrap_or_else(|| "No GDP dataset in the committed run".to_string()),
            )),
        };
        let merged = MergedDataset::read(&config.merged_path(), primary, secondary)?;
        info!(
            generated_at = %stats.generated_at,
            merged_rows = merged.len(),
            "Loaded committed preprocessing output"
        );
        Ok(Self {
            merged,
            cleaned,
            gdp,
            stats,
        })
    }
}

/// Output files written by a run that is still in progress.
///
/// Every file goes to a staging path next to its target. Nothing replaces
/// the committed set until [`StagedOutputs::commit`] runs.
#[derive(Debug, Default)]
struct StagedOutputs {
    files: Vec<(PathBuf, PathBuf)>,
}

impl StagedOutputs {
    /// Runs `write` against the staging path of `target` and records the
    /// file once it is complete.
    fn write(
        &mut self,
        target: PathBuf,
        write_file: impl FnOnce(&Path) -> Result<(), RenewablesError>,
    ) -> Result<(), RenewablesError> {
        let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".staged");
        let staged = target.with_file_name(name);
        write_file(&staged)?;
        self.files.push((staged, target));
        Ok(())
    }

    /// Replaces the committed set. The stats manifest is removed first and
    /// written last, so an interrupted commit leaves no valid set behind.
    fn commit(self, stats_path: &Path, stats: &PreprocessingStats, stale: &[PathBuf]) -> Result<(), RenewablesError> {
        if stats_path.exists() {
            fs::remove_file(stats_path)?;
        }
        for (staged, target) in &self.files {
            fs::rename(staged, target)?;
        }
        for path in stale {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        let tmp = tmp_path(stats_path);
        fs::write(&tmp, serde_json::to_vec_pretty(stats)?)?;
        fs::rename(&tmp, stats_path)?;
        debug!(files = self.files.len(), path = %stats_path.display(), "Committed preprocessing output");
        Ok(())
    }

    fn discard(self) {
        for (staged, _) in self.files {
            if staged.exists() {
                if let Err(e) = fs::remove_file(&staged) {
                    warn!(path = %staged.display(), "Failed to remove staged output: {}", e);
                }
            }
        }
    }
}

/// Runs load, clean, merge, normalize and code resolution once.
pub struct PreprocessingOrchestrator<'a> {
    config: &'a RenewablesConfig,
    codes: &'a RegionCodeCache,
    primary: SourceKind,
    secondary: SourceKind,
}

impl<'a> PreprocessingOrchestrator<'a> {
    pub fn new(config: &'a RenewablesConfig, codes: &'a RegionCodeCache) -> Result<Self, RenewablesError> {
        Self::with_datasets(config, codes, &config.datasets)
    }

    pub fn with_datasets(
        config: &'a RenewablesConfig,
        codes: &'a RegionCodeCache,
        datasets: &[String],
    ) -> Result<Self, RenewablesError> {
        let (primary, secondary) = resolve_pair(datasets)?;
        Ok(Self {
            config,
            codes,
            primary,
            secondary,
        })
    }

    /// Executes the whole pipeline. Any stage failure aborts the run and
    /// leaves the previously committed output untouched.
    #[instrument(skip(self), fields(primary = %self.primary, secondary = %self.secondary))]
    pub fn run(&self) -> Result<PreparedData, RenewablesError> {
        fs::create_dir_all(&self.config.clean_dir)
            .map_err(|e| RenewablesError::from(e).in_stage(Stage::Persist, "clean directory"))?;

        let mut staged = StagedOutputs::default();
        let result = self.execute(&mut staged);
        match result {
            Ok(prepared) => {
                let stale: Vec<PathBuf> = match (&prepared.gdp, &self.config.gdp_dataset) {
                    (Err(_), Some(id)) => vec![self.config.clean_path(id)],
                    _ => Vec::new(),
                };
                staged
                    .commit(&self.config.stats_path(), &prepared.stats, &stale)
                    .map_err(|e| e.in_stage(Stage::Persist, "preprocessing output"))?;
                Ok(prepared)
            }
            Err(e) => {
                staged.discard();
                error!("Preprocessing failed: {}", e);
                Err(e)
            }
        }
    }

    fn execute(&self, staged: &mut StagedOutputs) -> Result<PreparedData, RenewablesError> {
        let loader = RawLoader::new(self.config);
        let merged_path = self.config.merged_path();

        let (primary, primary_stats) = self.prepare_source(&loader, self.primary, staged)?;
        let (secondary, secondary_stats) = self.prepare_source(&loader, self.secondary, staged)?;

        let (gdp, gdp_stats) = match &self.config.gdp_dataset {
            Some(id) => match SourceKind::from_dataset_id(id)
                .and_then(|kind| self.prepare_source(&loader, kind, staged))
            {
                Ok((series, stats)) => (Ok(series), Some(stats)),
                Err(e) => {
                    warn!("GDP source unavailable, correlation will use the synthetic indicator: {}", e);
                    (Err(e), None)
                }
            },
            None => (
                Err(RenewablesError::NotFound("No GDP dataset configured".to_string())),
                None,
            ),
        };

        let pair_label = format!("{}+{}", self.primary, self.secondary);
        let settings = MergeSettings::from(self.config);
        let (merged, merge_stats) =
            merge(&primary, &secondary, &settings).map_err(|e| e.in_stage(Stage::Merge, pair_label.as_str()))?;
        let merged_rows = merged.len();

        let mut normalization = BTreeMap::new();
        let mut records = merged.records;
        for (column, kind) in [(ValueColumn::Primary, self.primary), (ValueColumn::Secondary, self.secondary)] {
            let (normalized, stats) = normalize(records, column, self.config.missing_strategy);
            records = normalized;
            normalization.insert(value_column_name(kind), stats);
        }

        let resolver = RegionCodeResolver::new(self.codes);
        let mapping = resolver.build_mapping(records.iter().map(|r| r.region.as_str()));
        let mut failed_counts: BTreeMap<String, usize> = BTreeMap::new();
        for record in records.iter_mut() {
            record.nuts_code = mapping.get(record.region.trim()).cloned().flatten();
            if record.nuts_code.is_none() {
                *failed_counts.entry(record.region.clone()).or_default() += 1;
            }
        }
        let rows_before_filter = records.len();
        records.retain(|r| r.nuts_code.is_some());
        let nuts_codes_added = records.len();
        let nuts_codes_failed = rows_before_filter - nuts_codes_added;
        let nuts_codes_failed_values = failed_counts
            .iter()
            .map(|(name, count)| if *count > 1 { format!("{} ({})", name, count) } else { name.clone() })
            .collect::<Vec<_>>();
        if nuts_codes_failed > 0 {
            warn!(
                failed = nuts_codes_failed,
                regions = ?nuts_codes_failed_values,
                "Dropped rows without a region code"
            );
        }

        let merged = MergedDataset {
            primary: merged.primary,
            secondary: merged.secondary,
            records,
        };
        staged
            .write(merged_path.clone(), |path| merged.write_csv(path))
            .map_err(|e| e.in_stage(Stage::Persist, pair_label.as_str()))?;

        let stats = PreprocessingStats {
            generated_at: Utc::now(),
            sources: vec![primary_stats, secondary_stats],
            gdp: gdp_stats,
            gdp_error: gdp.as_ref().err().map(|e| e.to_string()),
            merge: merge_stats,
            normalization,
            merged_rows,
            nuts_codes_added,
            nuts_codes_failed,
            nuts_codes_failed_values,
            merged_rows_after_code_filter: merged.len(),
            merged_path,
        };
        info!(
            merged_rows = stats.merged_rows_after_code_filter,
            codes_failed = stats.nuts_codes_failed,
            "Preprocessing completed"
        );

        Ok(PreparedData {
            merged,
            cleaned: vec![primary, secondary],
            gdp,
            stats,
        })
    }

    fn prepare_source(
        &self,
        loader: &RawLoader,
        kind: SourceKind,
        staged: &mut StagedOutputs,
    ) -> Result<(CleanedSeries, SourceStats), RenewablesError> {
        let id = kind.dataset_id();
        let table = loader.load(id).map_err(|e| e.in_stage(Stage::Load, id))?;
        let quality = QualityReport::from_table(&table);
        let (series, cleaning) = clean(&table, &kind.schema()).map_err(|e| e.in_stage(Stage::Clean, id))?;
        let clean_path = self.config.clean_path(id);
        staged
            .write(clean_path.clone(), |path| series.write_csv(path))
            .map_err(|e| e.in_stage(Stage::Persist, id))?;
        info!(dataset = id, rows = series.len(), path = %clean_path.display(), "Staged cleaned source");
        Ok((
            series,
            SourceStats {
                dataset: id.to_string(),
                quality,
                cleaning,
                clean_path,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(a: &str, b: &str) -> Vec<String> {
        vec![a.to_string(), b.to_string()]
    }

    #[test]
    fn pairing_is_order_independent() {
        assert_eq!(
            resolve_pair(&ids("nrg_ind_ren", "nrg_bal")).unwrap(),
            (SourceKind::EnergyBalance, SourceKind::RenewableShare)
        );
        assert_eq!(
            resolve_pair(&ids("nrg_bal", "nrg_ind_ren")).unwrap(),
            (SourceKind::EnergyBalance, SourceKind::RenewableShare)
        );
    }

    #[test]
    fn invalid_pairings_are_rejected() {
        assert!(matches!(
            resolve_pair(&ids("nrg_bal", "nama_10_gdp")),
            Err(RenewablesError::InvalidSelection(_))
        ));
        assert!(matches!(
            resolve_pair(&ids("nrg_bal", "nrg_bal")),
            Err(RenewablesError::InvalidSelection(_))
        ));
        assert!(matches!(
            resolve_pair(&ids("nrg_bal", "unknown")),
            Err(RenewablesError::NotFound(_))
        ));
        assert!(matches!(
            resolve_pair(&["nrg_bal".to_string()]),
            Err(RenewablesError::InvalidSelection(_))
        ));
    }
}
