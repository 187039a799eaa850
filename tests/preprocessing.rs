use std::{collections::HashSet, fs, io::Write as _};

use common::setup_fixture;
use renewables::{
    data::{
        observation::CleanedSeries,
        region::RegionCodeCache,
        schema::SourceKind,
    },
    error::{RenewablesError, Stage},
    preprocessing::{
        cleaner::is_aggregate_region,
        merger::MergedDataset,
        orchestrator::{PreparedData, PreprocessingOrchestrator},
    },
};
use tracing::info;

mod common;

#[test]
fn test_pipeline_statistics() {
    let fixture = setup_fixture("pipeline_statistics", true);
    let codes = RegionCodeCache::new();
    let prepared = PreprocessingOrchestrator::new(&fixture.config, &codes)
        .unwrap()
        .run()
        .unwrap();
    let stats = &prepared.stats;
    info!("{}", stats);

    let energy = &stats.sources[0];
    assert_eq!(energy.dataset, "nrg_bal");
    assert_eq!(energy.cleaning.rows_before, 61);
    assert_eq!(energy.cleaning.rows_removed_aggregate, 15);
    assert_eq!(energy.cleaning.rows_removed_missing, 1);
    assert_eq!(energy.cleaning.rows_after, 45);
    assert_eq!(energy.quality.total_rows, 61);

    let share = &stats.sources[1];
    assert_eq!(share.dataset, "nrg_ind_ren");
    assert_eq!(share.cleaning.rows_removed_duplicate, 1);
    assert_eq!(share.cleaning.rows_removed_missing, 1);
    assert_eq!(share.cleaning.rows_after, 8);

    assert_eq!(stats.merge.primary_rows_after_filter, 18);
    assert_eq!(stats.merge.primary_duplicates_resolved, 9);
    assert_eq!(stats.merge.unmatched_rows, 1);
    assert_eq!(stats.merged_rows, 9);
    assert_eq!(stats.nuts_codes_failed, 3);
    assert_eq!(stats.nuts_codes_failed_values, vec!["Atlantis (3)".to_string()]);
    assert_eq!(stats.merged_rows_after_code_filter, 6);
    assert!(stats.gdp.is_some());
    assert!(stats.gdp_error.is_none());
    assert_eq!(stats.normalization["OBS_VALUE_nrg_ind_ren"].missing_values_filled, 1);
}

#[test]
fn test_merge_has_one_row_per_key_with_canonical_unit() {
    let fixture = setup_fixture("merge_one_row_per_key", false);
    let codes = RegionCodeCache::new();
    let prepared = PreprocessingOrchestrator::new(&fixture.config, &codes)
        .unwrap()
        .run()
        .unwrap();

    let merged = &prepared.merged;
    let keys: HashSet<(&str, i32)> = merged.records.iter().map(|r| (r.region.as_str(), r.year)).collect();
    assert_eq!(keys.len(), merged.len());

    let portugal_2018 = merged
        .records
        .iter()
        .find(|r| r.region == "Portugal" && r.year == 2018)
        .unwrap();
    assert_eq!(portugal_2018.nuts_code.as_deref(), Some("PT"));
    assert_eq!(portugal_2018.primary.value, Some(1000.0));
    assert_eq!(portugal_2018.primary.unit.as_deref(), Some("Terajoule"));
    assert_eq!(portugal_2018.primary.category, None);
    assert_eq!(portugal_2018.secondary.category.as_deref(), Some("Renewable energy sources"));

    let spain_2019 = merged
        .records
        .iter()
        .find(|r| r.region == "Spain" && r.year == 2019)
        .unwrap();
    assert!((spain_2019.secondary.value.unwrap() - 19.1).abs() < 1e-9);
    assert!(merged.records.iter().all(|r| r.nuts_code.is_some()));
}

#[test]
fn test_cleaned_outputs_hold_invariants() {
    let fixture = setup_fixture("cleaned_invariants", true);
    let codes = RegionCodeCache::new();
    let prepared = PreprocessingOrchestrator::new(&fixture.config, &codes)
        .unwrap()
        .run()
        .unwrap();

    for kind in [SourceKind::EnergyBalance, SourceKind::RenewableShare, SourceKind::Gdp] {
        let path = fixture.config.clean_path(kind.dataset_id());
        let series = CleanedSeries::load(&path, kind).unwrap();
        assert!(!series.is_empty());
        assert!(series.iter().all(|o| !is_aggregate_region(&o.region)));
        assert!(series.iter().all(|o| o.value.is_finite()));
    }
    assert_eq!(prepared.cleaned(SourceKind::EnergyBalance).map(|s| s.len()), Some(45));
    assert!(prepared.gdp.is_ok());
}

#[test]
fn test_merged_output_is_reproducible() {
    let fixture = setup_fixture("merged_reproducible", true);
    let merged_path = fixture.config.merged_path();

    let first = {
        let codes = RegionCodeCache::new();
        PreprocessingOrchestrator::new(&fixture.config, &codes)
            .unwrap()
            .run()
            .unwrap();
        fs::read(&merged_path).unwrap()
    };
    let second = {
        let codes = RegionCodeCache::new();
        PreprocessingOrchestrator::new(&fixture.config, &codes)
            .unwrap()
            .run()
            .unwrap();
        fs::read(&merged_path).unwrap()
    };
    assert_eq!(first, second);

    let reread = MergedDataset::read(&merged_path, SourceKind::EnergyBalance, SourceKind::RenewableShare).unwrap();
    assert_eq!(reread.len(), 6);
    let header = String::from_utf8(first).unwrap();
    assert!(header.starts_with("nuts_code,geo,TIME_PERIOD"));
}

#[test]
fn test_missing_source_aborts_with_stage_context() {
    let fixture = setup_fixture("missing_source", false);
    fs::remove_file(fixture.config.raw_path("nrg_ind_ren")).unwrap();
    let codes = RegionCodeCache::new();
    let result = PreprocessingOrchestrator::new(&fixture.config, &codes).unwrap().run();

    match result {
        Err(RenewablesError::Stage { stage, dataset, source }) => {
            assert_eq!(stage, Stage::Load);
            assert_eq!(dataset, "nrg_ind_ren");
            assert!(matches!(*source, RenewablesError::NotFound(_)));
        }
        other => panic!("expected a load stage error, got {:?}", other.map(|p| p.stats.merged_rows)),
    }
    assert!(!fixture.config.merged_path().exists());
    assert!(!fixture.config.clean_path("nrg_bal").exists());
    assert!(!fixture.config.stats_path().exists());
    let leftovers: Vec<_> = fs::read_dir(&fixture.config.clean_dir).unwrap().collect();
    assert!(leftovers.is_empty(), "failed run left {:?}", leftovers);
}

#[test]
fn test_failed_rerun_keeps_committed_output() {
    let fixture = setup_fixture("failed_rerun", true);
    let codes = RegionCodeCache::new();
    PreprocessingOrchestrator::new(&fixture.config, &codes)
        .unwrap()
        .run()
        .unwrap();
    let clean_energy = fixture.config.clean_path("nrg_bal");
    let committed_energy = fs::read(&clean_energy).unwrap();
    let committed_merged = fs::read(fixture.config.merged_path()).unwrap();

    // The next run would clean a different energy balance, then fail on the share.
    let mut raw = fs::OpenOptions::new()
        .append(true)
        .open(fixture.config.raw_path("nrg_bal"))
        .unwrap();
    raw.write_all(b"Annual,Primary production,Wind,Terajoule,Spain,2021,777,24/04/25 23:00:00\n")
        .unwrap();
    drop(raw);
    fs::remove_file(fixture.config.raw_path("nrg_ind_ren")).unwrap();

    let result = PreprocessingOrchestrator::new(&fixture.config, &codes).unwrap().run();
    assert!(matches!(result, Err(RenewablesError::Stage { stage: Stage::Load, .. })));

    assert_eq!(fs::read(&clean_energy).unwrap(), committed_energy);
    assert_eq!(fs::read(fixture.config.merged_path()).unwrap(), committed_merged);
    let names: Vec<String> = fs::read_dir(&fixture.config.clean_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().all(|name| !name.ends_with(".staged")), "{:?}", names);

    let stored = PreparedData::from_store(&fixture.config, &fixture.config.datasets).unwrap();
    assert_eq!(stored.merged.len(), 6);
    assert_eq!(stored.cleaned(SourceKind::EnergyBalance).map(|s| s.len()), Some(45));
    assert!(stored.gdp.is_ok());
}

#[test]
fn test_committed_output_matches_the_run() {
    let fixture = setup_fixture("committed_output", false);
    let codes = RegionCodeCache::new();
    let prepared = PreprocessingOrchestrator::new(&fixture.config, &codes)
        .unwrap()
        .run()
        .unwrap();

    let stored = PreparedData::from_store(&fixture.config, &fixture.config.datasets).unwrap();
    assert_eq!(stored.merged, prepared.merged);
    assert_eq!(stored.cleaned, prepared.cleaned);
    assert_eq!(stored.stats.merged_rows, prepared.stats.merged_rows);
    assert_eq!(stored.stats.nuts_codes_failed_values, prepared.stats.nuts_codes_failed_values);
    assert!(stored.gdp.is_err());

    let other_pair = vec!["nrg_bal".to_string(), "nama_10_gdp".to_string()];
    assert!(PreparedData::from_store(&fixture.config, &other_pair).is_err());
}

#[test]
fn test_missing_gdp_is_not_fatal() {
    let fixture = setup_fixture("missing_gdp", false);
    let codes = RegionCodeCache::new();
    let prepared = PreprocessingOrchestrator::new(&fixture.config, &codes)
        .unwrap()
        .run()
        .unwrap();
    assert!(prepared.gdp.is_err());
    assert!(prepared.stats.gdp.is_none());
    assert!(prepared.stats.gdp_error.is_some());
    assert_eq!(prepared.stats.merged_rows_after_code_filter, 6);
}

#[test]
fn test_invalid_selection_is_rejected() {
    let fixture = setup_fixture("invalid_selection", true);
    let codes = RegionCodeCache::new();

    let three = vec!["nrg_bal".to_string(), "nrg_ind_ren".to_string(), "nama_10_gdp".to_string()];
    assert!(matches!(
        PreprocessingOrchestrator::with_datasets(&fixture.config, &codes, &three),
        Err(RenewablesError::InvalidSelection(_))
    ));

    let unknown = vec!["nrg_bal".to_string(), "nrg_cb_e".to_string()];
    assert!(matches!(
        PreprocessingOrchestrator::with_datasets(&fixture.config, &codes, &unknown),
        Err(RenewablesError::NotFound(_))
    ));
}
