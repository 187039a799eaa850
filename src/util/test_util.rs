use std::{
    fmt::Write as _,
    fs,
    io,
    path::Path,
};

use tracing::{info, subscriber::set_default};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;

use crate::{config::RenewablesConfig, preprocessing::normalizer::MissingStrategy};

pub struct TracingGuards {
    _subscriber_guard: tracing::subscriber::DefaultGuard,
    _worker_guard: WorkerGuard,
}

pub fn setup_test_tracing(test_name: &str) -> TracingGuards {
    let log_dir = Path::new("tests/logs");
    if !log_dir.exists() {
        // A missing log directory only loses test logs.
        let _ = fs::create_dir_all(log_dir);
    }

    let log_file = format!("tests/logs/{}.log", test_name);
    let file_appender = tracing_appender::rolling::never("", &log_file);
    let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = fmt::Subscriber::builder()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_level(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let subscriber_guard = set_default(subscriber);
    info!("-----------------");
    info!("Test: {}", test_name);
    info!("-----------------");

    TracingGuards {
        _subscriber_guard: subscriber_guard,
        _worker_guard: worker_guard,
    }
}

/// Regions in the fixture extracts with their renewable share for 2018..=2020.
/// `None` leaves the cell empty.
pub const FIXTURE_SHARES: [(&str, [Option<f64>; 3]); 4] = [
    ("Portugal", [Some(30.2), Some(30.6), Some(34.0)]),
    ("Spain", [Some(17.0), None, Some(21.2)]),
    ("Atlantis", [Some(50.0), Some(51.0), Some(52.0)]),
    ("European Union - 27 countries (from 2020)", [Some(18.9), Some(19.9), Some(22.0)]),
];

pub const FIXTURE_YEARS: [i32; 3] = [2018, 2019, 2020];

/// Total primary production in terajoule for a region and year.
pub fn fixture_production(region_index: usize, year: i32) -> f64 {
    (region_index as f64 + 1.0) * 1000.0 + (year - 2018) as f64 * 100.0
}

const TOE_PER_TJ: f64 = 41.868;

fn energy_balance_csv() -> String {
    let mut csv = String::from("freq,nrg_bal,siec,unit,geo,TIME_PERIOD,OBS_VALUE,LAST UPDATE\n");
    for (index, (region, _)) in FIXTURE_SHARES.iter().enumerate() {
        for year in FIXTURE_YEARS {
            let total = fixture_production(index, year);
            let rows = [
                ("Primary production", "Total", "Terajoule", total),
                ("Primary production", "Total", "Thousand tonnes of oil equivalent", total / TOE_PER_TJ),
                ("Primary production", "Solar photovoltaic", "Terajoule", total * 0.25),
                ("Primary production", "Wind", "Terajoule", total * 0.5),
                ("Final consumption", "Total", "Terajoule", total * 2.0),
            ];
            for (category, siec, unit, value) in rows {
                let _ = writeln!(
                    csv,
                    "Annual,{},{},{},{},{},{},24/04/25 23:00:00",
                    category, siec, unit, region, year, value
                );
            }
        }
    }
    // Row without a value.
    csv.push_str("Annual,Primary production,Total,Terajoule,Portugal,2021,,24/04/25 23:00:00\n");
    csv
}

fn renewable_share_csv() -> String {
    let mut csv = String::from("freq,nrg_bal,unit,geo,TIME_PERIOD,OBS_VALUE,LAST UPDATE\n");
    for (region, shares) in FIXTURE_SHARES {
        for (year, share) in FIXTURE_YEARS.iter().zip(shares) {
            let value = share.map(|s| s.to_string()).unwrap_or_default();
            let _ = writeln!(
                csv,
                "Annual,Renewable energy sources,Percentage,{},{},{},01/03/25 11:00:00",
                region, year, value
            );
        }
    }
    // Exact duplicate of the first Portugal row.
    csv.push_str("Annual,Renewable energy sources,Percentage,Portugal,2018,30.2,01/03/25 11:00:00\n");
    csv
}

fn gdp_csv() -> String {
    let mut csv = String::from("geo;TIME_PERIOD;OBS_VALUE;LAST UPDATE;unit\n");
    for (region, base) in [("Portugal", 200_000.0), ("Spain", 1_200_000.0)] {
        for year in FIXTURE_YEARS {
            let _ = writeln!(
                csv,
                "{};{};{};10/04/25 23:00:00;Current prices, million euro",
                region,
                year,
                base * (1.0 + (year - 2018) as f64 * 0.03)
            );
        }
    }
    csv
}

/// Writes the fixture extracts under `root/data` and returns a configuration
/// pointing at them, with cleaned output going to `root/data_clean`.
pub fn write_fixtures(root: &Path, with_gdp: bool) -> io::Result<RenewablesConfig> {
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir)?;
    fs::write(data_dir.join("nrg_bal.csv"), energy_balance_csv())?;
    fs::write(data_dir.join("nrg_ind_ren.csv"), renewable_share_csv())?;
    if with_gdp {
        fs::write(data_dir.join("nama_10_gdp.csv"), gdp_csv())?;
    }

    Ok(RenewablesConfig {
        data_dir,
        clean_dir: root.join("data_clean"),
        missing_strategy: MissingStrategy::Interpolate,
        log_dir: None,
        ..Default::default()
    })
}
