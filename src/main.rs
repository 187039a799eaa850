use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

use renewables::{
    analytics::{Analysis, Query},
    args::{Args, Command},
    config::RenewablesConfig,
    error::RenewablesError,
    logging::setup_tracing,
    session::Session,
};

fn print_json<T: Serialize>(value: &T) -> Result<(), RenewablesError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(args: Args, mut session: Session) -> Result<(), RenewablesError> {
    if let Some(datasets) = &args.datasets {
        if datasets.as_slice() != session.selection() {
            session.select_datasets(datasets)?;
        }
    }

    match args.command {
        Command::Preprocess => {
            let prepared = session.preprocess()?;
            println!("{}", prepared.stats);
            print_json(&prepared.stats)
        }
        Command::Trend(filter) => print_json(&session.analyze(|e| e.run(Query::Trend, &filter.to_filter()))),
        Command::Sources(filter) => {
            print_json(&session.analyze(|e| e.run(Query::SourceComparison, &filter.to_filter())))
        }
        Command::Ranking(filter) => print_json(&session.analyze(|e| e.run(Query::Ranking, &filter.to_filter()))),
        Command::Correlation { indicator, filter } => {
            print_json(&session.analyze(|e| e.run(Query::Correlation(indicator), &filter.to_filter())))
        }
        Command::Forecast { years, filter } => {
            let years = years.unwrap_or(session.config().forecast_years);
            print_json(&session.analyze(|e| e.run(Query::Forecast { years }, &filter.to_filter())))
        }
        Command::Summary {
            group_by,
            aggregations,
            filter,
        } => print_json(&session.analyze(|e| e.summary_table(&filter.to_filter(), group_by, &aggregations))),
        Command::Scale { method, filter } => {
            print_json(&session.analyze(|e| e.scale_by_region(&filter.to_filter(), method)))
        }
        Command::Energy {
            regions,
            energy_type,
            by_source,
            filter,
        } => {
            let filter = filter.to_filter();
            match (energy_type, by_source) {
                (Some(energy_type), _) => {
                    print_json(&session.analyze(|e| e.series_by_energy_type(&energy_type, &regions, &filter)))
                }
                (None, true) => print_json(&session.analyze(|e| e.sources_by_regions(&regions, &filter))),
                (None, false) => print_json(&session.analyze(|e| e.yearly_trends_by_regions(&regions, &filter))),
            }
        }
        Command::Regions => print_json(&session.analyze(|e| Analysis::Report(e.regions()))),
        Command::Datasets => print_json(&session.available_datasets()),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = match RenewablesConfig::read_config(Some(&args.config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _guard = match setup_tracing(config.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(config = %args.config.display(), "Loaded configuration");

    match run(args, Session::new(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
