use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::analytics::{
    correlation::Indicator,
    forecast::check_horizon,
    summary::{GroupBy, ScalingMethod},
    QueryFilter,
};

fn parse_horizon(value: &str) -> Result<usize, String> {
    let years: usize = value.parse().map_err(|e| format!("{}", e))?;
    check_horizon(years).map(|_| years).map_err(|e| e.to_string())
}

#[derive(Debug, Parser)]
#[command(name = "renewables", version, about = "Renewable energy preprocessing and analytics")]
pub struct Args {
    /// Path of the YAML configuration file.
    #[arg(short, long, env = "RENEWABLES_CONFIG", default_value = "config.yml", global = true)]
    pub config: PathBuf,

    /// Comma separated pair of dataset ids overriding the configured selection.
    #[arg(short, long, value_delimiter = ',', global = true)]
    pub datasets: Option<Vec<String>>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the preprocessing pipeline and print its statistics.
    Preprocess,
    /// Global renewable share trend.
    Trend(FilterArgs),
    /// Compare energy source types.
    Sources(FilterArgs),
    /// Rank regions by renewable share.
    Ranking(FilterArgs),
    /// Correlate the renewable share with an indicator.
    Correlation {
        /// gdp, population or energy_balance.
        #[arg(short, long, default_value = "gdp")]
        indicator: Indicator,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Forecast the renewable share.
    Forecast {
        /// Horizon in years; defaults to the configured value.
        #[arg(short, long, value_parser = parse_horizon)]
        years: Option<usize>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Grouped statistics of the renewable share.
    Summary {
        #[arg(short, long, default_value = "region")]
        group_by: GroupBy,
        /// Comma separated: mean, median, sum, min, max, count, std.
        #[arg(short, long, value_delimiter = ',')]
        aggregations: Vec<String>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Renewable share scaled within each region.
    Scale {
        /// minmax, zscore or percentile.
        #[arg(short, long, default_value = "minmax")]
        method: ScalingMethod,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Energy values for selected regions.
    Energy {
        /// Regions to include; all regions when empty.
        #[arg(long = "regions", value_delimiter = ',')]
        regions: Vec<String>,
        /// Only source types containing this text.
        #[arg(long)]
        energy_type: Option<String>,
        /// Sum per source type instead of yearly values.
        #[arg(long)]
        by_source: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Regions in the merged dataset.
    Regions,
    /// Datasets available in the data directory.
    Datasets,
}

/// Options shared by every query.
#[derive(Debug, Clone, Default, ClapArgs)]
pub struct FilterArgs {
    #[arg(long)]
    pub year_from: Option<i32>,
    #[arg(long)]
    pub year_to: Option<i32>,
    /// Exact region name or code.
    #[arg(long)]
    pub region: Option<String>,
    /// Substring of the region name.
    #[arg(long)]
    pub country: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> QueryFilter {
        QueryFilter {
            year_from: self.year_from,
            year_to: self.year_to,
            region: self.region.clone(),
            country: self.country.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_correlation_with_filter() {
        let args = Args::parse_from([
            "renewables",
            "correlation",
            "--indicator",
            "population",
            "--year-from",
            "2015",
            "--country",
            "port",
        ]);
        match args.command {
            Command::Correlation { indicator, filter } => {
                assert_eq!(indicator, Indicator::Population);
                let filter = filter.to_filter();
                assert_eq!(filter.year_from, Some(2015));
                assert_eq!(filter.country.as_deref(), Some("port"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn forecast_horizon_is_bounded() {
        let args = Args::parse_from(["renewables", "forecast", "--years", "10"]);
        assert!(matches!(args.command, Command::Forecast { years: Some(10), .. }));

        for years in ["0", "101", "3000000000"] {
            assert!(Args::try_parse_from(["renewables", "forecast", "--years", years]).is_err());
        }
    }

    #[test]
    fn parses_dataset_override() {
        let args = Args::parse_from(["renewables", "--datasets", "nrg_ind_ren,nrg_bal", "trend"]);
        assert_eq!(
            args.datasets,
            Some(vec!["nrg_ind_ren".to_string(), "nrg_bal".to_string()])
        );
        assert!(matches!(args.command, Command::Trend(_)));
    }
}
