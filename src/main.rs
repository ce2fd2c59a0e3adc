//! CLI entry point for the COVID-19 state report tool.
//!
//! Builds (or reads) the per-state store from the USAFacts county tables and
//! writes one of several report tables as CSV or JSON.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use covid_states::{
    config::Config,
    fetch::BasicClient,
    ingest::Ingest,
    output::{OutputFormat, print_pretty, write_table},
    period::Period,
    query::{SortKey, query},
    report::{DeathAggregation, county_rates, death_summary, monthly_deaths, rate_rows, state_breakdown},
    source::SourceLoader,
    states::StateCode,
    store::StateRecordStore,
};
use tracing::{Dispatch, debug, info, info_span};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
};

#[derive(Parser)]
#[command(name = "covid_states")]
#[command(about = "State-level COVID-19 cases and deaths, March-July 2020", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Row order: population, median_age or state
    #[arg(short, long, global = true, default_value = "population")]
    sort: SortKey,

    /// Month to report (3-7); omit for the March-July total
    #[arg(short, long, global = true, value_parser = clap::value_parser!(u8).range(3..=7))]
    month: Option<u8>,

    /// Two letter state code, e.g. TX or DC
    #[arg(short, long, global = true)]
    location: Option<StateCode>,

    /// State data file (created on first run)
    #[arg(short = 'f', long, global = true)]
    file_name: Option<PathBuf>,

    /// Directory for cached source CSVs
    #[arg(short = 'd', long, global = true)]
    data_dir: Option<PathBuf>,

    /// File to write output to instead of stdout
    #[arg(short, long, global = true)]
    ofile: Option<PathBuf>,

    /// Write JSON instead of CSV
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Cases and deaths per state
    Print,
    /// Deaths per state: total, largest month, or every month
    Deaths {
        #[arg(short, long, default_value = "total")]
        agg: DeathAggregation,
    },
    /// Case rate (percent of population) and death/case ratio per state
    Rates,
    /// One state's months and its share of the national figures
    State,
    /// Infection rate per county of one state for one month
    Counties,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(file) = &cli.file_name {
        config.store_file = file.clone();
    }

    // Logging setup: colored stderr + JSON rolling log file
    let log_dir = config
        .log_file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = config
        .log_file_path
        .file_name()
        .unwrap_or(OsStr::new("covid_states.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info")));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(
            EnvFilter::try_from_env("RUST_LOG_JSON").unwrap_or_else(|_| EnvFilter::new("debug")),
        );

    // Scoped to this run rather than installed as the process-wide default.
    let dispatch = Dispatch::new(
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(json_layer),
    );

    tracing::dispatcher::with_default(&dispatch, || run(cli, &config))
}

fn run(cli: Cli, config: &Config) -> Result<()> {
    debug!(?config, command = ?cli.command, sort = %cli.sort, month = ?cli.month, "Arguments");

    let loader = SourceLoader::new(
        config.data_dir.clone(),
        config.base_url.clone(),
        BasicClient::new(),
        info_span!("source_loader", data_dir = %config.data_dir.display()),
    );
    let ingest = Ingest::new(loader, info_span!("ingest"));

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Csv
    };
    let out = cli.ofile.as_deref();
    let period = cli.month.map(Period::new).transpose()?;

    match cli.command {
        Commands::Print => {
            let store = load_store(&ingest, config)?;
            let rows = query(&store, cli.sort, period)?;
            write_table(&rows, format, out)?;
        }
        Commands::Deaths { agg } => {
            let store = load_store(&ingest, config)?;
            match agg {
                DeathAggregation::All => write_table(&monthly_deaths(&store, cli.sort)?, format, out)?,
                _ => write_table(&death_summary(&store, cli.sort, agg)?, format, out)?,
            }
        }
        Commands::Rates => {
            let store = load_store(&ingest, config)?;
            let rows = rate_rows(&query(&store, cli.sort, period)?);
            write_table(&rows, format, out)?;
        }
        Commands::State => {
            let Some(state) = cli.location else {
                bail!("the state report needs a state: use --location with a two letter code");
            };
            let store = load_store(&ingest, config)?;
            print_pretty(store.get(state.as_str())?);
            write_table(&state_breakdown(&store, state.as_str())?, format, out)?;
        }
        Commands::Counties => {
            let (Some(state), Some(period)) = (cli.location, period) else {
                bail!("the counties report needs --location and --month");
            };
            let observations = ingest
                .county_observations()
                .context("failed to build county observations")?;
            let rows = county_rates(&observations, state.as_str(), period);
            info!(state = %state, month = period.name(), counties = rows.len(), "County rates");
            write_table(&rows, format, out)?;
        }
    }

    Ok(())
}

fn load_store(ingest: &Ingest<BasicClient>, config: &Config) -> Result<StateRecordStore> {
    ingest
        .load_or_build(&config.store_file)
        .with_context(|| format!("failed to load state data from {}", config.store_file.display()))
}
