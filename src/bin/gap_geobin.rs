use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gap_geobin::app::{App, DownloadOptions, ProgressSink};
use gap_geobin::config::ConfigLoader;
use gap_geobin::domain::{GeohashPrecision, YearRange};
use gap_geobin::error::GeobinError;
use gap_geobin::foss::FossHttpClient;
use gap_geobin::output::{JsonOutput, LogProgress, OutputMode, TextOutput};
use gap_geobin::pacing::{FixedDelay, RunControl};
use gap_geobin::store::SqliteStore;

#[derive(Parser)]
#[command(name = "gap-geobin")]
#[command(about = "Build a geohash-binned SQLite store of AFSC groundfish survey catches")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create the aggregate table (no-op if it already exists)")]
    CreateTable(CreateTableArgs),
    #[command(about = "Download survey-years, bin them by geohash and append to the store")]
    Download(DownloadArgs),
    #[command(about = "Show stored rows per survey-year")]
    Summary(SummaryArgs),
}

#[derive(Args)]
struct CreateTableArgs {
    #[arg(help = "SQLite file")]
    path: String,
}

#[derive(Args)]
struct DownloadArgs {
    #[arg(help = "Inclusive year range like 2000-2023")]
    years: String,

    #[arg(help = "SQLite file")]
    path: String,

    #[arg(help = "Geohash size, 1 - 12")]
    precision: String,

    #[arg(long)]
    config: Option<String>,

    #[arg(long, help = "Delete a survey-year's existing rows before writing it")]
    replace_existing: bool,

    #[arg(long, help = "Abort on the first failed survey-year")]
    fail_fast: bool,

    #[arg(long, help = "Stop starting new survey-years after this many seconds")]
    time_limit_secs: Option<u64>,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SummaryArgs {
    #[arg(help = "SQLite file")]
    path: String,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<GeobinError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GeobinError) -> u8 {
    match error {
        GeobinError::InvalidPrecision(_)
        | GeobinError::InvalidYearRange(_)
        | GeobinError::InvalidSurvey(_)
        | GeobinError::ConfigRead(_)
        | GeobinError::ConfigParse(_) => 2,
        GeobinError::UpstreamHttp(_)
        | GeobinError::UpstreamStatus { .. }
        | GeobinError::UpstreamMalformed(_)
        | GeobinError::IncompleteRun { .. } => 3,
        GeobinError::Store(_) | GeobinError::MissingTable(_) => 4,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::CreateTable(args) => {
            SqliteStore::create_table(&Utf8PathBuf::from(args.path))?;
            Ok(())
        }
        Commands::Download(args) => run_download(args),
        Commands::Summary(args) => run_summary(args),
    }
}

fn run_download(args: DownloadArgs) -> miette::Result<()> {
    // Validate everything before touching the network or the store.
    let years: YearRange = args.years.parse()?;
    let precision: GeohashPrecision = args.precision.parse()?;
    let config = ConfigLoader::resolve(args.config.as_deref())?;

    let output_mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let options = DownloadOptions {
        years,
        surveys: config.surveys.clone(),
        precision,
        fail_fast: args.fail_fast || config.fail_fast,
    };
    let control = match args.time_limit_secs {
        Some(secs) => RunControl::with_time_limit(Duration::from_secs(secs)),
        None => RunControl::new(),
    };

    let source = FossHttpClient::new(&config.base_url, config.page_size)?;
    let app = App::new(source, FixedDelay::new(config.pause));

    let mut store =
        SqliteStore::open(&Utf8PathBuf::from(args.path))?.replace_existing(args.replace_existing);
    store.ensure_schema()?;

    let progress: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &LogProgress,
    };
    let summary = app.download(&mut store, &options, &control, progress)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&summary).map_err(miette::Report::msg)?,
        OutputMode::Text => TextOutput::print_run(&summary),
    }

    if !summary.failed.is_empty() {
        return Err(GeobinError::IncompleteRun {
            failed: summary.failed.len(),
            total: summary.total_units(),
        }
        .into());
    }
    Ok(())
}

fn run_summary(args: SummaryArgs) -> miette::Result<()> {
    let store = SqliteStore::open_existing(&Utf8PathBuf::from(args.path))?;
    let units = store.summary()?;
    if args.json {
        JsonOutput::print_store(&units).map_err(miette::Report::msg)?;
    } else {
        TextOutput::print_store(&units);
    }
    Ok(())
}
