use std::env;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use clap::{ArgAction, Parser, ValueEnum};
use labobs_cli::logging::{init_logging, log_file_path, LogConfig, LogFormat};
use labobs_cli::pipeline::{self, RunSummary};
use labobs_cli::settings::load_settings;
use labobs_cli::source::read_rows;
use labobs_fhir::ConceptDisplayResolver;
use tracing::error;

/// Some rows or observation files failed; the bundle was still written.
const EXIT_PARTIAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "labobs",
    about = "Convert a lab-result table into FHIR Observations and a collection bundle."
)]
struct Args {
    /// Root data folder holding the source table [default: $HOME/data/gen-obs].
    #[arg(short, long)]
    rootdir: Option<PathBuf>,

    /// Configuration file with subject, performer and source table name.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Output folder [default: <rootdir>/out].
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// FHIR terminology server base URL; overrides the configuration file.
    #[arg(long)]
    tx_server: Option<String>,

    /// Per-request timeout for concept lookups.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Skip concept lookups; displays fall back to the row description.
    #[arg(long)]
    offline: bool,

    /// More log detail (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormatArg::Full)]
    log_format: LogFormatArg,

    /// Folder for timestamped log files.
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Log to stderr instead of a file.
    #[arg(long)]
    log_stderr: bool,

    /// Include cell values and dates in log output.
    #[arg(long)]
    log_data: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Full,
    Compact,
    Json,
}

fn default_rootdir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("data")
        .join("gen-obs")
}

fn log_config(args: &Args) -> LogConfig {
    let format = match args.log_format {
        LogFormatArg::Full => LogFormat::Full,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    let log_file =
        (!args.log_stderr).then(|| log_file_path(&args.log_dir, Local::now().naive_local()));
    LogConfig::from_verbosity(args.verbose)
        .with_format(format)
        .with_ansi(args.log_stderr && io::stderr().is_terminal())
        .with_log_file(log_file)
        .with_log_data(args.log_data)
}

fn run(args: &Args) -> anyhow::Result<RunSummary> {
    let settings = load_settings(&args.config)?;
    let rootdir = args.rootdir.clone().unwrap_or_else(default_rootdir);
    let source = rootdir.join(&settings.source_file);
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| rootdir.join("out"));

    let rows = read_rows(&source)?;
    pipeline::prepare_out_dir(&out_dir)?;

    let server = args
        .tx_server
        .as_deref()
        .unwrap_or(&settings.terminology_server);
    let lookup = pipeline::concept_lookup(
        args.offline,
        server,
        Duration::from_secs(args.timeout_secs),
    )?;
    let resolver = ConceptDisplayResolver::new(lookup);

    pipeline::run(
        &rows,
        &settings.run,
        &resolver,
        &out_dir,
        Local::now().naive_local(),
    )
    .with_context(|| format!("run over {} failed", source.display()))
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_logging(&log_config(&args)) {
        eprintln!("error: failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(summary) => {
            println!(
                "Rows processed: {}\nObservations bundled: {}\nFailed rows: {}\nUnwritten observation files: {}\nBundle: {}",
                summary.rows,
                summary.observations,
                summary.failed_rows,
                summary.write_failures,
                summary.bundle_path.display()
            );
            if summary.has_failures() {
                ExitCode::from(EXIT_PARTIAL)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            error!(error = ?err, "run aborted");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
