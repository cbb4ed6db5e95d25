//! CLI entry point for the blob round-trip job.
//!
//! `run` performs a single invocation and exits non-zero if it fails;
//! `schedule` keeps invoking it on a fixed interval.

use anyhow::Result;
use blob_roundtrip_job::config::{JobConfig, Settings};
use blob_roundtrip_job::infra::blob::AzureConnector;
use blob_roundtrip_job::infra::credential::DefaultCredential;
use blob_roundtrip_job::infra::keys::KeyVaultSecretStore;
use blob_roundtrip_job::job::{self, RunParameters, RunReport};
use blob_roundtrip_job::schedule::{DEFAULT_INTERVAL, Schedule};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "blob_roundtrip_job")]
#[command(about = "Writes a status record to object storage and rewrites it", long_about = None)]
struct Cli {
    /// Directory holding the optional appsettings.json
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,

    #[command(flatten)]
    record: RecordArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RecordArgs {
    /// Account name written into the record
    #[arg(long, global = true, default_value = "My Account")]
    account: String,

    /// Group name written into the record
    #[arg(long, global = true, default_value = "My Group")]
    group: String,

    /// Status the record is created with
    #[arg(long, global = true, default_value = "Pending")]
    status: String,

    /// Status written by the update pass
    #[arg(long, global = true, default_value = "UpdatedStatus")]
    updated_status: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform a single run
    Run,
    /// Run on a fixed interval
    Schedule {
        /// Seconds between runs; fire times are aligned to multiples of it
        #[arg(short = 'i', long, default_value_t = DEFAULT_INTERVAL.as_secs())]
        interval_secs: u64,

        /// Number of runs before exiting (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 0)]
        runs: usize,

        /// Run once immediately instead of waiting for the first fire time
        #[arg(long, default_value_t = false)]
        run_on_startup: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = init_tracing()?;

    let cli = Cli::parse();
    let params = RunParameters {
        account_name: cli.record.account,
        group_name: cli.record.group,
        status: cli.record.status,
        updated_status: cli.record.updated_status,
    };

    match cli.command {
        Commands::Run => {
            invoke(&cli.config_dir, &params).await?;
        }
        Commands::Schedule {
            interval_secs,
            runs,
            run_on_startup,
        } => {
            let schedule = Schedule::every(Duration::from_secs(interval_secs))?;
            info!(interval_secs, runs, run_on_startup, "Schedule started");
            schedule
                .run(runs, run_on_startup, || invoke(&cli.config_dir, &params))
                .await;
        }
    }

    Ok(())
}

/// Logging setup: colored stderr + JSON rolling log file.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/blob_roundtrip_job.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("blob_roundtrip_job.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter("RUST_LOG", "info"));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(env_filter("RUST_LOG_JSON", "debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(file_guard)
}

/// Directives from `var`, or `default` when it is unset or unparsable.
fn env_filter(var: &str, default: &str) -> EnvFilter {
    filter_or_default(std::env::var(var).ok().as_deref(), default)
}

fn filter_or_default(directives: Option<&str>, default: &str) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}

/// Loads configuration fresh and performs one run against Key Vault and
/// Blob Storage.
async fn invoke(config_dir: &Path, params: &RunParameters) -> Result<RunReport> {
    let settings = Settings::load(config_dir)?;
    let config = JobConfig::from_settings(&settings)?;

    let credential = Arc::new(DefaultCredential::from_env()?);
    let secrets = KeyVaultSecretStore::new(&config.key_vault_uri, credential)?;
    let connector = AzureConnector {
        endpoint: config.blob_endpoint.clone(),
    };

    let report = job::run(&config, params, &secrets, &connector).await?;
    info!(
        container = %report.container,
        blob = %report.blob_name,
        records_written = report.records_written,
        records_updated = report.records_updated,
        "Run complete"
    );
    Ok(report)
}
