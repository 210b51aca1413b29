//! Flux CLI - Command-line interface for Valence Flux
//!
//! Commands:
//! - capture: Score vectors from stdin → smoothed valence log (producer)
//! - sync: Relay the latest log row to the remote endpoint (consumer)
//! - latest: Print the latest log row once
//! - refresh: Force a biometric token refresh
//! - doctor: Diagnose configuration and file health

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use valence_flux::biometric::{BiometricEnricher, TokenStore};
use valence_flux::config::DEFAULT_CONFIG_PATH;
use valence_flux::pipeline::CapturePipeline;
use valence_flux::snapshot::SnapshotReader;
use valence_flux::sync::SyncClient;
use valence_flux::{FluxConfig, FluxError, FLUX_VERSION, PRODUCER_NAME};

/// Flux - Real-time affective valence pipeline
#[derive(Parser)]
#[command(name = "flux")]
#[command(author = "Synheart AI Inc")]
#[command(version = FLUX_VERSION)]
#[command(about = "Smooth emotion scores into valence and relay it", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read score vectors (NDJSON) from stdin and append smoothed readings
    Capture {
        /// Override the log path from config
        #[arg(long)]
        log: Option<PathBuf>,

        /// Disable heart-rate enrichment
        #[arg(long)]
        no_biometric: bool,
    },

    /// Poll the log and relay new readings to the remote endpoint
    Sync {
        /// Override the endpoint from config
        #[arg(long)]
        endpoint: Option<String>,

        /// Override the log path from config
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Print the latest complete log row
    Latest {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Refresh the biometric token pair once
    Refresh,

    /// Diagnose configuration and file health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), FluxCliError> {
    let mut config = if cli.config.exists() {
        FluxConfig::load(&cli.config)?
    } else {
        FluxConfig::load_or_default(&cli.config)
    };

    match cli.command {
        Commands::Capture { log, no_biometric } => {
            if let Some(log) = log {
                config.log.path = log;
            }
            if no_biometric {
                config.biometric.enabled = false;
            }
            cmd_capture(&config).await
        }
        Commands::Sync { endpoint, log } => {
            if let Some(endpoint) = endpoint {
                config.sync.endpoint = endpoint;
            }
            if let Some(log) = log {
                config.log.path = log;
            }
            cmd_sync(&config).await
        }
        Commands::Latest { json } => cmd_latest(&config, json),
        Commands::Refresh => cmd_refresh(&config).await,
        Commands::Doctor { json } => cmd_doctor(&config, &cli.config, json),
    }
}

async fn cmd_capture(config: &FluxConfig) -> Result<(), FluxCliError> {
    if atty::is(atty::Stream::Stdin) {
        tracing::warn!("stdin is a TTY; expecting one JSON score vector per line");
    }

    let mut pipeline = CapturePipeline::from_config(config)?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let summary = pipeline.run(stdin).await?;

    eprintln!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

async fn cmd_sync(config: &FluxConfig) -> Result<(), FluxCliError> {
    let mut client = SyncClient::from_config(config)?;
    client.run().await;
    Ok(())
}

fn cmd_latest(config: &FluxConfig, json: bool) -> Result<(), FluxCliError> {
    let record = SnapshotReader::new(&config.log.path)
        .latest()?
        .ok_or(FluxCliError::NoData)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("timestamp:  {}", record.timestamp);
        println!("valence:    {}", record.valence);
        println!(
            "heart_rate: {}",
            if record.heart_rate.is_empty() {
                "unknown"
            } else {
                record.heart_rate.as_str()
            }
        );
    }
    Ok(())
}

async fn cmd_refresh(config: &FluxConfig) -> Result<(), FluxCliError> {
    let mut enricher = BiometricEnricher::from_config(&config.biometric)?;
    enricher.refresh().await.ok_or(FluxCliError::RefreshFailed)?;
    println!(
        "Tokens refreshed and saved to {}",
        config.biometric.token_store.display()
    );
    Ok(())
}

fn cmd_doctor(config: &FluxConfig, config_path: &Path, json: bool) -> Result<(), FluxCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "flux_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Flux version {}", FLUX_VERSION),
    });

    checks.push(if config_path.exists() {
        DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!("Loaded {}", config_path.display()),
        }
    } else {
        DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} not found, using defaults", config_path.display()),
        }
    });

    // Log file
    let log_check = match SnapshotReader::new(&config.log.path).latest() {
        Ok(Some(record)) => DoctorCheck {
            name: "log".to_string(),
            status: CheckStatus::Ok,
            message: format!("Latest reading at {}", record.timestamp),
        },
        Ok(None) => DoctorCheck {
            name: "log".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} has no readings yet", config.log.path.display()),
        },
        Err(e) => DoctorCheck {
            name: "log".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read {}: {}", config.log.path.display(), e),
        },
    };
    checks.push(log_check);

    // Biometric credentials
    if config.biometric.enabled {
        checks.push(match TokenStore::new(&config.biometric.token_store).load() {
            Ok(_) => DoctorCheck {
                name: "token_store".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} holds a token pair", config.biometric.token_store.display()),
            },
            Err(e) => DoctorCheck {
                name: "token_store".to_string(),
                status: CheckStatus::Warning,
                message: format!("{} (heart rate will be unknown)", e),
            },
        });

        if config.biometric.client_id.is_empty() || config.biometric.client_secret.is_empty() {
            checks.push(DoctorCheck {
                name: "client_credentials".to_string(),
                status: CheckStatus::Warning,
                message: "client_id/client_secret not set; token refresh will fail".to_string(),
            });
        }
    }

    checks.push(if config.sync.endpoint.starts_with("http://") || config.sync.endpoint.starts_with("https://") {
        DoctorCheck {
            name: "endpoint".to_string(),
            status: CheckStatus::Ok,
            message: config.sync.endpoint.clone(),
        }
    } else {
        DoctorCheck {
            name: "endpoint".to_string(),
            status: CheckStatus::Error,
            message: format!("'{}' is not an http(s) URL", config.sync.endpoint),
        }
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Flux Doctor Report");
        println!("==================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(FluxCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum FluxCliError {
    Flux(FluxError),
    Json(serde_json::Error),
    NoData,
    RefreshFailed,
    DoctorFailed,
}

impl From<FluxError> for FluxCliError {
    fn from(e: FluxError) -> Self {
        FluxCliError::Flux(e)
    }
}

impl From<serde_json::Error> for FluxCliError {
    fn from(e: serde_json::Error) -> Self {
        FluxCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FluxCliError> for CliError {
    fn from(e: FluxCliError) -> Self {
        match e {
            FluxCliError::Flux(e) => {
                let (code, hint) = match &e {
                    FluxError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                    FluxError::Config(_) | FluxError::Toml(_) | FluxError::InvalidWindow(_) => {
                        ("CONFIG_ERROR", "Check the config file; run 'flux doctor'")
                    }
                    FluxError::TokenStore(_) => {
                        ("TOKEN_STORE_ERROR", "Ensure the token file holds an access and refresh token")
                    }
                    FluxError::Http(_) => ("HTTP_ERROR", "Check network connectivity"),
                    _ => ("PARSE_ERROR", "Check input format"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            FluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            FluxCliError::NoData => CliError {
                code: "NO_DATA".to_string(),
                message: "Log has no complete readings".to_string(),
                hint: Some("Start 'flux capture' first".to_string()),
            },
            FluxCliError::RefreshFailed => CliError {
                code: "REFRESH_FAILED".to_string(),
                message: "Token refresh was rejected".to_string(),
                hint: Some("Re-authorize with the provider to obtain a new token pair".to_string()),
            },
            FluxCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
