//! tlsfront: a TLS-terminating HTTP front-end.
//!
//! This is the binary entry point. It initializes tracing, loads configuration
//! from TOML or httpd files, and either serves, audits a configuration, or
//! probes a running server against a Mozilla TLS profile.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tlsfront::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER, DEFAULT_LOG_FORMAT};
use tlsfront::profile::{self, Guidelines, ProbeTarget, ProfileReport};

/// tlsfront: TLS termination, HTTPS redirect, HSTS and OCSP stapling
#[derive(Parser, Debug)]
#[command(name = "tlsfront", version, about)]
struct Args {
    /// Log level filter (e.g., "tlsfront=debug,tower_http=info")
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Path to configuration file (.toml, or .conf for httpd syntax)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the front-end
    Serve,
    /// Audit a configuration against a Mozilla TLS profile
    Check {
        /// old, intermediate or modern
        #[arg(short, long)]
        profile: String,

        /// Guidelines JSON to use instead of the built-in 5.3 version
        #[arg(long)]
        guidelines: Option<PathBuf>,
    },
    /// Scan a running server against a Mozilla TLS profile
    Probe {
        /// host[:port]
        target: String,

        #[arg(short, long)]
        profile: String,

        #[arg(long)]
        guidelines: Option<PathBuf>,
    },
}

fn init_tracing(log_level: Option<String>, format: &str) {
    // Priority: CLI > env > default
    let log_filter = log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn print_report(report: &ProfileReport) -> ExitCode {
    println!("{}", report);
    if report.all_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();
    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = match AppConfig::load(&args.config) {
                Ok(config) => config,
                Err(e) => {
                    init_tracing(args.log_level, DEFAULT_LOG_FORMAT);
                    return Err(e.into());
                }
            };
            init_tracing(args.log_level, &config.logging.format);
            tracing::info!("Loaded configuration");

            tlsfront::start_server(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check {
            profile: name,
            guidelines,
        } => {
            init_tracing(args.log_level, DEFAULT_LOG_FORMAT);
            let config = AppConfig::load(&args.config)?;
            let guidelines = Guidelines::load(guidelines.as_deref())?;
            let report = profile::check_config(&config, guidelines.profile(&name)?)?;
            Ok(print_report(&report))
        }
        Command::Probe {
            target,
            profile: name,
            guidelines,
        } => {
            init_tracing(args.log_level, DEFAULT_LOG_FORMAT);
            let target: ProbeTarget = target.parse()?;
            let guidelines = Guidelines::load(guidelines.as_deref())?;
            let report = profile::probe(&target, guidelines.profile(&name)?).await?;
            Ok(print_report(&report))
        }
    }
}
