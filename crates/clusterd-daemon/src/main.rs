//! The cluster management daemon.
//!
//! ```bash
//! # Write a starter configuration
//! clusterd init --dir /var/lib/clusterd
//!
//! # Run the daemon
//! clusterd run --dir /var/lib/clusterd
//!
//! # Show the merged effective configuration
//! clusterd config --dir /var/lib/clusterd
//! ```

mod daemon;
mod heartbeat;

use clap::{Parser, Subcommand};
use clusterd_config::{paths, DaemonConfig};
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit codes shared with the surrounding tooling.
const EXIT_USAGE: u8 = 64;
const EXIT_CONFIG: u8 = 65;

/// clusterd - container and virtual machine cluster management daemon.
#[derive(Parser)]
#[command(name = "clusterd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter clusterd.toml into the target directory.
    Init {
        /// Directory the daemon will run from.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Run the daemon until interrupted.
    Run {
        /// Directory holding clusterd.toml and the data directory.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Print the merged effective configuration.
    Config {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version requests are not usage errors.
            if err.use_stderr() {
                let _ = err.print();
                return ExitCode::from(EXIT_USAGE);
            }
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
    };

    init_tracing();

    match cli.command {
        Commands::Init { dir } => init_config(&dir),
        Commands::Config { dir } => show_config(&dir),
        Commands::Run { dir } => {
            let config = match load_config(&dir) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("invalid configuration: {err:#}");
                    return ExitCode::from(EXIT_CONFIG);
                }
            };
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    eprintln!("failed to start runtime: {err}");
                    return ExitCode::FAILURE;
                }
            };
            match runtime.block_on(daemon::run(config)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("daemon failed: {err:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn load_config(dir: &PathBuf) -> anyhow::Result<DaemonConfig> {
    DaemonConfig::load_from_dir(dir)
}

fn init_config(dir: &PathBuf) -> ExitCode {
    let path = paths::project_config_file(dir);
    if path.exists() {
        eprintln!("{} already exists", path.display());
        return ExitCode::from(EXIT_CONFIG);
    }
    let starter = toml::to_string_pretty(&DaemonConfig::default()).expect("default config serializes");
    if let Err(err) = std::fs::write(&path, starter) {
        eprintln!("cannot write {}: {err}", path.display());
        return ExitCode::FAILURE;
    }
    println!("wrote {}", path.display());
    ExitCode::SUCCESS
}

fn show_config(dir: &PathBuf) -> ExitCode {
    match load_config(dir) {
        Ok(config) => {
            match toml::to_string_pretty(&config) {
                Ok(rendered) => println!("{rendered}"),
                Err(err) => {
                    eprintln!("cannot render configuration: {err}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("invalid configuration: {err:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}
