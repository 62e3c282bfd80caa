//! streamfold - replay, serve, and issue streaming-response calls

mod commands;
mod config;
mod script;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use streamfold_core::CompletionResult;
use tracing_subscriber::EnvFilter;

use config::Config;
use script::Script;

#[derive(Parser)]
#[command(name = "streamfold", version, about)]
struct Cli {
    /// Config file (defaults to ~/.streamfold/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scripted session through the in-process driver
    Replay {
        script: PathBuf,
        #[arg(long, default_value = "")]
        request: String,
    },
    /// Answer every incoming call with a scripted response
    Serve {
        script: PathBuf,
        #[arg(long)]
        address: Option<String>,
    },
    /// Send one request to a server and print the responses
    Call {
        request: String,
        #[arg(long)]
        address: Option<String>,
        /// Cancel the call if it has not finished after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config.log_level);

    match cli.command {
        Command::Replay { script, request } => {
            let script = Script::load(&script)?;
            let result = commands::replay::run(script, Bytes::from(request)).await?;
            Ok(print_outcome(result))
        }
        Command::Serve { script, address } => {
            let script = Script::load(&script)?;
            let address = address.unwrap_or_else(|| config.address.clone());
            commands::serve::run(&address, script).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Call {
            request,
            address,
            timeout_secs,
        } => {
            let address = address.unwrap_or_else(|| config.address.clone());
            let result = commands::call::run(
                &address,
                config.connect_timeout(),
                timeout_secs.map(Duration::from_secs),
                Bytes::from(request),
            )
            .await?;
            Ok(print_outcome(result))
        }
    }
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_outcome(result: CompletionResult) -> ExitCode {
    match result {
        Ok(chunks) => {
            for chunk in chunks {
                println!("{}", String::from_utf8_lossy(&chunk));
            }
            ExitCode::SUCCESS
        }
        Err(status) => {
            eprintln!("call failed: {status}");
            ExitCode::FAILURE
        }
    }
}
