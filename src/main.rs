// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ntwk_datastore::config::{load_config_with_env, LoggingConfig};
use ntwk_datastore::{Dispatcher, Record};
use std::io::Read;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// ntwk-datastore - Save and retrieve speed measurement records
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save a JSON array of records
    Save {
        /// Input file, or "-" for stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Print a window of records as a JSON array
    Get {
        /// Number of records (overrides retrieval.count)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Earliest records first
        #[arg(long, conflicts_with = "last")]
        first: bool,

        /// Latest records (default)
        #[arg(long)]
        last: bool,

        /// Trailing hours, for backends that window by time
        #[arg(long)]
        hours: Option<u32>,
    },
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let log_level = match logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the records
    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn read_input(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {:?}", path)),
        _ => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read records from stdin")?;
            Ok(content)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config_with_env(&args.config)?;
    init_logging(&config.logging)?;

    info!("Loaded configuration from: {:?}", args.config);
    info!("Storage backend: {}", config.storage.backend);

    let dispatcher = Dispatcher::from_config(&config.storage)?;
    let destination = config.storage.destination();

    match args.command {
        Command::Save { input } => {
            let content = read_input(input.as_ref())?;
            let records: Vec<Record> =
                serde_json::from_str(&content).context("Input must be a JSON array of records")?;

            dispatcher
                .save(&records, &destination, &config.storage.fields)
                .await?;
            info!("Saved {} records", records.len());
        }
        Command::Get {
            count,
            first,
            last,
            hours,
        } => {
            if let Some(count) = count {
                config.retrieval.count = count;
            }
            if first {
                config.retrieval.first = true;
            } else if last {
                config.retrieval.first = false;
            }
            if hours.is_some() {
                config.retrieval.hours = hours;
            }

            let window = config.retrieval.window(dispatcher.window_unit());
            let records = dispatcher
                .get(&destination, &config.storage.fields, window)
                .await?;

            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}
