#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::{path::PathBuf, time::Duration};

use clap::Parser;

/// Deliver votes from a voting machine, or collect them
#[derive(Parser, Debug)]
#[command(name = "ballot")]
#[command(about = "At-least-once vote delivery", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "BALLOT_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = find_config_file(cli.config)?;
    let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config from {}: {}",
            config_path.display(),
            e
        )
    })?;
    let ballot: ballot::controller::Ballot = ron::from_str(&config_content)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(ballot.run());

    // A blocked stdin read would otherwise hold the runtime open
    runtime.shutdown_timeout(Duration::from_secs(1));

    result
}

/// Find the configuration file using the following precedence:
/// 1. `--config` / `BALLOT_CONFIG`
/// 2. ./ballot.config.ron (current working directory)
/// 3. /etc/ballot/ballot.config.ron (system-wide config)
fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("Configuration file does not exist: {}", path.display());
    }

    let default_paths = vec![
        PathBuf::from("./ballot.config.ron"),
        PathBuf::from("/etc/ballot/ballot.config.ron"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config / BALLOT_CONFIG\n{paths_tried}"
    )
}
