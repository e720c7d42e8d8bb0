//! Send a telemetry file to a status server running with LIFELINE_SOURCE=push.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use lifeline_cli::{StatusClient, TelemetryPush};

/// Queue drones, inventory and/or maintenance records from a JSON file
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Status server URL
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Operator token (falls back to LIFELINE_OPERATOR_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// JSON file with any of "drones", "inventory", "maintenance"
    file: PathBuf,

    /// Overwrite drone last_update with the current time
    #[arg(long)]
    stamp_now: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let token = args
        .token
        .or_else(|| std::env::var("LIFELINE_OPERATOR_TOKEN").ok())
        .context("No operator token: pass --token or set LIFELINE_OPERATOR_TOKEN")?;

    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let mut update: TelemetryPush = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid telemetry document", args.file.display()))?;
    if args.stamp_now {
        update.stamp(chrono::Utc::now());
    }

    let client = StatusClient::new(&args.url).with_token(token);
    let queued = client.push(&update)?;
    println!("Queued for next refresh: {}", queued);
    Ok(())
}
