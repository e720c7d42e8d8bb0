//! Hash an operator password for the LIFELINE_USERS variable.

use std::io::{self, BufRead};

use anyhow::{bail, Context};
use clap::Parser;

/// Print a `username:<argon2 hash>` entry for LIFELINE_USERS
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Operator username
    #[arg(long)]
    username: String,

    /// Password; read from stdin when omitted
    #[arg(long)]
    password: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.username.is_empty() || args.username.contains([':', ';']) {
        bail!("Username must be non-empty and may not contain ':' or ';'");
    }

    let password = match args.password {
        Some(password) => password,
        None => {
            eprintln!("Password for {}:", args.username);
            let mut line = String::new();
            io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if password.is_empty() {
        bail!("Password must not be empty");
    }

    let hash = lifeline_core::hash_password(&password)?;
    println!("{}:{}", args.username, hash);
    eprintln!("Join multiple entries with ';' in LIFELINE_USERS");
    Ok(())
}
