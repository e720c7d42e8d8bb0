//! Print the fleet dashboard from a running status server.

use std::thread;
use std::time::Duration;

use clap::Parser;
use lifeline_cli::report::{
    parse_severity, render_activities, render_alerts, render_missions, render_overview,
};
use lifeline_cli::StatusClient;
use lifeline_core::AlertSeverity;

/// Show fleet, inventory and maintenance summaries with open alerts
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Status server URL
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Only show alerts of this severity (info, warning, critical)
    #[arg(long, value_parser = parse_severity)]
    severity: Option<AlertSeverity>,

    /// Number of recent activity entries to show
    #[arg(long, default_value_t = 5)]
    activities: usize,

    /// Refresh every N seconds until interrupted
    #[arg(long)]
    watch: Option<u64>,
}

fn print_dashboard(client: &StatusClient, args: &Args) -> anyhow::Result<()> {
    let fleet = client.fleet_overview()?;
    let inventory = client.inventory_overview()?;
    let maintenance = client.maintenance_overview()?;
    let missions = client.missions()?;
    let alerts = client.alerts(args.severity)?;

    print!("{}", render_overview(&fleet, &inventory, &maintenance));
    println!("{}", render_missions(&missions));
    println!("Open alerts ({}):", alerts.len());
    print!("{}", render_alerts(&alerts));

    if args.activities > 0 {
        let entries = client.recent_activities(args.activities)?;
        println!("\nRecent activity:");
        print!("{}", render_activities(&entries));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = StatusClient::new(&args.url);

    let Some(every) = args.watch else {
        return print_dashboard(&client, &args);
    };

    loop {
        println!("=== {} ===", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        if let Err(e) = print_dashboard(&client, &args) {
            eprintln!("Error fetching status: {:#}", e);
        }
        println!();
        thread::sleep(Duration::from_secs(every.max(1)));
    }
}
