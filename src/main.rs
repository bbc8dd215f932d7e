use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use sitebudget_lib::{settings, sites::limit_from_minutes, utils::logging, AppState};

#[derive(Parser)]
#[command(name = "sitebudget", version, about = "Daily time budgets for distracting websites")]
struct Cli {
    /// Data directory (defaults to $SITEBUDGET_HOME, then ./.sitebudget)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enforce budgets for browser events read from stdin
    Watch,
    /// Register a site, or update its message and limit
    Add {
        /// Any URL on the site
        url: String,
        /// Reminder shown on the blocked page
        #[arg(long, default_value = "")]
        message: String,
        /// Daily limit in minutes
        #[arg(long)]
        limit_minutes: Option<u64>,
    },
    /// Stop monitoring a site
    Remove { site_id: String },
    /// Show monitored sites and their usage
    List {
        #[arg(long)]
        json: bool,
    },
    /// Lift today's block for a site
    Unlock {
        site_id: String,
        /// Why the site is needed right now
        #[arg(long)]
        reason: String,
    },
    /// Print and clear the most recent blocked-page notice
    Notice,
    /// Show engine settings, changing any that are given
    Config {
        /// Page blocked tabs are sent to
        #[arg(long)]
        blocked_page_url: Option<String>,
        /// Limit used by `add` when none is given
        #[arg(long)]
        default_limit_minutes: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    logging::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let state = AppState::open(settings::data_dir(cli.data_dir))?;
    let ledger = state.ledger();

    match cli.command {
        Commands::Watch => sitebudget_lib::watch(&state).await?,
        Commands::Add {
            url,
            message,
            limit_minutes,
        } => {
            let minutes =
                limit_minutes.unwrap_or(state.engine_settings().default_daily_limit_minutes);
            let site_id = ledger
                .add_site(&url, &message, limit_from_minutes(minutes)?)
                .await?;
            println!("Monitoring {site_id} ({minutes} min/day)");
        }
        Commands::Remove { site_id } => {
            if !ledger.remove_site(&site_id).await? {
                bail!("no site registered as {site_id}");
            }
            println!("Removed {site_id}");
        }
        Commands::List { json } => {
            let sites = ledger.list_sites().await?;
            if json {
                let mut map = serde_json::Map::new();
                for (id, record) in sites {
                    map.insert(id, serde_json::to_value(record)?);
                }
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else if sites.is_empty() {
                println!("No sites monitored");
            } else {
                for (id, record) in sites {
                    println!(
                        "{id}  {}/{}s used  visits={} blocked_visits={} unlocks={}{}",
                        record.accumulated_seconds,
                        record.daily_limit_seconds,
                        record.total_visits,
                        record.total_visits_when_blocked,
                        record.unlocks,
                        if record.blocked { "  [blocked]" } else { "" },
                    );
                }
            }
        }
        Commands::Unlock { site_id, reason } => {
            let record = ledger.unlock_site(&site_id, &reason).await?;
            println!("Unlocked {site_id} ({} unlocks so far)", record.unlocks);
        }
        Commands::Notice => match ledger.take_blocked_notice().await? {
            Some(notice) => println!("{}", serde_json::to_string(&notice)?),
            None => println!("No pending notice"),
        },
        Commands::Config {
            blocked_page_url,
            default_limit_minutes,
        } => {
            let mut current = state.engine_settings();
            let changed = blocked_page_url.is_some() || default_limit_minutes.is_some();
            if let Some(url) = blocked_page_url {
                current.blocked_page_url = url;
            }
            if let Some(minutes) = default_limit_minutes {
                limit_from_minutes(minutes)?;
                current.default_daily_limit_minutes = minutes;
            }
            if changed {
                state.settings.update(current.clone())?;
            }
            println!("# {}", state.settings.path().display());
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
    }

    Ok(())
}
