mod client;
mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::client::{DEFAULT_SERVER_URL, HttpTransport};
use crate::commands::{
    cmd_add, cmd_alerts, cmd_delete, cmd_edit, cmd_household_join, cmd_household_leave,
    cmd_household_show, cmd_list, cmd_notified, cmd_stats, cmd_sync,
};
use crate::config::Config;
use larder_core::db::Database;
use larder_core::models::DEFAULT_REMINDER_DAYS;
use larder_core::server_store::ServerStore;
use larder_core::stats::ALERT_WINDOW_DAYS;

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "Track what's about to expire, and share it with your household"
)]
struct Cli {
    /// Sync server base URL
    #[arg(long, global = true, env = "LARDER_SERVER", default_value = DEFAULT_SERVER_URL)]
    server: String,
    /// Per-request network timeout in seconds
    #[arg(long, global = true, env = "LARDER_TIMEOUT", default_value = "5")]
    timeout: u64,
    /// Directory holding the local database (default: platform data dir)
    #[arg(long, global = true, env = "LARDER_DATA_DIR", value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a new item
    Add {
        /// Item name
        name: String,
        /// Expiry date (YYYY-MM-DD or today/tomorrow)
        expiry: String,
        /// Category: food, medicine, document, other
        #[arg(short, long, default_value = "food")]
        category: String,
        /// Days before expiry to send a reminder
        #[arg(short, long, default_value_t = DEFAULT_REMINDER_DAYS)]
        reminder: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List tracked items, soonest expiry first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Items expired or expiring soon, soonest first
    Alerts {
        /// Look-ahead window in days
        #[arg(long, default_value_t = ALERT_WINDOW_DAYS)]
        within: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change an item's name, category, expiry or reminder
    Edit {
        /// Item ID
        id: i64,
        #[arg(long)]
        name: Option<String>,
        /// New expiry date (YYYY-MM-DD or today/tomorrow)
        #[arg(long)]
        expiry: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        reminder: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an item here and on the sync server
    Delete {
        /// Item ID
        id: i64,
        /// Only delete the local row (it returns on the next sync)
        #[arg(long)]
        local_only: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an item's reminder as sent
    Notified {
        /// Item ID
        id: i64,
        /// Clear the flag instead
        #[arg(long)]
        clear: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push local items and pull the household's items
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show expiry statistics (server when reachable, else local)
    Stats {
        /// Skip the server and count local items only
        #[arg(long)]
        local: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage shared household membership
    Household {
        #[command(subcommand)]
        command: HouseholdCommands,
    },
    /// Start the sync server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Server database path (default: larder-server.db in the data dir)
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum HouseholdCommands {
    /// Show the current household and sync namespace
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Join a household by its shared ID
    Join {
        /// Household ID (case-insensitive)
        id: String,
        /// Don't sync right after joining
        #[arg(long)]
        no_sync: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Leave the household and sync under this device's own ID
    Leave {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
/// `RUST_LOG` overrides the default level.
fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if matches!(cli.command, Commands::Serve { .. }) {
        init_tracing("larder=info,larder_core=info,tower_http=info");
    } else {
        init_tracing("warn");
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.data_dir)?;
    let local_db = || Database::open(&config.db_path);
    let transport = || HttpTransport::new(&cli.server, Duration::from_secs(cli.timeout));

    match cli.command {
        Commands::Add {
            name,
            expiry,
            category,
            reminder,
            json,
        } => cmd_add(&local_db()?, &name, &expiry, &category, reminder, json),
        Commands::List { json } => cmd_list(&local_db()?, json),
        Commands::Alerts { within, json } => cmd_alerts(&local_db()?, within, json),
        Commands::Edit {
            id,
            name,
            expiry,
            category,
            reminder,
            json,
        } => cmd_edit(
            &local_db()?,
            id,
            name,
            expiry.as_deref(),
            category.as_deref(),
            reminder,
            json,
        ),
        Commands::Delete {
            id,
            local_only,
            json,
        } => {
            let db = local_db()?;
            let transport = if local_only { None } else { Some(transport()?) };
            cmd_delete(&db, transport, id, json).await
        }
        Commands::Notified { id, clear, json } => cmd_notified(&local_db()?, id, clear, json),
        Commands::Sync { json } => cmd_sync(&local_db()?, transport()?, json).await,
        Commands::Stats { local, json } => {
            let db = local_db()?;
            let transport = if local {
                None
            } else {
                transport()
                    .inspect_err(|e| tracing::warn!(error = %e, "sync server unusable; using local stats"))
                    .ok()
            };
            cmd_stats(&db, transport, json).await
        }
        Commands::Household { command } => {
            let db = local_db()?;
            match command {
                HouseholdCommands::Show { json } => cmd_household_show(&db, json),
                HouseholdCommands::Join { id, no_sync, json } => {
                    let transport = if no_sync {
                        None
                    } else {
                        transport()
                            .inspect_err(|e| tracing::warn!(error = %e, "sync server unusable; skipping sync"))
                            .ok()
                    };
                    cmd_household_join(&db, &id, transport, json).await
                }
                HouseholdCommands::Leave { json } => cmd_household_leave(&db, json),
            }
        }
        Commands::Serve { port, bind, db } => {
            let store = ServerStore::open(&db.unwrap_or(config.server_db_path))?;
            server::start_server(store, port, &bind).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::household::HouseholdResolver;
    use std::path::Path;

    /// Parse a command line against `dir` with an unusable server URL.
    fn offline_cli(dir: &Path, args: &[&str]) -> Cli {
        let mut argv = vec![
            "larder",
            "--data-dir",
            dir.to_str().unwrap(),
            "--server",
            "not a url",
        ];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    fn open_db(dir: &Path) -> Database {
        Database::open(&dir.join("larder.db")).unwrap()
    }

    #[tokio::test]
    async fn stats_fall_back_when_server_url_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        run(offline_cli(tmp.path(), &["add", "Milk", "2100-01-01"]))
            .await
            .unwrap();

        run(offline_cli(tmp.path(), &["stats"])).await.unwrap();
        run(offline_cli(tmp.path(), &["stats", "--local", "--json"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn local_delete_ignores_invalid_server_url() {
        let tmp = tempfile::tempdir().unwrap();
        run(offline_cli(tmp.path(), &["add", "Milk", "2100-01-01"]))
            .await
            .unwrap();
        let id = open_db(tmp.path()).list_items().unwrap()[0].id.to_string();

        run(offline_cli(tmp.path(), &["delete", &id, "--local-only"]))
            .await
            .unwrap();
        assert!(open_db(tmp.path()).list_items().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_and_sync_need_a_valid_server_url() {
        let tmp = tempfile::tempdir().unwrap();
        run(offline_cli(tmp.path(), &["add", "Milk", "2100-01-01"]))
            .await
            .unwrap();
        let id = open_db(tmp.path()).list_items().unwrap()[0].id.to_string();

        assert!(run(offline_cli(tmp.path(), &["sync"])).await.is_err());
        assert!(run(offline_cli(tmp.path(), &["delete", &id])).await.is_err());
        assert_eq!(open_db(tmp.path()).list_items().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn join_is_kept_when_server_url_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        run(offline_cli(tmp.path(), &["household", "join", "the smiths"]))
            .await
            .unwrap();

        let db = open_db(tmp.path());
        let resolver = HouseholdResolver::new(&db);
        assert_eq!(resolver.current().unwrap().as_deref(), Some("THE SMITHS"));
    }

    #[tokio::test]
    async fn alerts_runs_offline() {
        let tmp = tempfile::tempdir().unwrap();
        run(offline_cli(tmp.path(), &["add", "Milk", "2000-01-01"]))
            .await
            .unwrap();
        run(offline_cli(tmp.path(), &["alerts", "--within", "7", "--json"]))
            .await
            .unwrap();
    }

    #[test]
    fn join_accepts_no_sync_flag() {
        let cli = Cli::parse_from(["larder", "household", "join", "abc", "--no-sync"]);
        assert!(matches!(
            cli.command,
            Commands::Household {
                command: HouseholdCommands::Join { no_sync: true, .. }
            }
        ));
    }
}
