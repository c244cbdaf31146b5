mod commands;
mod config;
mod remote;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    EntryArgs, cmd_add, cmd_delete, cmd_edit, cmd_export, cmd_goals_set, cmd_goals_show,
    cmd_history, cmd_import, cmd_reset, cmd_summary, cmd_sync_pull, cmd_sync_status,
};
use crate::config::Config;
use crate::remote::RemoteClient;
use intake_core::db::Database;
use intake_core::service::IntakeService;

#[derive(Parser)]
#[command(
    name = "intake",
    version,
    about = "A simple protein and water tracker CLI",
    long_about = "Log protein (grams) and water (liters) through the day, track them against \
daily goals, and import or export the log as CSV.\n\n\
Set INTAKE_SUPABASE_URL, INTAKE_SUPABASE_ANON_KEY, INTAKE_ACCESS_TOKEN and INTAKE_USER_ID \
to mirror every change to a hosted backend."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log protein and/or water
    Add {
        /// Protein in grams (e.g. "30" or "30g")
        #[arg(short, long)]
        protein: Option<String>,
        /// Water in liters (e.g. "0.5", "0.5l" or "500ml")
        #[arg(short, long)]
        water: Option<String>,
        /// Time of day (e.g. "08:30", "8:30 pm"; default: now)
        #[arg(short, long)]
        time: Option<String>,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Optional note
        #[arg(short, long)]
        note: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an entry
    Edit {
        /// Entry ID
        id: String,
        /// New protein amount in grams
        #[arg(short, long)]
        protein: Option<String>,
        /// New water amount in liters
        #[arg(short, long)]
        water: Option<String>,
        /// New time of day
        #[arg(short, long)]
        time: Option<String>,
        /// New date (YYYY-MM-DD or today/yesterday/tomorrow)
        #[arg(long)]
        date: Option<String>,
        /// New note (pass "" to clear)
        #[arg(short, long)]
        note: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an entry by ID
    Delete {
        /// Entry ID to delete
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every entry (goals are kept)
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a day's log against your goals (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily totals for the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "14")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or set daily goals
    Goals {
        #[command(subcommand)]
        command: GoalsCommands,
    },
    /// Import entries from a CSV file (date,time,protein,water,note)
    Import {
        /// Path to the CSV file
        file: PathBuf,
        /// Preview import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export all entries as CSV
    Export {
        /// Output file (default: protein_water_<today>.csv)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Write to stdout instead of a file
        #[arg(long, conflicts_with = "output")]
        stdout: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cloud sync with the hosted backend
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum GoalsCommands {
    /// Show daily goals
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set daily goals (omitted values are kept)
    Set {
        /// Daily protein goal in grams
        #[arg(long)]
        protein: Option<String>,
        /// Daily water goal in liters
        #[arg(long)]
        water: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Replace the local log with the backend's copy
    Pull {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show whether cloud sync is active
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("intake=warn,intake_core=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::open(&config.db_path)?;
    let svc = IntakeService::new(db).with_owner(config.owner());
    let remote = config.remote.clone().map(RemoteClient::new).transpose()?;
    let remote_ref = remote.as_ref();

    match cli.command {
        Commands::Add {
            protein,
            water,
            time,
            date,
            note,
            json,
        } => {
            let args = EntryArgs {
                protein,
                water,
                time,
                date,
                note,
            };
            cmd_add(&svc, remote_ref, args, json).await
        }
        Commands::Edit {
            id,
            protein,
            water,
            time,
            date,
            note,
            json,
        } => {
            let args = EntryArgs {
                protein,
                water,
                time,
                date,
                note,
            };
            cmd_edit(&svc, remote_ref, &id, args, json).await
        }
        Commands::Delete { id, json } => cmd_delete(&svc, remote_ref, &id, json).await,
        Commands::Reset { yes, json } => cmd_reset(&svc, remote_ref, yes, json).await,
        Commands::Summary { date, json } => cmd_summary(&svc, date, json),
        Commands::History { days, json } => cmd_history(&svc, days, json),
        Commands::Goals { command } => match command {
            GoalsCommands::Show { json } => cmd_goals_show(&svc, json),
            GoalsCommands::Set {
                protein,
                water,
                json,
            } => cmd_goals_set(&svc, remote_ref, protein, water, json).await,
        },
        Commands::Import {
            file,
            dry_run,
            json,
        } => cmd_import(&svc, remote_ref, &file, dry_run, json).await,
        Commands::Export {
            output,
            stdout,
            json,
        } => cmd_export(&svc, output, stdout, json),
        Commands::Sync { command } => match command {
            SyncCommands::Pull { json } => cmd_sync_pull(&svc, remote_ref, json).await,
            SyncCommands::Status { json } => cmd_sync_status(&svc, remote_ref, json),
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?.0)
            };
            server::start_server(svc, remote, port, &bind, api_key).await
        }
    }
}
