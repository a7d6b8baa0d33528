mod client;
mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::client::ApiClient;
use crate::commands::{
    DeleteTarget, ListOptions, SettingsUpdate, cmd_settings_reset, cmd_settings_set,
    cmd_settings_show, cmd_weight_add, cmd_weight_delete, cmd_weight_export, cmd_weight_import,
    cmd_weight_list, cmd_weight_template, cmd_weight_update,
};
use crate::config::Config;
use bodytrack_core::gateway::{LocalGateway, WeightGateway};
use bodytrack_core::service::TrackerService;

#[derive(Parser)]
#[command(
    name = "bodytrack",
    version,
    about = "Track smart-scale body composition measurements",
    long_about = "Track smart-scale body composition measurements.\n\n\
        Commands work against the local database unless --server points at a \
        running `bodytrack serve`."
)]
struct Cli {
    /// Base URL of a running bodytrack server (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, env = "BODYTRACK_SERVER")]
    server: Option<String>,
    /// API key for --server
    #[arg(long, global = true, env = "BODYTRACK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record, browse and bulk-edit weight entries
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Show or change display settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
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
enum WeightCommands {
    /// Add a weight entry
    Add {
        /// Weight value
        #[arg(short, long)]
        weight: f64,
        /// Date (MM-DD-YY, YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Extra metric, e.g. -m "Body Fat %=21.4" (repeatable)
        #[arg(short, long = "metric", value_name = "NAME=VALUE")]
        metrics: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a page of entries using the configured table columns
    List {
        /// Column to sort by (e.g. Date, Weight, BMI)
        #[arg(short, long)]
        sort: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
        /// Page to show (1-indexed)
        #[arg(short, long, default_value = "1")]
        page: usize,
        /// Rows per page: 10, 25, 50, 100 or all (remembered)
        #[arg(short, long)]
        rows: Option<String>,
        /// Print the default chart series instead of the table
        #[arg(long)]
        chart: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change fields of an entry
    Update {
        /// Entry ID (24 hex characters)
        id: String,
        /// New date
        #[arg(long)]
        date: Option<String>,
        /// New weight
        #[arg(short, long)]
        weight: Option<f64>,
        /// Metric to set (repeatable)
        #[arg(short, long = "metric", value_name = "NAME=VALUE")]
        metrics: Vec<String>,
        /// Metric to remove (repeatable)
        #[arg(long, value_name = "NAME")]
        clear: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete entries by ID, a whole page, or everything
    Delete {
        /// Entry IDs
        #[arg(conflicts_with_all = ["page", "all"])]
        ids: Vec<String>,
        /// Delete every entry on this page of `weight list`
        #[arg(long, conflicts_with = "all")]
        page: Option<usize>,
        /// Delete every entry
        #[arg(long)]
        all: bool,
        /// Sort used to lay out pages (with --page)
        #[arg(short, long)]
        sort: Option<String>,
        /// Sort descending (with --page)
        #[arg(long)]
        desc: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import entries from a CSV file
    Import {
        /// Path to the CSV file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export all entries as CSV
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print an empty CSV with the import headers
    Template {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change settings; unspecified fields are left as they are
    Set {
        /// Table columns, comma-separated (Date is always first)
        #[arg(long, value_name = "LIST")]
        table: Option<String>,
        /// Chart series, comma-separated
        #[arg(long, value_name = "LIST")]
        chart: Option<String>,
        /// Chart series shown by default, comma-separated
        #[arg(long, value_name = "LIST")]
        visible: Option<String>,
        /// Goal weight
        #[arg(long, conflicts_with = "clear_goal")]
        goal_weight: Option<f64>,
        /// Remove the goal weight
        #[arg(long)]
        clear_goal: bool,
        /// Dark mode on or off
        #[arg(long)]
        dark_mode: Option<bool>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore default settings (dark mode is kept)
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bodytrack=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
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

    match cli.command {
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, new) = config.load_or_create_api_key()?;
                if new {
                    eprintln!("Generated API key: {key}");
                }
                Some(key)
            };
            let service = TrackerService::new(&config.db_path)?;
            server::start_server(service, port, &bind, api_key).await
        }
        Commands::Weight { command } => {
            let gateway = open_gateway(cli.server, cli.api_key, &config)?;
            tokio::task::spawn_blocking(move || run_weight(command, gateway.as_ref(), &config))
                .await?
        }
        Commands::Settings { command } => {
            let gateway = open_gateway(cli.server, cli.api_key, &config)?;
            tokio::task::spawn_blocking(move || run_settings(command, gateway.as_ref())).await?
        }
    }
}

/// Remote gateway when a server URL is given, otherwise the local database.
fn open_gateway(
    server: Option<String>,
    api_key: Option<String>,
    config: &Config,
) -> Result<Box<dyn WeightGateway + Send>> {
    match server {
        Some(url) => Ok(Box::new(ApiClient::new(&url, api_key)?)),
        None => Ok(Box::new(LocalGateway::new(TrackerService::new(
            &config.db_path,
        )?))),
    }
}

fn run_weight(
    command: WeightCommands,
    gateway: &dyn WeightGateway,
    config: &Config,
) -> Result<()> {
    match command {
        WeightCommands::Add {
            weight,
            date,
            metrics,
            json,
        } => cmd_weight_add(gateway, weight, date, &metrics, json),
        WeightCommands::List {
            sort,
            desc,
            page,
            rows,
            chart,
            json,
        } => cmd_weight_list(
            gateway,
            config,
            &ListOptions {
                sort,
                desc,
                page,
                rows,
                chart,
                json,
            },
        ),
        WeightCommands::Update {
            id,
            date,
            weight,
            metrics,
            clear,
            json,
        } => cmd_weight_update(gateway, &id, date, weight, &metrics, &clear, json),
        WeightCommands::Delete {
            ids,
            page,
            all,
            sort,
            desc,
            yes,
            json,
        } => {
            let target = if all {
                DeleteTarget::All
            } else if let Some(page) = page {
                DeleteTarget::Page { page, sort, desc }
            } else {
                DeleteTarget::Ids(ids)
            };
            cmd_weight_delete(gateway, config, target, yes, json)
        }
        WeightCommands::Import { file, json } => cmd_weight_import(gateway, &file, json),
        WeightCommands::Export { output } => cmd_weight_export(gateway, output.as_deref()),
        WeightCommands::Template { output } => cmd_weight_template(gateway, output.as_deref()),
    }
}

fn run_settings(command: SettingsCommands, gateway: &dyn WeightGateway) -> Result<()> {
    match command {
        SettingsCommands::Show { json } => cmd_settings_show(gateway, json),
        SettingsCommands::Set {
            table,
            chart,
            visible,
            goal_weight,
            clear_goal,
            dark_mode,
            json,
        } => cmd_settings_set(
            gateway,
            &SettingsUpdate {
                table,
                chart,
                visible,
                goal_weight,
                clear_goal,
                dark_mode,
            },
            json,
        ),
        SettingsCommands::Reset { yes, json } => cmd_settings_reset(gateway, yes, json),
    }
}
