//! # Auction extraction CLI (`subastas`)
//!
//! ## Usage
//!
//! ```bash
//! subastas --config ./config/subastas.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `subastas serve` | Start the HTTP server |
//! | `subastas extract --employee-id <ID>` | Run one extraction and print the envelope |
//! | `subastas completions <shell>` | Print shell completions |

use chrono::NaiveDateTime;
use clap::{CommandFactory, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;

use subastas::extraction::Extractor;
use subastas::models::{datetime, EmployeeId, ExtractionRequest};
use subastas::store::mssql::MssqlStore;
use subastas::{config, logging, server};

/// Auction extraction service for the EcoCircular inventory.
///
/// All commands except `completions` read a TOML configuration file given
/// by `--config`. See `config/subastas.example.toml`.
#[derive(Parser)]
#[command(
    name = "subastas",
    about = "Extract auction-eligible items from the EcoCircular store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/subastas.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves the extraction API.
    Serve,

    /// Run a single extraction and print the response envelope as JSON.
    ///
    /// Exits non-zero when the extraction fails. Items are moved to the
    /// "in auction" status exactly as through the HTTP endpoint.
    Extract {
        /// Employee recorded as the audit actor.
        #[arg(long)]
        employee_id: String,

        /// Only items entering phase 2 on or after this date (YYYY-MM-DD[THH:MM:SS]).
        #[arg(long, value_parser = datetime::parse)]
        date_from: Option<NaiveDateTime>,

        /// Only items entering phase 2 on or before this date.
        #[arg(long, value_parser = datetime::parse)]
        date_to: Option<NaiveDateTime>,

        #[arg(long)]
        organization_id: Option<i32>,

        #[arg(long)]
        item_status_id: Option<i32>,

        #[arg(long)]
        pc: Option<Decimal>,

        #[arg(long)]
        commission: Option<Decimal>,

        #[arg(long)]
        increment: Option<Decimal>,
    },

    /// Print shell completions to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "subastas", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Extract {
            employee_id,
            date_from,
            date_to,
            organization_id,
            item_status_id,
            pc,
            commission,
            increment,
        } => {
            let request = ExtractionRequest {
                date_from,
                date_to,
                organization_id,
                item_status_id,
                pc,
                commission,
                increment,
                ..ExtractionRequest::new(EmployeeId::new(employee_id)?)
            };

            let store = MssqlStore::from_config(&cfg.db)?;
            let extractor = Extractor::new(Arc::new(store));
            let envelope = extractor.extract(&request).await;

            println!("{}", serde_json::to_string_pretty(&envelope)?);
            if !envelope.success {
                std::process::exit(1);
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
