mod check;
mod entity;
mod error;
mod ledger;
mod logging;
mod master;
mod production;
mod purchasing;
mod sales;
mod seed;
mod server;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sea_orm::{ConnectOptions, Database};
use tracing::{error, info};

use crate::ledger::BalanceFilter;

/// Inventory ledger for paper-plate manufacturing
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: SubCommandArgs,
    #[clap(short = 'u', long, env = "DATABASE_URL")]
    db_url: String,
    #[clap(short = 'c', long, default_value = "4")]
    max_connections: u32,
    #[clap(long)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum SubCommandArgs {
    /// Create the tables
    Setup {
        #[clap(long)]
        reset: bool,
    },
    /// Load the demo data set
    Seed {
        #[clap(long, default_value = "MAIN")]
        warehouse: String,
        #[clap(long)]
        strict: bool,
    },
    /// Print on-hand balances
    Stock {
        #[clap(long)]
        product: Option<String>,
        #[clap(long)]
        warehouse: Option<String>,
    },
    /// Audit the ledger against its documents
    Check,
    /// Serve the HTTP API
    Serve {
        #[clap(long, default_value = "0.0.0.0:3000")]
        bind: SocketAddr,
        #[clap(long, env = "PAPERMATE_ENV", default_value = "local")]
        env: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.log_json);

    let mut options = ConnectOptions::new(args.db_url.clone());
    options
        .max_connections(args.max_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .context("Failed to connect to database")?;

    let mut clean = true;
    let result = match &args.command {
        SubCommandArgs::Setup { reset } => entity::schema_setup(&db, *reset)
            .await
            .context("Failed to set up schema"),
        SubCommandArgs::Seed { .. } => seed::execute(&db, &args)
            .await
            .map(|report| info!(?report, "seed finished")),
        SubCommandArgs::Stock { product, warehouse } => {
            let filter = BalanceFilter {
                product_code: product.clone(),
                warehouse: warehouse.clone(),
            };
            ledger::balances(&db, &filter)
                .await
                .context("Failed to read balances")
                .map(|balances| {
                    println!("{:<16} {:<10} {:>10} UOM", "CODE", "WAREHOUSE", "ON HAND");
                    for b in balances {
                        println!("{:<16} {:<10} {:>10} {}", b.code, b.warehouse, b.on_hand, b.uom);
                    }
                })
        }
        SubCommandArgs::Check => check::audit(&db)
            .await
            .context("Failed to audit ledger")
            .map(|violations| {
                for v in &violations {
                    println!("{v}");
                }
                if violations.is_empty() {
                    info!("ledger is consistent");
                } else {
                    error!(count = violations.len(), "ledger violations found");
                    clean = false;
                }
            }),
        SubCommandArgs::Serve { .. } => server::execute(&db, &args).await,
    };

    if let Err(err) = &result {
        logging::failure(err);
    }
    db.close().await.context("Failed to close database")?;
    if result.is_err() || !clean {
        std::process::exit(1);
    }
    Ok(())
}
