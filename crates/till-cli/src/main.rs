//! Operator CLI for the till: store maintenance, config inspection, and a
//! foreground engine runner for boxes without the daemon.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

const DEFAULT_DB_URL: &str = "sqlite://till-orders.db";

#[derive(Parser)]
#[command(name = "till")]
#[command(about = "TillSync CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site override)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run the sync engine in the foreground until ctrl-c
    Run {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    /// Connectivity + schema presence check
    Status,

    /// Apply SQL migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => db_status().await,
            DbCmd::Migrate => db_migrate().await,
        },
        Commands::ConfigHash { paths } => config_hash(&paths),
        Commands::Run { config_paths } => run_engine(&config_paths).await,
    }
}

fn db_url() -> String {
    std::env::var(till_db::ENV_DB_URL).unwrap_or_else(|_| DEFAULT_DB_URL.to_string())
}

async fn db_status() -> Result<()> {
    let pool = till_db::connect(&db_url()).await?;
    let st = till_db::status(&pool).await?;
    println!("ok: {}", st.ok);
    println!("has_orders_table: {}", st.has_orders_table);
    Ok(())
}

async fn db_migrate() -> Result<()> {
    let pool = till_db::connect(&db_url()).await?;
    till_db::migrate(&pool).await?;
    println!("migrations applied");
    Ok(())
}

fn config_hash(paths: &[String]) -> Result<()> {
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = till_config::load_layered_yaml(&path_refs).context("config load failed")?;
    println!("config_hash: {}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}

async fn run_engine(config_paths: &[String]) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let path_refs: Vec<&str> = config_paths.iter().map(String::as_str).collect();
    let loaded = till_config::load_layered_yaml(&path_refs).context("config load failed")?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let settings = till_config::SyncSettings::from_config(&loaded.config_json)?;
    let credentials = till_config::resolve_credentials(&loaded.config_json)?;

    let pool = till_db::connect(&db_url()).await?;
    till_db::migrate(&pool).await?;

    let engine = till_sync::SyncEngine::start(pool, settings, credentials).await?;

    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    engine.shutdown().await?;

    Ok(())
}
