use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tablemap_core::{Catalog, SqliteRowStore};
use tablemap_sync::synchronizer::{apply_discovery, create_mirrors, discover};
use tablemap_sync::{
    DestinationStore, MySqlSource, MySqlSourceFactory, PostgresDestination, Scheduler, SyncConfig, Synchronizer,
    UpstreamSource,
};
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[clap(author, version, about = "tablemap upstream synchronization service")]
struct Args {
    /// Config file path
    #[clap(short, long, env = "TABLEMAP_CONFIG")]
    config: Option<String>,

    /// Catalog snapshot file
    #[clap(long, env = "TABLEMAP_CATALOG")]
    catalog: Option<PathBuf>,

    /// SQLite row store file
    #[clap(long, env = "TABLEMAP_ROWS")]
    rows: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync every active connection on its schedule until interrupted
    Run,

    /// Sync every active connection once and exit
    Once,

    /// Read the tables and columns of a connection and register its selected tables
    Introspect {
        /// Connection id
        connection: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration
    let mut config = SyncConfig::load(args.config.as_deref())?;

    // Override config with command-line arguments
    if let Some(catalog) = args.catalog {
        config.catalog_path = catalog;
    }
    if let Some(rows) = args.rows {
        config.row_store_path = rows;
    }

    let destination: Option<Arc<dyn DestinationStore>> = match &config.destination {
        Some(settings) => {
            info!("Destination: {}:{}/{}", settings.host, settings.port, settings.dbname);
            Some(Arc::new(PostgresDestination::new(settings)?))
        }
        None => {
            warn!("No destination configured, tables are not mirrored");
            None
        }
    };

    match args.command {
        Command::Run => run(config, destination, true).await,
        Command::Once => run(config, destination, false).await,
        Command::Introspect { connection } => introspect(config, destination, connection).await,
    }
}

async fn run(config: SyncConfig, destination: Option<Arc<dyn DestinationStore>>, forever: bool) -> Result<()> {
    let catalog = Catalog::load(&config.catalog_path, config.core.clone())?;
    info!(
        "Loaded catalog {} with {} connections",
        config.catalog_path.display(),
        catalog.connections().len()
    );
    let catalog = Arc::new(RwLock::new(catalog));

    let store = Arc::new(SqliteRowStore::open(&config.row_store_path)?);
    let synchronizer = Synchronizer::new(
        store,
        destination,
        config.fetch_timeout(),
        config.destination_timeout(),
    );
    let scheduler = Arc::new(Scheduler::new(
        catalog.clone(),
        Arc::new(synchronizer),
        Arc::new(MySqlSourceFactory),
        config.scheduler_tick(),
    ));

    if !forever {
        for report in scheduler.sync_all().await {
            info!("{}", serde_json::to_string(&report)?);
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reloader = tokio::spawn(reload_catalog(config.clone(), catalog, shutdown_rx.clone()));
    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    shutdown_tx.send(true)?;

    runner.await?;
    reloader.await?;
    info!("Synchronization stopped");
    Ok(())
}

async fn reload_catalog(config: SyncConfig, catalog: Arc<RwLock<Catalog>>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(config.catalog_reload());
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        match Catalog::load(&config.catalog_path, config.core.clone()) {
            Ok(fresh) => *catalog.write().await = fresh,
            Err(e) => error!("Catalog reload failed, keeping the previous one: {}", e),
        }
    }
}

async fn introspect(config: SyncConfig, destination: Option<Arc<dyn DestinationStore>>, id: Uuid) -> Result<()> {
    let mut catalog = Catalog::load(&config.catalog_path, config.core.clone())?;
    let connection = catalog
        .connection(id)
        .cloned()
        .ok_or_else(|| anyhow!("Connection not found: {}", id))?;

    let source = MySqlSource::new(&connection);
    let discovered = discover(&source, config.fetch_timeout()).await;
    if let Err(e) = source.close().await {
        warn!("Closing {} failed: {}", connection.label(), e);
    }
    let infos = discovered?;
    info!("Discovered {} tables on {}", infos.len(), connection.label());

    let updated = apply_discovery(&mut catalog, &connection, infos)?;
    catalog.save(&config.catalog_path)?;

    if let Some(destination) = destination {
        let tables: Vec<_> = updated
            .iter()
            .filter_map(|id| catalog.table(*id).ok().cloned())
            .collect();
        create_mirrors(destination.as_ref(), &tables, config.destination_timeout()).await?;
        info!("Created {} mirror tables", tables.len());
    }

    Ok(())
}
