use actix_web::{web, App, HttpServer};
use log::{error, info, warn};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

use ledgerbus::blockchain::{client_for, BlockFetcher, ChainSyncer, SingleFlight};
use ledgerbus::database::{init_db, CurrencyStore, CursorStore, PgStore, Stores};
use ledgerbus::metrics::metrics;
use ledgerbus::rest::{get_chain, get_deposits, sync_chain};
use ledgerbus::{AppState, Config};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Pick up a local .env before reading configuration
    dotenvy::dotenv().ok();
    env_logger::init();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await?;
    init_db(&pool).await?;
    info!("Connected to database");

    let store = PgStore::new(pool);
    let stores = Stores::shared(Arc::new(store.clone()));
    let state = AppState::new(store.clone());
    let flights = SingleFlight::new();

    // One scheduled syncer per active chain; chains never share state beyond their own rows
    for chain in store.active_chains().await? {
        let (client, builder) = match client_for(&chain, config.rpc_timeout) {
            Ok(pair) => pair,
            Err(e) => {
                error!("Not scanning {}: {}", chain.key, e);
                continue;
            }
        };
        let currencies = store.currencies_for(&chain.key).await?;
        if currencies.is_empty() {
            warn!("Blockchain {} has no currencies configured; only the cursor will move", chain.key);
        }

        let syncer = Arc::new(ChainSyncer::new(
            &chain.key,
            BlockFetcher::new(client, config.rpc_retry),
            builder,
            stores.clone(),
            currencies,
            flights.clone(),
        ));
        state.register(syncer.clone());
        tokio::spawn(syncer.run(config.blocks_limit, config.scan_interval));
        info!("Scheduled {} ({}) every {:?}", chain.key, chain.name, config.scan_interval);
    }

    info!("Serving HTTP on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .route("/metrics", web::get().to(metrics))
            .service(get_chain)
            .service(get_deposits)
            .service(sync_chain)
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    Ok(())
}
