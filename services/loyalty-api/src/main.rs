use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use loyalty_api::{
    config::Config,
    handlers::{self, AppState},
    metrics, open_ledger, telemetry,
};
use prometheus::Registry;
use std::sync::Arc;
use tracing::{info, warn};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    telemetry::init_tracing(&config.log).context("Failed to open activity log")?;

    info!("Starting Loyalty API on {}:{}", config.server.host, config.server.port);

    let ledger = Arc::new(open_ledger(&config).await.context("Failed to open ledger")?);

    let registry = Registry::new();
    metrics::register_metrics(&registry).context("Failed to register metrics")?;

    let state = AppState {
        ledger: ledger.clone(),
        registry,
    };

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(web::Data::new(state.clone()))
            .configure(handlers::configure_routes)
    })
    .workers(config.server.workers)
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    match Arc::try_unwrap(ledger) {
        Ok(ledger) => ledger.shutdown().await?,
        Err(_) => warn!("Ledger still shared at exit, skipping actor shutdown"),
    }

    info!("Loyalty API stopped");
    Ok(())
}
