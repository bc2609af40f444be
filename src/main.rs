use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use nameorigin::api::{self, auth::StaticTokenValidator, AppState};
use nameorigin::backends::{
    build_http_agent, nationalize::NationalizeProvider, restcountries::RestCountriesProvider,
    UpstreamLimiter,
};
use nameorigin::config::{self, Config};
use nameorigin::country_resolver::CountryResolver;
use nameorigin::metadata_store::MetadataStore;
use nameorigin::name_enrichment_engine::NameEnrichmentEngine;
use nameorigin::popularity::PopularityAggregator;

fn build_state(config: &Config, store: Arc<MetadataStore>) -> AppState {
    let http_client = build_http_agent(&config.upstream);
    let rate_limit_wait = Duration::from_millis(config.upstream.rate_limit_wait_ms);

    let predictions = NationalizeProvider::new(
        http_client.clone(),
        UpstreamLimiter::new(config.upstream.requests_per_minute, rate_limit_wait),
        &config.upstream.prediction_base_url,
    );
    let metadata = RestCountriesProvider::new(
        http_client,
        UpstreamLimiter::new(config.upstream.requests_per_minute, rate_limit_wait),
        &config.upstream.metadata_base_url,
    );

    let resolver = CountryResolver::new(Arc::clone(&store), Arc::new(metadata));
    let engine = NameEnrichmentEngine::new(Arc::clone(&store), Arc::new(predictions), resolver)
        .with_freshness_ttl(config.freshness_ttl());

    let tokens = StaticTokenValidator::new(config.auth.tokens.clone());
    if tokens.is_empty() {
        warn!("No API tokens configured; every authenticated request will be rejected");
    }

    AppState {
        engine: Arc::new(engine),
        popularity: Arc::new(PopularityAggregator::new(store)),
        tokens: Arc::new(tokens),
        popularity_limits: config.popularity.clone(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Trace);
    clog.init();
    log::set_max_level(log::LevelFilter::Info);

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_path = config::resolve_config_path(std::env::args().nth(1))?;
    let config = config::load_or_create(&config_path)?;
    // Builder filter stays at trace; the configured level is the global cap.
    log::set_max_level(config.log_level());

    info!("Using config {}", config_path.display());
    let database_path = config.database_path()?;
    let store = Arc::new(MetadataStore::open(&database_path)?);
    info!("Opened metadata store at {}", database_path.display());

    let state = Arc::new(build_state(&config, store));
    let router = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Service exiting");
    Ok(())
}
