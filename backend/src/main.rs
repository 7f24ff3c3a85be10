//! Reservoir Advisor - recommendation server

use reservoir_advisor_backend::{
    clock::SystemClock,
    config::Config,
    create_app,
    external::{EnrichmentBackend, HttpForecastClient, OllamaClient},
    services::{
        spawn_monitor, spawn_sweeper, EngineDeps, EngineSettings, PgThresholdStore,
        RecommendationOrchestrator,
    },
    AppState,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "advisor_server=debug,reservoir_advisor_backend=debug,tower_http=debug,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Reservoir Advisor");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let forecasts = HttpForecastClient::new(
        config.forecast.base_url.clone(),
        Duration::from_secs(config.forecast.timeout_secs),
    )?;
    let backend: Arc<dyn EnrichmentBackend> = Arc::new(OllamaClient::new(&config.enrichment)?);

    let engine = Arc::new(RecommendationOrchestrator::start(
        EngineDeps {
            forecasts: Arc::new(forecasts),
            thresholds: Arc::new(PgThresholdStore::new(
                db_pool.clone(),
                config.risk.thresholds(),
            )),
            backend: Arc::clone(&backend),
            clock: Arc::new(SystemClock),
        },
        EngineSettings::from_config(&config),
    ));

    // Background tasks
    spawn_sweeper(
        Arc::clone(engine.cache()),
        Duration::from_secs(config.cache.sweep_interval_secs),
    );
    if config.enrichment.enabled {
        tracing::info!(
            url = %config.enrichment.url,
            model = %config.enrichment.model,
            "Enrichment enabled"
        );
        spawn_monitor(
            backend,
            Arc::clone(engine.health()),
            Duration::from_secs(config.enrichment.health_interval_secs),
        );
    } else {
        tracing::info!("Enrichment disabled, serving template recommendations");
    }

    // Create application state
    let state = AppState {
        db: db_pool,
        config: Arc::new(config.clone()),
        engine,
    };

    let app = create_app(state);

    // Start server
    let addr = config.server.addr();
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
