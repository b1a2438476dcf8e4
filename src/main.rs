use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

use airdrop_ledger::{
    api::{create_router, AppState, SecurityMiddlewareConfig, SecurityState},
    campaign::CampaignEngine,
    catalog::Catalog,
    config::CampaignConfig,
    database::DatabasePool,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = CampaignConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check the AIRDROP_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting airdrop reward ledger");

    let catalog = Arc::new(load_catalog(&config)?);
    info!(
        tasks = catalog.tasks().len(),
        achievements = catalog.achievements().len(),
        token = %catalog.token_symbol(),
        "Catalog loaded"
    );

    let mut engine = CampaignEngine::new(catalog, config.sybil.to_limits());

    let db = if config.database.postgres_enabled {
        let db = DatabasePool::new(&config.database.postgres_url)
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to connect to PostgreSQL")?;
        db.init_schema()
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to initialize database schema")?;
        let db = Arc::new(db);
        engine = engine.with_database(db.clone());
        Some(db)
    } else {
        warn!("PostgreSQL disabled, campaign state lives in memory only");
        None
    };

    let engine = Arc::new(engine);
    let users = engine
        .hydrate()
        .await
        .context("Failed to load campaign state")?;
    if db.is_some() {
        info!(users, "Campaign state restored");
    }

    let security_state = SecurityState::new(SecurityMiddlewareConfig::from_config(&config));
    spawn_rate_limit_cleanup(security_state.clone());

    let mut state = AppState::new(engine, config.admin.clone(), security_state);
    if let Some(db) = db {
        state = state.with_database(db);
    }

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("Airdrop ledger listening on {}", bind_addr);
    info!(
        "Request limits: Rate limit={}/min, Max body={}KB, Origin cap={} wallets/{}h",
        config.security.rate_limit_per_minute,
        config.security.max_request_size / 1024,
        config.sybil.max_wallets_per_origin,
        config.sybil.ban_hours
    );

    // Serve with connect info for client origin extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_logging(config: &CampaignConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt().with_max_level(log_level).finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if config.logging.sanitize_logs {
        info!("Logging initialized with request sanitization enabled");
    }

    Ok(())
}

fn load_catalog(config: &CampaignConfig) -> Result<Catalog> {
    match &config.catalog.path {
        Some(path) => Catalog::from_json_file(path)
            .with_context(|| format!("Failed to load catalog from {}", path.display())),
        None => Ok(Catalog::builtin()),
    }
}

fn spawn_rate_limit_cleanup(security: SecurityState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            security.rate_limiter.cleanup();
        }
    });
}
