use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use nearby_places::config::{LoggingSettings, Settings};
use nearby_places::routes::{self, AppState};
use nearby_places::services::SystemClock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging(settings: &LoggingSettings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if settings.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_logging(&settings.logging);

    info!("Starting nearby places service...");
    info!(
        "Configuration loaded: {} Overpass mirrors, cache TTL {}s",
        settings.overpass.mirrors.len(),
        settings.cache.ttl_secs
    );

    let app_state = AppState::from_settings(&settings, Arc::new(SystemClock)).map_err(|e| {
        error!("Failed to initialize services: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    // Periodically drop rate limit buckets whose window has passed
    let rate_limiter = app_state.rate_limiter.clone();
    let purge_every = Duration::from_secs(settings.rate_limit.purge_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        loop {
            interval.tick().await;
            let purged = rate_limiter.purge_expired();
            if purged > 0 {
                tracing::debug!("Purged {} idle rate limit buckets", purged);
            }
        }
    });

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
