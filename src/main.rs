use std::{sync::Arc, time::Duration};

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use dotenv::dotenv;
use mechnest::{
    config::Config,
    db::{DBClient, DataStore, MemoryStore},
    routes::create_router,
    AppState,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    dotenv().ok();

    let config = Config::init();

    let db_client: Arc<dyn DataStore> = if config.uses_memory_store() {
        tracing::warn!("Using the in-memory store, data is lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        let pool = match PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(config.db_query_timeout_secs))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                tracing::info!("Connection to the database is successful");
                pool
            }
            Err(err) => {
                tracing::error!("Failed to connect to the database: {:?}", err);
                std::process::exit(1);
            }
        };

        let db_client = DBClient::new(pool)
            .with_query_timeout(Duration::from_secs(config.db_query_timeout_secs));

        if let Err(err) = db_client.run_migrations().await {
            tracing::error!("Failed to run migrations: {}", err);
            std::process::exit(1);
        }
        Arc::new(db_client)
    };

    let allowed_origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let app_state = match AppState::new(db_client, config.clone()) {
        Ok(state) => Arc::new(state),
        Err(err) => {
            tracing::error!("Failed to build HTTP clients: {}", err);
            std::process::exit(1);
        }
    };

    let app = create_router(app_state).layer(cors);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    tracing::info!("Server is running on http://localhost:{}", config.port);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", err);
    }
}
