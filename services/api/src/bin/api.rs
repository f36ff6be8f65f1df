//! services/api/src/bin/api.rs

use ambassador_core::{AccrualEngine, SystemClock, ThresholdSource, ViewingLedger};
use api_lib::{
    adapters::{DbAdapter, HttpPointGateway, MemoryLedger, MemoryThresholds, ThresholdStore},
    config::Config,
    error::ApiError,
    web::{
        document_status_handler, get_thresholds_handler, health_handler, list_ledger_handler,
        require_admin, require_customer, reset_ledger_handler, rest::ApiDoc, state::AppState,
        update_thresholds_handler, ws_handler,
    },
};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use axum::{middleware as axum_middleware, routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let (ledger, threshold_source, threshold_store): (
        Arc<dyn ViewingLedger>,
        Arc<dyn ThresholdSource>,
        Arc<dyn ThresholdStore>,
    ) = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            let ledger: Arc<dyn ViewingLedger> = db_adapter.clone();
            let source: Arc<dyn ThresholdSource> = db_adapter.clone();
            let store: Arc<dyn ThresholdStore> = db_adapter;
            (ledger, source, store)
        }
        None => {
            warn!("DATABASE_URL is not set; viewing history is kept in memory only.");
            let thresholds = Arc::new(MemoryThresholds::new(config.default_thresholds));
            let ledger: Arc<dyn ViewingLedger> = Arc::new(MemoryLedger::new());
            let source: Arc<dyn ThresholdSource> = thresholds.clone();
            let store: Arc<dyn ThresholdStore> = thresholds;
            (ledger, source, store)
        }
    };

    // --- 3. Initialize the Point API Gateway ---
    let gateway = Arc::new(HttpPointGateway::new(
        &config.point_api_url,
        config.point_api_timeout,
    )?);
    info!("Submitting viewing points to {}", gateway.endpoint());

    // --- 4. Build the Shared AppState ---
    let engine = AccrualEngine::new(
        threshold_source,
        ledger,
        gateway,
        Arc::new(SystemClock),
        config.default_thresholds,
    );
    let app_state = Arc::new(AppState {
        engine,
        thresholds: threshold_store,
        config: config.clone(),
    });

    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("x-customer-id"),
            HeaderName::from_static("x-admin-token"),
        ]);

    // --- 5. Create the Web Router ---
    let public_routes = Router::new().route("/health", get(health_handler));

    // Customer routes (customer id required)
    let customer_routes = Router::new()
        .route("/viewer", get(ws_handler))
        .route("/documents/{document_id}/status", get(document_status_handler))
        .route("/ledger", get(list_ledger_handler).delete(reset_ledger_handler))
        .layer(axum_middleware::from_fn(require_customer));

    // Admin routes (admin token required)
    let admin_routes = Router::new()
        .route(
            "/admin/thresholds",
            get(get_thresholds_handler).put(update_thresholds_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_admin,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(customer_routes)
        .merge(admin_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
