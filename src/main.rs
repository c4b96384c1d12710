pub mod config;
pub mod coupons;
pub mod db;
pub mod error;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::AppConfig;
use coupons::{
    CouponService, DecisionMetrics, PgCouponRepository, PgOrderLedger, PgUserDirectory,
    RandomCodeGenerator,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        coupons::handlers::create_coupon_handler,
        coupons::handlers::list_coupons_handler,
        coupons::handlers::redeem_coupon_handler,
        coupons::handlers::coupon_metrics_handler,
    ),
    components(
        schemas(
            coupons::Coupon,
            coupons::CreateCouponRequest,
            coupons::RedeemCouponRequest,
            coupons::RedeemResponse,
            coupons::OrderContent,
            coupons::ProfileInfo,
            coupons::OrderHistory,
            coupons::MetricsSummary,
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "coupons", description = "Coupon creation and redemption endpoints")
    ),
    info(
        title = "Coupon API",
        version = "1.0.0",
        description = "Coupon validation and redemption decisions"
    )
)]
struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coupon_service: CouponService,
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS and tracing middleware
pub fn create_router(state: AppState) -> Router {
    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // API routes
        .route(
            "/api/coupons",
            post(coupons::create_coupon_handler).get(coupons::list_coupons_handler),
        )
        .route("/api/coupons/metrics", get(coupons::coupon_metrics_handler))
        .route("/api/redeem", post(coupons::redeem_coupon_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // RUST_LOG controls verbosity, info by default
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Coupon API - Starting...");

    let config = AppConfig::from_env().expect("Invalid configuration");

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("Failed to create database pool");

    // Run SQLx migrations on startup
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations completed successfully");

    tracing::info!("Active rules: {}", coupons::rules::describe());
    tracing::info!(
        "Lookup timeout {}ms, {} redemption attempts",
        config.lookup_timeout.as_millis(),
        config.redeem_max_attempts
    );

    let coupon_service = CouponService::new(
        Arc::new(PgCouponRepository::new(db_pool.clone())),
        Arc::new(PgUserDirectory::new(db_pool.clone())),
        Arc::new(PgOrderLedger::new(db_pool)),
        Arc::new(RandomCodeGenerator::new()),
        config.engine_settings(),
        DecisionMetrics::new(),
    );

    let app = create_router(AppState { coupon_service });

    // Start the Axum server
    let addr = config.bind_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Coupon API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app).await.expect("Server error");
}
