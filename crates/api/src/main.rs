use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use metget_bus::MessageBus;
use metget_catalog::CatalogStore;
use metget_credit::CreditLedger;
use metget_storage::BlobStore;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod config;
mod db;
mod errors;
mod routes;
mod state;

use config::AppConfig;
use state::AppState;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// Request API (C6) — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "MetGet Request API",
        version = "0.1.0",
        description = "Authenticates, validates, and debits build requests against \
            the meteorological catalog, publishes accepted requests onto the build \
            queue, and reports catalog coverage and request status.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Status", description = "Catalog coverage snapshot"),
        (name = "Build", description = "Submit a build request"),
        (name = "Check", description = "Poll a build request's status"),
    ),
    paths(
        routes::health::health_check,
        routes::status::get_status,
        routes::build::build,
        routes::check::check,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::status::FamilyStatus,
            routes::status::StatusResponse,
            routes::build::BuildResponse,
            routes::check::CheckRequest,
            routes::check::RequestSnapshot,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metget_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.common.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run database migrations");

    tracing::info!("database migrations completed");

    let catalog = CatalogStore::new(pool.clone());
    let credit = CreditLedger::new(pool.clone());
    let blobs = BlobStore::new(&config.common.s3_bucket, &config.common.s3_endpoint)
        .expect("failed to build object store client");
    let bus = MessageBus::connect(
        &config.common.amqp_url,
        &config.amqp_exchange,
        &config.amqp_queue,
    )
    .await
    .expect("failed to connect to message bus");

    let state = AppState {
        pool,
        catalog,
        credit,
        bus: Arc::new(bus),
        blobs,
        enforce_credit_limits: config.common.enforce_credit_limits,
        presign_ttl: Duration::from_secs(config.presign_ttl_secs),
    };

    // Read-only status/check endpoints allow any origin; /build is the only
    // mutating route and relies on `x-api-key` rather than cookies, so it is
    // not CSRF-sensitive in the way a browser session would be.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/status", get(routes::status::get_status))
        .route("/build", post(routes::build::build))
        .route("/check", post(routes::check::check))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind TCP listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server terminated unexpectedly");
}
