use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;

// AppState holds the database connection pool and the startup configuration
// (including the JWT signing secret).
pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub config: config::Config,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging().expect("Failed to initialize logging");

    let config = config::Config::from_env()
        .expect("Missing required environment variables (DATABASE_URL, JWT_SECRET)");

    // Upload directory is provisioned even though attachments are not served
    if let Err(e) = std::fs::create_dir_all(&config.upload_dir) {
        tracing::warn!("Failed to create upload directory: {}", e);
    } else {
        tracing::info!("Upload directory ready");
    }

    // Create the database connection pool and run migrations
    let db_pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool.");

    let bind_addr = config.bind_addr.clone();
    let shared_state = Arc::new(AppState { db_pool, config });

    // Build our application with all routes and shared state
    let app = Router::new()
        .merge(handlers::auth::auth_routes())
        .merge(handlers::users::user_routes())
        .merge(handlers::chat::chat_routes())
        .route("/", axum::routing::get(root))
        .route("/api/status", axum::routing::get(api_status))
        .layer(axum::middleware::from_fn(
            middleware::logging::request_logging_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind listen address");
    tracing::info!("listening on {}", listener.local_addr().expect("listener address"));
    axum::serve(listener, app).await.expect("server error");
}

async fn root() -> axum::response::Json<serde_json::Value> {
    axum::response::Json(serde_json::json!({
        "message": "Welcome to the Student-Teacher API"
    }))
}

// Health check endpoint
async fn api_status(
    Extension(state): Extension<Arc<AppState>>,
) -> axum::response::Json<serde_json::Value> {
    let db_status = match sqlx::query("SELECT 1").fetch_one(&state.db_pool).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    axum::response::Json(serde_json::json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": db_status
        }
    }))
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,student_teacher_api=trace,sqlx=info,hyper=info,tower=info".to_string()
        } else {
            "info,sqlx=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    // JSON logging for production log aggregation, human-readable otherwise
    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Student-Teacher API starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        }
    );

    Ok(())
}
