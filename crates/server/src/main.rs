//! Shopwise Server
//!
//! Axum server exposing the shopping pipeline over a websocket message
//! channel, with run history and configuration under `/api/v1`.

mod api;
mod cli;
mod config;

use anyhow::Context;
use api::{chat, runs, AppState, SharedState};
use axum::{
    body::Body,
    http::{header, Response},
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::{Parser, Subcommand};
use config::PersistedConfig;
use shopwise_core::catalog::HttpCatalog;
use shopwise_core::state::{RunHistory, ShopDb};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

const DEFAULT_CATALOG_URL: &str = "http://127.0.0.1:9000";

#[derive(Parser, Clone)]
#[command(author, version, about = "Shopwise - conversational product search")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the Shopwise server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
        /// Product-search service base URL
        #[arg(long, env = "SHOPWISE_CATALOG_URL")]
        catalog_url: Option<String>,
    },
    /// Answer one query in the terminal (CLI mode, no server)
    Run {
        /// What you are shopping for
        query: String,
        /// Product-search service base URL
        #[arg(long, env = "SHOPWISE_CATALOG_URL")]
        catalog_url: Option<String>,
    },
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shopwise API",
        version = "1.0.0",
        description = "Run history and configuration for the Shopwise shopping pipeline. \
                       The conversation itself runs over the /ws/chat websocket."
    ),
    paths(
        runs::health,
        runs::list_runs,
        runs::get_run,
        runs::get_config,
        runs::update_config
    ),
    components(
        schemas(
            runs::HealthResponse,
            runs::RunSummary,
            runs::RunListResponse,
            runs::ErrorResponse,
            runs::ConfigResponse,
            PersistedConfig
        )
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "runs", description = "Finished shopping runs"),
        (name = "config", description = "Configuration management")
    )
)]
struct ApiDoc;

async fn serve_openapi() -> impl IntoResponse {
    let spec = ApiDoc::openapi().to_json().unwrap_or_default();
    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(spec))
        .unwrap_or_default()
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/health", get(runs::health))
        .route("/api/v1/runs", get(runs::list_runs))
        .route("/api/v1/runs/:id", get(runs::get_run))
        .route("/api/v1/config", get(runs::get_config).patch(runs::update_config))
        .route("/api/v1/openapi.json", get(serve_openapi))
        // Message channel
        .route("/ws/chat", get(chat::chat_websocket))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Build application state from persisted config and CLI overrides
async fn build_state(catalog_url: Option<String>) -> anyhow::Result<SharedState> {
    let persisted = PersistedConfig::load().await?;
    let catalog_url = catalog_url
        .or_else(|| persisted.catalog_url.clone())
        .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string());
    let catalog = HttpCatalog::new(&catalog_url).context("Failed to build catalog client")?;
    let db = ShopDb::open().context("Failed to open run history")?;

    tracing::info!(catalog = %catalog_url, "product search service configured");
    Ok(Arc::new(AppState::new(
        persisted,
        Arc::new(catalog),
        RunHistory::new(&db),
    )))
}

pub async fn run_server(host: IpAddr, port: u16, catalog_url: Option<String>) -> anyhow::Result<()> {
    let state = build_state(catalog_url).await?;
    let app = router(state);

    let addr = SocketAddr::new(host, port);
    tracing::info!("Shopwise server running at http://{}", addr);
    tracing::info!("  Chat:    ws://{}/ws/chat", addr);
    tracing::info!("  Runs:    /api/v1/runs");
    tracing::info!("  Config:  /api/v1/config (GET, PATCH)");
    tracing::info!("  OpenAPI: /api/v1/openapi.json");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // API keys and SHOPWISE_CATALOG_URL may live in .env or .shopwise/.env
    let _ = dotenvy::dotenv();
    let _ = dotenvy::from_path(".shopwise/.env");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopwise=info,shopwise_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    match args.command {
        Some(CliCommand::Run { query, catalog_url }) => {
            let state = build_state(catalog_url).await?;
            cli::run_in_terminal(state, query).await
        }
        Some(CliCommand::Serve {
            port,
            host,
            catalog_url,
        }) => run_server(host, port, catalog_url).await,
        None => run_server(IpAddr::from([127, 0, 0, 1]), 8080, None).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app_state(db: &ShopDb) -> AppState {
        AppState::new(
            PersistedConfig::default(),
            Arc::new(HttpCatalog::new(DEFAULT_CATALOG_URL).unwrap()),
            RunHistory::new(db),
        )
    }

    fn test_state() -> SharedState {
        let db = ShopDb::open_in_memory().unwrap();
        Arc::new(app_state(&db))
    }

    fn patch_top_k() -> Request<Body> {
        Request::patch("/api/v1/config")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"top_k":3}"#))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(test_state())
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_run_is_404() {
        let response = router(test_state())
            .oneshot(Request::get("/api/v1/runs/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_broken_history_is_500() {
        let db = ShopDb::open_in_memory().unwrap();
        let state = Arc::new(app_state(&db));
        db.connection().lock().unwrap().execute("DROP TABLE runs", []).unwrap();

        let response = router(state)
            .oneshot(Request::get("/api/v1/runs/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_config_update_saves_then_applies() {
        let dir = std::env::temp_dir().join(format!("shopwise-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        let db = ShopDb::open_in_memory().unwrap();
        let state = Arc::new(app_state(&db).with_config_path(&path));

        let response = router(state.clone()).oneshot(patch_top_k()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.config.read().await.top_k, Some(3));

        let saved = PersistedConfig::load_from(&path).await.unwrap();
        assert_eq!(saved.top_k, Some(3));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_failed_config_save_keeps_old_config() {
        // A regular file where the parent directory should be
        let blocker = std::env::temp_dir().join(format!("shopwise-{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, b"").unwrap();
        let db = ShopDb::open_in_memory().unwrap();
        let state = Arc::new(app_state(&db).with_config_path(blocker.join("config.json")));

        let response = router(state.clone()).oneshot(patch_top_k()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(state.config.read().await.top_k, None);
        std::fs::remove_file(&blocker).ok();
    }

    #[test]
    fn test_openapi_lists_routes() {
        let spec = ApiDoc::openapi().to_json().unwrap();
        assert!(spec.contains("/api/v1/runs"));
        assert!(spec.contains("/api/v1/config"));
    }
}
