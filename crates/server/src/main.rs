mod error;
mod routes;
mod storage;

use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use teamdock_api::oauth::{self, OAuthProviderConfig};
use storage::Db;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    /// Outbound HTTP client for the OAuth provider, constructed once and
    /// injected — never reached for as ambient state.
    pub http: reqwest::Client,
}

/// Server configuration loaded from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub base_url: String,
    /// Local development: session cookies are issued without `Secure`.
    pub dev_mode: bool,
    pub discord: Option<OAuthProviderConfig>,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

/// Load the Discord OAuth provider from environment variables.
fn try_load_discord() -> Option<OAuthProviderConfig> {
    let id = std::env::var("DISCORD_CLIENT_ID")
        .ok()
        .filter(|s| !s.is_empty())?;
    let secret = std::env::var("DISCORD_CLIENT_SECRET")
        .ok()
        .filter(|s| !s.is_empty())?;
    tracing::info!("OAuth provider enabled: Discord");
    Some(oauth::discord_preset(id, secret))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "teamdock_server=info,tower_http=info".into()),
        )
        .init();

    // Data directory
    let data_dir = std::env::var("TEAMDOCK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"));

    tracing::info!("data directory: {}", data_dir.display());

    // Initialize database
    let db = storage::init_db(&data_dir)?;
    tracing::info!("database initialized");

    let base_url = std::env::var("TEAMDOCK_BASE_URL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "http://localhost:3000".into());

    let dev_mode = std::env::var("TEAMDOCK_ENV")
        .map(|e| e != "production")
        .unwrap_or(true);

    let discord = try_load_discord();
    if discord.is_none() {
        tracing::warn!("DISCORD_CLIENT_ID/SECRET not set — Discord login disabled");
    }

    let config = AppConfig {
        base_url: base_url.clone(),
        dev_mode,
        discord,
    };

    let state = AppState {
        db,
        config,
        http: reqwest::Client::new(),
    };

    // Build API routes
    let api = Router::new()
        // Health
        .route("/health", get(routes::health::health))
        // Auth (secret-code fallback + session)
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/me", get(routes::auth::me))
        // Teams
        .route("/teams", post(routes::teams::create_team))
        .route("/teams", get(routes::teams::list_teams))
        .route("/teams/{id}", get(routes::teams::get_team))
        .route("/teams/{id}/join", post(routes::teams::join_team))
        .route("/teams/{id}/leave", post(routes::teams::leave_team))
        // Presence
        .route("/presence/heartbeat", post(routes::presence::heartbeat))
        .route("/presence/active", get(routes::presence::active));

    // Build main router
    let mut app = Router::new()
        .nest("/api", api)
        // Discord OAuth (browser-facing, outside /api)
        .route("/auth/discord", get(routes::discord::discord_login))
        .route(
            "/auth/discord/callback",
            get(routes::discord::discord_callback),
        );

    // Serve static files from web build if present
    let web_dir = std::env::var("TEAMDOCK_WEB_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("web/build"));
    if web_dir.exists() {
        tracing::info!("serving static files from {}", web_dir.display());
        let index_html = web_dir.join("index.html");
        app = app.fallback_service(ServeDir::new(&web_dir).fallback(ServeFile::new(index_html)));
    }

    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(CookieManagerLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    tracing::info!("starting server at {base_url}");

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
