use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    accounts::MemoryAuthenticator,
    auth::{require_admin, require_session},
    handlers::{
        create_secret, delete_secret, get_secret, health, login, logout, me, put_secret, register,
        sweep,
    },
    store::{spawn_sweep, Clock, MemoryStore, RedbStore, SecretStore, SystemClock},
    AppState, Limits,
};

/// Where secrets are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Process memory; lost on restart.
    Memory,
    /// Embedded redb file in the data directory.
    Redb,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redb" => Ok(Self::Redb),
            other => anyhow::bail!("unknown backend {other:?} (expected memory or redb)"),
        }
    }
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub data_dir: Option<PathBuf>,
    pub sweep_interval: Duration,
    pub cors_origins: Option<String>,
    /// Bearer key for `POST /sweep` ($BURNLINK_ADMIN_KEY).
    pub admin_key: Option<String>,
    /// Set `BURNLINK_REQUIRE_LOGIN=true` to require an account session for uploads.
    pub require_login: bool,
    pub limits: Limits,
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for ServerConfig {
    fn default() -> Self {
        let defaults = Limits::default();
        Self {
            host: std::env::var("BURNLINK_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("BURNLINK_PORT").unwrap_or(8080),
            backend: env_parse("BURNLINK_BACKEND").unwrap_or(Backend::Memory),
            data_dir: std::env::var("BURNLINK_DATA_DIR").ok().map(PathBuf::from),
            sweep_interval: Duration::from_secs(
                env_parse("BURNLINK_SWEEP_INTERVAL_SECS").unwrap_or(60),
            ),
            cors_origins: std::env::var("BURNLINK_CORS_ORIGINS").ok(),
            admin_key: std::env::var("BURNLINK_ADMIN_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            require_login: std::env::var("BURNLINK_REQUIRE_LOGIN")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            limits: Limits {
                max_ciphertext_bytes: env_parse("BURNLINK_MAX_CIPHERTEXT_BYTES")
                    .unwrap_or(defaults.max_ciphertext_bytes),
                max_ttl_seconds: env_parse("BURNLINK_MAX_TTL_SECS")
                    .unwrap_or(defaults.max_ttl_seconds),
            },
        }
    }
}

fn open_store(cfg: &ServerConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn SecretStore>> {
    match cfg.backend {
        Backend::Memory => {
            info!("using in-memory store; secrets do not survive restart");
            Ok(Arc::new(MemoryStore::with_clock(clock)))
        }
        Backend::Redb => {
            let data_dir = crate::dirs::data_dir(cfg.data_dir.as_ref())?;
            let db_path = data_dir.join("burnlink.db");
            info!(path = %db_path.display(), "using redb store");
            let store = RedbStore::open_with_clock(&db_path, clock).context("open store")?;
            Ok(Arc::new(store))
        }
    }
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&cfg, clock.clone())?;

    spawn_sweep(store.clone(), cfg.sweep_interval);

    if cfg.require_login {
        info!("uploads require an account session");
    }

    let state = AppState {
        store,
        accounts: Arc::new(MemoryAuthenticator::new()),
        clock,
        admin_key: cfg.admin_key,
        require_login: cfg.require_login,
        limits: cfg.limits,
    };

    let app = build_router(state, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    let listener = TcpListener::bind(addr).await.context("bind listener")?;
    info!(%addr, "burnlink server listening");

    serve(listener, app, async {
        // A failed signal registration just means no graceful shutdown.
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("server error")
}

pub fn build_router(state: AppState, cors_origins: Option<&str>) -> Router {
    // Public routes. Retrieval and destruction need only the id.
    let public = Router::new()
        .route("/health", get(health))
        .route("/secrets/{id}", get(get_secret))
        .route("/secrets/{id}", delete(delete_secret))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout));

    // Uploads (session required when `require_login` is set).
    let uploads = Router::new()
        .route("/secrets", post(create_secret))
        .route("/secrets/{id}", put(put_secret))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    // Operator routes.
    let admin = Router::new()
        .route("/sweep", post(sweep))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(public)
        .merge(uploads)
        .merge(admin)
        .with_state(state)
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::PUT,
            http::Method::POST,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
