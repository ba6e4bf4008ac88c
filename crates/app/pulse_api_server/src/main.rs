//! Pulse authentication API server binary.
//!
//! Configuration comes from the environment (see `ApiConfig::from_env`);
//! command-line flags override the listen port and backing services.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pulse_api::config::ApiConfig;
use pulse_core::auth::queries::PgPrincipalRepository;
use pulse_core::auth::repository::{MemoryPrincipalRepository, PrincipalRepository};
use pulse_core::auth::session::{DisabledSessionStore, MemorySessionStore, SessionStore};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "pulse_api_server", about = "Pulse authentication API server")]
struct Args {
    /// Port to listen on on 127.0.0.1; overrides `BIND_ADDR` (0 = ephemeral).
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL. Without one, principals are kept in memory.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Redis URL for the auth session store.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Keep auth sessions in process memory when no Redis URL is given.
    #[arg(long, default_value_t = false)]
    memory_sessions: bool,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,pulse_api=debug,pulse_core=debug")
            }),
        )
        .init();

    let args = Args::parse();
    let mut config = ApiConfig::from_env()?;
    if let Some(port) = args.port {
        config.bind_addr = format!("127.0.0.1:{port}");
    }
    config.database_url = args.database_url.or(config.database_url);
    config.redis_url = args.redis_url.or(config.redis_url);

    info!(
        bind_addr = %config.bind_addr,
        sso_enabled = config.sso.is_some(),
        "starting pulse_api_server"
    );

    let users: Arc<dyn PrincipalRepository> = match &config.database_url {
        Some(url) => {
            info!(max_connections = args.max_connections, "configuring connection pool");
            let pool = PgPoolOptions::new()
                .max_connections(args.max_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(url)
                .await?;

            info!("running database migrations");
            pulse_core::migrate::migrate(&pool).await?;
            Arc::new(PgPrincipalRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, principals are kept in memory");
            Arc::new(MemoryPrincipalRepository::new())
        }
    };

    let sessions: Arc<dyn SessionStore> = match &config.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            info!("connecting session store");
            Arc::new(pulse_core::auth::session::RedisSessionStore::connect(url).await?)
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            warn!("REDIS_URL set but redis support is not compiled in, session store disabled");
            Arc::new(DisabledSessionStore)
        }
        None if args.memory_sessions => {
            info!("using in-memory session store");
            let store = Arc::new(MemorySessionStore::new());
            let _purge = store.spawn_purge_task(Duration::from_secs(60));
            store
        }
        None => {
            info!("REDIS_URL not set, session store disabled");
            Arc::new(DisabledSessionStore)
        }
    };

    let bind_addr = config.bind_addr.clone();
    let state = pulse_api::AppState::new(config, users, sessions)?;
    let app = pulse_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
