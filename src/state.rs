use std::sync::Arc;

use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;

use crate::auth::machine::MachineOptions;
use crate::auth::navigation::RedirectPaths;
use crate::auth::registry::{AuthRegistry, StoreFactory};
use crate::config::Config;
use crate::error::Result;
use crate::ports::{ProfileBackend, SessionStore};
use crate::repositories::profile::PgProfileBackend;
use crate::session::bus::SessionBus;
use crate::session::redis_store::RedisSessions;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The Redis connection manager.
    pub redis: ConnectionManager,
    /// Session persistence and events.
    pub sessions: RedisSessions,
    /// Profile reads and writes.
    pub profiles: Arc<dyn ProfileBackend>,
    /// One auth machine per live browser session.
    pub registry: AuthRegistry,
    /// Redirect targets.
    pub paths: RedirectPaths,
    /// The application's configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");

        let sessions = RedisSessions::new(redis.clone(), SessionBus::new(), config.session_ttl_secs());
        let profiles: Arc<dyn ProfileBackend> = Arc::new(PgProfileBackend::new(db.clone()));

        let scoped = sessions.clone();
        let stores: StoreFactory =
            Arc::new(move |session_id| Arc::new(scoped.scoped(session_id)) as Arc<dyn SessionStore>);
        let registry = AuthRegistry::new(
            stores,
            Arc::clone(&profiles),
            MachineOptions {
                profile_fetch_timeout: config.profile_fetch_timeout,
            },
        );
        tracing::info!("✅ Auth registry initialized");

        Ok(AppState {
            db,
            redis,
            sessions,
            profiles,
            registry,
            paths: RedirectPaths {
                sign_in: config.sign_in_path.clone(),
                landing: config.landing_path.clone(),
            },
            config: config.clone(),
        })
    }
}
