//! Connection pool setup and schema migration.

use crate::{config::AppConfig, errors::ServiceError, migrator::Migrator};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Each connection to `sqlite::memory:` opens its own empty database.
fn is_in_memory_sqlite(url: &str) -> bool {
    url.starts_with("sqlite::memory:") || url.contains("mode=memory")
}

/// Pool options derived from the service configuration.
pub fn connect_options(cfg: &AppConfig) -> ConnectOptions {
    let (max, min) = if is_in_memory_sqlite(&cfg.database_url) {
        (1, 1)
    } else {
        (cfg.db_max_connections, cfg.db_min_connections.min(cfg.db_max_connections))
    };

    let mut opts = ConnectOptions::new(cfg.database_url.clone());
    opts.max_connections(max)
        .min_connections(min)
        .connect_timeout(Duration::from_secs(cfg.db_connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(cfg.db_acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(cfg.db_idle_timeout_secs))
        .sqlx_logging(true);
    opts
}

/// Opens the connection pool.
pub async fn connect(cfg: &AppConfig) -> Result<DatabaseConnection, ServiceError> {
    let opts = connect_options(cfg);
    info!(
        max_connections = ?opts.get_max_connections(),
        "connecting to database"
    );
    Database::connect(opts).await.map_err(|e| {
        error!(error = %e, "database connection failed");
        ServiceError::DatabaseError(e)
    })
}

/// Applies pending migrations; already-applied ones are skipped.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), ServiceError> {
    let started = Instant::now();
    match Migrator::up(db, None).await {
        Ok(()) => {
            info!(elapsed = ?started.elapsed(), "database migrations applied");
            Ok(())
        }
        Err(e) => {
            error!(elapsed = ?started.elapsed(), error = %e, "database migrations failed");
            Err(ServiceError::DatabaseError(e))
        }
    }
}

pub async fn ping(db: &DatabaseConnection) -> Result<(), ServiceError> {
    db.ping().await.map_err(ServiceError::DatabaseError)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> AppConfig {
        AppConfig::new(url.into(), "127.0.0.1".into(), 8080, "test".into())
    }

    #[tokio::test]
    async fn connects_and_migrates_in_memory_sqlite() {
        let db = connect(&config("sqlite::memory:")).await.expect("connect");
        ping(&db).await.expect("ping");
        migrate(&db).await.expect("first run");
        migrate(&db).await.expect("second run");
    }

    #[test]
    fn in_memory_sqlite_uses_a_single_connection() {
        let mut cfg = config("sqlite::memory:");
        cfg.db_max_connections = 8;
        let opts = connect_options(&cfg);
        assert_eq!(opts.get_max_connections(), Some(1));
        assert_eq!(opts.get_min_connections(), Some(1));
    }

    #[test]
    fn pool_settings_follow_config() {
        let mut cfg = config("postgres://shop@localhost/shop");
        cfg.db_max_connections = 3;
        cfg.db_min_connections = 5;
        cfg.db_acquire_timeout_secs = 2;
        let opts = connect_options(&cfg);
        assert_eq!(opts.get_max_connections(), Some(3));
        assert_eq!(opts.get_min_connections(), Some(3));
        assert_eq!(opts.get_acquire_timeout(), Some(Duration::from_secs(2)));
    }
}
