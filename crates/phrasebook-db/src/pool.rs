//! Connection pool sizing and health logging.
//!
//! A phrasebook holds little data, so the pool stays small: a handful of
//! request handlers plus the categorization worker.

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use phrasebook_core::{Error, Result};

/// Upper bound on open connections unless `DB_MAX_CONNECTIONS` says otherwise.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;

pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Connections older than this are recycled. `None` keeps them forever.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(30 * 60)),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS`,
    /// `DB_ACQUIRE_TIMEOUT_SECS` and `DB_IDLE_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(raw: Option<String>) -> Option<T> {
            raw.and_then(|v| v.trim().parse().ok())
        }

        let defaults = Self::default();
        let max_connections = parsed::<u32>(lookup("DB_MAX_CONNECTIONS"))
            .unwrap_or(defaults.max_connections)
            .max(1);
        let min_connections = parsed::<u32>(lookup("DB_MIN_CONNECTIONS"))
            .unwrap_or(defaults.min_connections)
            .min(max_connections);

        Self {
            max_connections,
            min_connections,
            acquire_timeout: parsed::<u64>(lookup("DB_ACQUIRE_TIMEOUT_SECS"))
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            idle_timeout: parsed::<u64>(lookup("DB_IDLE_TIMEOUT_SECS"))
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            max_lifetime: defaults.max_lifetime,
        }
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
    }
}

/// Open a pool against `database_url`.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    debug!(
        subsystem = "database",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "Opening phrase store"
    );

    let pool = config
        .options()
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "connect",
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Phrase store connected"
    );
    Ok(pool)
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHealth {
    pub size: u32,
    pub idle: usize,
}

impl PoolHealth {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
        }
    }

    /// Every open connection is checked out.
    pub fn is_saturated(&self) -> bool {
        self.size > 0 && self.idle == 0
    }
}

/// Log pool occupancy. Saturation is a warning.
pub fn log_pool_metrics(pool: &PgPool) -> PoolHealth {
    let health = PoolHealth::of(pool);
    if health.is_saturated() {
        warn!(
            subsystem = "database",
            component = "pool",
            op = "health",
            pool_size = health.size,
            "All phrase store connections are busy"
        );
    } else {
        debug!(
            subsystem = "database",
            component = "pool",
            op = "health",
            pool_size = health.size,
            pool_idle = health.idle,
            "Pool health"
        );
    }
    health
}
