//! Postgres connection setup.

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;

use crate::config::Config;

pub fn connect_options(config: &Config) -> Result<PgConnectOptions> {
    PgConnectOptions::from_str(&config.db.url).with_context(|| "Invalid db.url")
}

fn pool_options(config: &Config) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .acquire_timeout(config.db.acquire_timeout())
}

pub async fn connect(config: &Config) -> Result<PgPool> {
    let options = connect_options(config)?;

    let pool = pool_options(config)
        .connect_with(options)
        .await
        .with_context(|| "Failed to connect to Postgres")?;

    Ok(pool)
}

/// A pool that connects on first use, for health checks against a
/// database that may be down.
pub fn connect_lazy(config: &Config) -> Result<PgPool> {
    let options = connect_options(config)?;
    Ok(pool_options(config).connect_lazy_with(options))
}
