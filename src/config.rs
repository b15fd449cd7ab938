use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::Error;
use log::{info, warn};

use crate::geohash::Boundary;
use crate::join::FetchOptions;

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub bind_address: String,
    pub mongodb_url: String,
    pub mongodb_database: String,
    pub redis_url: String,
    pub lock_expire: Duration,
    pub lock_timeout: Duration,
    pub geohash_precision: usize,
    pub geohash_boundary: Boundary,
    /// Zero disables the per-record timeout.
    pub fetch_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        Ok(Self {
            bind_address: try_load("BIND_ADDRESS", "0.0.0.0:8000")?,
            mongodb_url: try_load("MONGODB_URL", "mongodb://localhost")?,
            mongodb_database: try_load("MONGODB_DATABASE", "deskbreak")?,
            redis_url: try_load("REDIS_URL", "redis://localhost")?,
            lock_expire: Duration::from_millis(try_load("LOCK_EXPIRE_MS", "60000")?),
            lock_timeout: Duration::from_millis(try_load("LOCK_TIMEOUT_MS", "5000")?),
            geohash_precision: try_load("GEOHASH_PRECISION", "5")?,
            geohash_boundary: if try_load("GEOHASH_LEGACY_BOUNDARY", "false")? {
                Boundary::Exclusive
            } else {
                Boundary::Inclusive
            },
            fetch_timeout: Duration::from_millis(try_load("FETCH_TIMEOUT_MS", "10000")?),
        })
    }

    pub fn fetch_options(&self) -> FetchOptions {
        if self.fetch_timeout.is_zero() {
            FetchOptions::default()
        } else {
            FetchOptions::with_timeout(self.fetch_timeout)
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, Error>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{} not set, using default: {}", key, default);
        default.to_owned()
    });
    raw.parse().map_err(|e| {
        warn!("invalid {} value {:?}: {}", key, raw, e);
        Error::msg(format!("invalid {}: {}", key, e))
    })
}
