//! Environment-driven configuration, snapshotted once at startup.

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Result};

/// Blend weights for combining local and distribution discounts into one
/// sensitivity figure. Intentionally configurable rather than a fixed law.
#[derive(Debug, Clone, Copy)]
pub struct BlendWeights {
    pub local: f64,
    pub distribution: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            local: 0.6,
            distribution: 0.4,
        }
    }
}

/// Credentials for the external benchmark price API
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_path: String,
    pub alias_file: PathBuf,
    pub ledger_file: PathBuf,
    /// None when no benchmark API is configured; the benchmark channel of
    /// the reference series then simply stays empty.
    pub benchmark: Option<BenchmarkConfig>,
    pub chunk_days: i64,
    pub blend: BlendWeights,
    pub geocoder_url: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_f64(key: &str, default: f64) -> Result<f64> {
    match env::var(key) {
        Ok(raw) => match raw.parse::<f64>() {
            Ok(v) => Ok(v),
            Err(_) => bail!("{key} is not a number: {raw:?}"),
        },
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Read configuration from the environment. A benchmark URL without an
    /// API key is a hard error; leaving both unset disables the benchmark
    /// source entirely.
    pub fn from_env() -> Result<Self> {
        let benchmark = match env::var("BENCHMARK_API_URL") {
            Ok(url) if !url.trim().is_empty() => match env::var("BENCHMARK_API_KEY") {
                Ok(api_key) if !api_key.trim().is_empty() => {
                    Some(BenchmarkConfig { url, api_key })
                }
                _ => bail!("BENCHMARK_API_URL is set but BENCHMARK_API_KEY is missing"),
            },
            _ => None,
        };

        let chunk_days = match env_f64("BENCHMARK_CHUNK_DAYS", 21.0)? as i64 {
            d if d >= 1 => d,
            d => bail!("BENCHMARK_CHUNK_DAYS must be >= 1, got {d}"),
        };

        Ok(Self {
            store_path: env_or("SGL_STORE_PATH", "data/orders.db"),
            alias_file: PathBuf::from(env_or("PRODUCT_ALIAS_FILE", "data/product_aliases.json")),
            ledger_file: PathBuf::from(env_or("PURCHASE_LEDGER_FILE", "data/purchase_ledger.csv")),
            benchmark,
            chunk_days,
            blend: BlendWeights {
                local: env_f64("SENSITIVITY_LOCAL_WEIGHT", 0.6)?,
                distribution: env_f64("SENSITIVITY_DISTRIBUTION_WEIGHT", 0.4)?,
            },
            geocoder_url: env_or("GEOCODER_URL", "https://nominatim.openstreetmap.org/search"),
        })
    }
}
