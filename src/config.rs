use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ScanError;

// Rough number of Ethereum blocks per hour.
pub const DEFAULT_BLOCKS_LIMIT: u64 = 250;

// Process-wide configuration for the scanner. Chains and currencies live in
// the database; this only carries what is needed to reach it and pace scans.
#[derive(Clone, Debug)]
pub struct Config {
    pub db_url: String, // Database connection URL
    pub db_max_connections: u32, // Connection pool size
    pub bind_addr: String, // Address for the HTTP server (metrics, REST)
    pub blocks_limit: u64, // Maximum blocks walked per scan
    pub scan_interval: Duration, // Pause between scheduled scans of a chain
    pub rpc_timeout: Duration, // Per-request timeout for node RPC calls
    pub rpc_retry: Duration, // Total time spent retrying one node call
}

impl Config {
    // Loads configuration from environment variables, with defaults for optional fields
    pub fn from_env() -> Result<Self, ScanError> {
        let config = Config {
            // Required: Database connection URL
            db_url: env::var("DATABASE_URL")
                .map_err(|_| ScanError::Config("DATABASE_URL must be set".into()))?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 10)?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            blocks_limit: parse_var("BLOCKS_LIMIT", DEFAULT_BLOCKS_LIMIT)?,
            scan_interval: Duration::from_secs(parse_var("SCAN_INTERVAL_SECS", 15)?),
            rpc_timeout: Duration::from_secs(parse_var("RPC_TIMEOUT_SECS", 30)?),
            rpc_retry: Duration::from_secs(parse_var("RPC_RETRY_SECS", 10)?),
        };

        if config.db_url.is_empty() {
            return Err(ScanError::Config("DATABASE_URL must not be empty".into()));
        }
        if config.blocks_limit == 0 {
            return Err(ScanError::Config("BLOCKS_LIMIT must be positive".into()));
        }

        Ok(config)
    }
}

// Reads an optional numeric variable. Unset means default; unparsable is an error
// rather than a silent fallback.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ScanError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ScanError::Config(format!("{} has an invalid value `{}`", name, raw))),
        Err(_) => Ok(default),
    }
}
