//! Configuration management for the ledger.
//!
//! Loads configuration from environment variables with sensible defaults.
//! The binary calls `dotenvy::dotenv()` first, so a `.env` file works too.

use crate::access::DEFAULT_PIN;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Which document store backs the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Networked `PostgreSQL` store
    Postgres,
    /// In-process store, optionally mirrored to a JSON file
    Memory,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Selected backend
    pub backend: Backend,
    /// `PostgreSQL` configuration
    pub postgres: PostgresConfig,
    /// JSON file mirroring the in-memory store
    pub local_snapshot: Option<PathBuf>,
    /// Teacher PIN
    pub teacher_pin: String,
    /// How long a mutating operation waits for the store, in milliseconds
    pub command_timeout_ms: u64,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// `PostgreSQL` connection URL
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// - `KITROOM_BACKEND`: `postgres` or `memory` (default: `postgres` if `DATABASE_URL` is set)
    /// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS` (10), `DATABASE_CONNECT_TIMEOUT` (30)
    /// - `KITROOM_LOCAL_SNAPSHOT`: JSON file for the memory backend
    /// - `KITROOM_TEACHER_PIN` (4103)
    /// - `KITROOM_COMMAND_TIMEOUT_MS` (5000)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    #[must_use]
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let url = var("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let backend = match var("KITROOM_BACKEND").as_deref().map(str::trim) {
            Some("memory" | "local") => Backend::Memory,
            Some("postgres") => Backend::Postgres,
            _ if url.is_some() => Backend::Postgres,
            _ => Backend::Memory,
        };

        Self {
            backend,
            postgres: PostgresConfig {
                url,
                max_connections: var("DATABASE_MAX_CONNECTIONS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                connect_timeout: var("DATABASE_CONNECT_TIMEOUT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            local_snapshot: var("KITROOM_LOCAL_SNAPSHOT")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            teacher_pin: var("KITROOM_TEACHER_PIN").unwrap_or_else(|| DEFAULT_PIN.to_string()),
            command_timeout_ms: var("KITROOM_COMMAND_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5000),
        }
    }

    /// Command timeout as a `Duration`
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Connect timeout as a `Duration`
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.postgres.connect_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_memory_without_database_url() {
        let config = config(&[]);
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.teacher_pin, "4103");
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert_eq!(config.postgres.max_connections, 10);
    }

    #[test]
    fn database_url_selects_postgres() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/kitroom")]);
        assert_eq!(config.backend, Backend::Postgres);
    }

    #[test]
    fn explicit_backend_wins() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/kitroom"),
            ("KITROOM_BACKEND", "memory"),
            ("KITROOM_LOCAL_SNAPSHOT", "/tmp/kitroom.json"),
            ("DATABASE_CONNECT_TIMEOUT", "3"),
        ]);
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.local_snapshot, Some(PathBuf::from("/tmp/kitroom.json")));
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let config = config(&[("KITROOM_COMMAND_TIMEOUT_MS", "soon")]);
        assert_eq!(config.command_timeout_ms, 5000);
    }
}
