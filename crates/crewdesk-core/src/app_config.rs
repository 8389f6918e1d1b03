//! Runtime configuration shared by the server and the CLI.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Deployment environment, from `CREWDESK_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    /// Unrecognized names fall back to development.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "production" => Self::Production,
            "test" => Self::Test,
            _ => Self::Development,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }

    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Seed catalog used by `db seed` when no path is given.
    pub seed_path: PathBuf,
    /// Salt mixed into service API key digests.
    pub api_key_hash_salt: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Rows per page on paginated list endpoints.
    pub page_size: u32,
}

// Secrets never reach logs.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("seed_path", &self.seed_path)
            .field("database_url", &"[redacted]")
            .field("api_key_hash_salt", &"[redacted]")
            .field(
                "db_connections",
                &(self.db_min_connections..=self.db_max_connections),
            )
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("page_size", &self.page_size)
            .finish()
    }
}
