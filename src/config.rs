use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,
    /// Maximum database connections in pool
    pub database_max_connections: u32,
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Window in seconds within which an agent counts as online (default: 300)
    pub online_window_secs: u64,
    /// Whether the best-effort blockchain anchor mirror is enabled
    pub anchor_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let online_window_secs = env::var("ONLINE_WINDOW_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("ONLINE_WINDOW_SECS"))?;

        let anchor_enabled = env::var("ANCHOR_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("ANCHOR_ENABLED"))?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            online_window_secs,
            anchor_enabled,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
