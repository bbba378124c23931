use crate::error::{HubError, Result};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP/WebSocket server configuration
    pub server: ServerConfig,
    /// Hub and connection tuning
    pub hub: HubConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (default: 8080)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = localhost only)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Frames buffered per connection before it is evicted as a slow consumer
    pub outbound_capacity: usize,
    /// Commands buffered on the coordinator intake
    pub control_capacity: usize,
    /// Deadline for writing a single frame
    pub write_wait: Duration,
    /// Read deadline, refreshed by pong frames from the peer
    pub pong_wait: Duration,
    /// Largest inbound message accepted, in bytes
    pub max_message_size: usize,
}

impl HubConfig {
    /// Interval between liveness pings; always shorter than the pong wait.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 9 / 10
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            control_capacity: 1024,
            write_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(60),
            max_message_size: 512,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            server: ServerConfig {
                port: get_env_or("HUB_PORT", "8080").parse().map_err(|_| {
                    HubError::InvalidConfig("HUB_PORT must be a valid port number".into())
                })?,
                host: get_env_or("HUB_HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            hub: HubConfig {
                outbound_capacity: parse_positive("HUB_OUTBOUND_CAPACITY", "256")?,
                control_capacity: parse_positive("HUB_CONTROL_CAPACITY", "1024")?,
                write_wait: Duration::from_secs(parse_positive("HUB_WRITE_WAIT_SECS", "10")? as u64),
                pong_wait: Duration::from_secs(parse_positive("HUB_PONG_WAIT_SECS", "60")? as u64),
                max_message_size: parse_positive("HUB_MAX_MESSAGE_SIZE", "512")?,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the server bind address
    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Parse a strictly positive count from the environment
fn parse_positive(key: &str, default: &str) -> Result<usize> {
    match get_env_or(key, default).trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(HubError::InvalidConfig(format!(
            "{} must be a positive integer",
            key
        ))),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
