use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

pub const DEFAULT_ACCESS_LINK_VALIDITY_DAYS: i64 = 30;
pub const DEFAULT_SYNC_LOG_CAPACITY: usize = 1000;
const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SYNC_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_BLUEINK_API_URL: &str = "https://api.blueink.com/api/v2";

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub portal: PortalConfig,
    pub sync: Option<ExternalSyncConfig>,
    pub signing: Option<SigningConfig>,
    pub webhooks: WebhookConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        let base_url = env::var("APP_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();
        let access_link_validity_days = parse_var(
            "ACCESS_LINK_VALIDITY_DAYS",
            DEFAULT_ACCESS_LINK_VALIDITY_DAYS,
        )?;
        let sync_log_capacity = parse_var("SYNC_LOG_CAPACITY", DEFAULT_SYNC_LOG_CAPACITY)?;

        let sync = match non_empty_var("PHP_SYSTEM_URL") {
            Some(url) => Some(ExternalSyncConfig {
                base_url: url.trim_end_matches('/').to_string(),
                api_key: non_empty_var("PHP_API_KEY").unwrap_or_default(),
                api_secret: non_empty_var("PHP_API_SECRET").unwrap_or_default(),
                timeout: Duration::from_secs(parse_var(
                    "SYNC_TIMEOUT_SECS",
                    DEFAULT_SYNC_TIMEOUT_SECS,
                )?),
                retry_attempts: parse_var("SYNC_RETRY_ATTEMPTS", DEFAULT_SYNC_RETRY_ATTEMPTS)?,
            }),
            None => None,
        };

        let signing = non_empty_var("BLUEINK_PRIVATE_API_KEY").map(|api_key| SigningConfig {
            base_url: non_empty_var("BLUEINK_API_URL")
                .unwrap_or_else(|| DEFAULT_BLUEINK_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            webhook_url: format!("{base_url}/api/v1/external-signing/webhook"),
        });

        let webhooks = WebhookConfig {
            external_system_secret: non_empty_var("PHP_WEBHOOK_SECRET"),
            signing_secret: non_empty_var("BLUEINK_WEBHOOK_SECRET"),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            portal: PortalConfig {
                base_url,
                access_link_validity_days,
                sync_log_capacity,
            },
            sync,
            signing,
            webhooks,
        })
    }
}

fn non_empty_var(key: &'static str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        None => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Output shape for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Student-facing portal settings: link minting and sync log retention.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    pub access_link_validity_days: i64,
    pub sync_log_capacity: usize,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            access_link_validity_days: DEFAULT_ACCESS_LINK_VALIDITY_DAYS,
            sync_log_capacity: DEFAULT_SYNC_LOG_CAPACITY,
        }
    }
}

/// Connection settings for the student-records backend.
#[derive(Debug, Clone)]
pub struct ExternalSyncConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub timeout: Duration,
    pub retry_attempts: u32,
}

/// Connection settings for the multi-party signing provider.
#[derive(Debug, Clone)]
pub struct SigningConfig {
    pub base_url: String,
    pub api_key: String,
    pub webhook_url: String,
}

/// Shared secrets for inbound webhooks. A missing secret disables that webhook.
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub external_system_secret: Option<String>,
    pub signing_secret: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16 port number"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must be a valid IP address or 'localhost'")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative number (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_resolves_to_loopback() {
        let server = ServerConfig {
            host: "localhost".to_string(),
            port: 8080,
        };
        let addr = server.socket_addr().expect("loopback address");
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
    }

    #[test]
    fn invalid_host_is_reported() {
        let server = ServerConfig {
            host: "not-an-ip".to_string(),
            port: 8080,
        };
        assert!(matches!(
            server.socket_addr(),
            Err(ConfigError::InvalidHost { .. })
        ));
    }

    #[test]
    fn log_format_defaults_to_compact() {
        assert_eq!(LogFormat::from_str("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Compact);
    }

    #[test]
    fn environment_aliases_are_recognised() {
        assert_eq!(AppEnvironment::from_str("prod"), AppEnvironment::Production);
        assert_eq!(AppEnvironment::from_str("CI"), AppEnvironment::Test);
        assert_eq!(AppEnvironment::from_str("local"), AppEnvironment::Development);
    }
}
