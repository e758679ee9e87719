use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::fulfillment::matching::MatchingConfig;

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub dispatch: DispatchConfig,
    pub vendors_csv: Option<PathBuf>,
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

        let defaults = DispatchConfig::default();
        let decision_window = Duration::from_secs(parse_var(
            "APP_DECISION_WINDOW_SECS",
            defaults.decision_window.as_secs(),
        )?);
        let pickup_window = Duration::from_secs(parse_var(
            "APP_PICKUP_WINDOW_SECS",
            defaults.pickup_window.as_secs(),
        )?);
        let matching = MatchingConfig {
            max_distance_km: parse_var("APP_MATCH_RADIUS_KM", defaults.matching.max_distance_km)?,
            distance_weight: parse_var(
                "APP_MATCH_DISTANCE_WEIGHT",
                defaults.matching.distance_weight,
            )?,
            price_weight: parse_var("APP_MATCH_PRICE_WEIGHT", defaults.matching.price_weight)?,
        };
        let tracking_code_attempts = parse_var(
            "APP_TRACKING_CODE_ATTEMPTS",
            defaults.tracking_code_attempts,
        )?;
        if tracking_code_attempts == 0 {
            return Err(ConfigError::InvalidNumber {
                key: "APP_TRACKING_CODE_ATTEMPTS",
            });
        }

        let vendors_csv = env::var("APP_VENDORS_CSV")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            dispatch: DispatchConfig {
                decision_window,
                pickup_window,
                matching,
                tracking_code_attempts,
            },
            vendors_csv,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        _ => Ok(default),
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Timing and ranking dials for the fulfillment orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// How long a vendor has to accept or reject an offer.
    pub decision_window: Duration,
    /// How long a ready job waits for pickup before it is completed automatically.
    pub pickup_window: Duration,
    pub matching: MatchingConfig,
    pub tracking_code_attempts: u8,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            decision_window: Duration::from_secs(90),
            pickup_window: Duration::from_secs(24 * 60 * 60),
            matching: MatchingConfig::default(),
            tracking_code_attempts: 5,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a valid positive number")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
