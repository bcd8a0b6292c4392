use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

pub const DEFAULT_DAILY_VISIT_CAPACITY: u32 = 50;
pub const DEFAULT_BOOKING_HORIZON_DAYS: u32 = 30;
pub const DEFAULT_POPULATION_RETRY_ATTEMPTS: u8 = 3;

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
    pub visitation: VisitationConfig,
    pub transfers: TransferConfig,
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

        let daily_capacity = match env::var("APP_VISIT_DAILY_CAPACITY") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or(ConfigError::InvalidDailyCapacity { value: raw })?,
            Err(_) => DEFAULT_DAILY_VISIT_CAPACITY,
        };

        let horizon_days = match env::var("APP_VISIT_HORIZON_DAYS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidHorizon { value: raw })?,
            Err(_) => DEFAULT_BOOKING_HORIZON_DAYS,
        };

        let population_retry_attempts = match env::var("APP_POPULATION_RETRY_ATTEMPTS") {
            Ok(raw) => raw
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or(ConfigError::InvalidRetryAttempts { value: raw })?,
            Err(_) => DEFAULT_POPULATION_RETRY_ATTEMPTS,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            visitation: VisitationConfig {
                daily_capacity,
                horizon_days,
            },
            transfers: TransferConfig {
                population_retry_attempts,
            },
        })
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

/// Daily booking limits for the visit scheduling engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitationConfig {
    pub daily_capacity: u32,
    /// Days after today (inclusive of today) scanned for capacity and suggestions.
    pub horizon_days: u32,
}

impl Default for VisitationConfig {
    fn default() -> Self {
        Self {
            daily_capacity: DEFAULT_DAILY_VISIT_CAPACITY,
            horizon_days: DEFAULT_BOOKING_HORIZON_DAYS,
        }
    }
}

/// Knobs for applying population legs after an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    pub population_retry_attempts: u8,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            population_retry_attempts: DEFAULT_POPULATION_RETRY_ATTEMPTS,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDailyCapacity { value: String },
    InvalidHorizon { value: String },
    InvalidRetryAttempts { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDailyCapacity { value } => write!(
                f,
                "APP_VISIT_DAILY_CAPACITY must be a positive integer (found '{value}')"
            ),
            ConfigError::InvalidHorizon { value } => write!(
                f,
                "APP_VISIT_HORIZON_DAYS must be a non-negative integer (found '{value}')"
            ),
            ConfigError::InvalidRetryAttempts { value } => write!(
                f,
                "APP_POPULATION_RETRY_ATTEMPTS must be between 1 and 255 (found '{value}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidDailyCapacity { .. }
            | ConfigError::InvalidHorizon { .. }
            | ConfigError::InvalidRetryAttempts { .. } => None,
        }
    }
}

/// Serializes tests that read or write process environment variables.
#[cfg(test)]
pub(crate) fn env_guard() -> &'static std::sync::Mutex<()> {
    static GUARD: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    GUARD.get_or_init(|| std::sync::Mutex::new(()))
}
