use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::billing::locale::{Locale, LocaleError};

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
    pub storage: StorageConfig,
    pub locale: Locale,
    pub scheduler: SchedulerConfig,
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

        let database_path = env::var("APP_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATABASE_PATH));
        let storage = match env::var("APP_STORAGE")
            .unwrap_or_else(|_| "sqlite".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "sqlite" => StorageConfig::Sqlite {
                path: database_path,
            },
            "memory" => StorageConfig::Memory,
            other => return Err(ConfigError::InvalidStorage(other.to_string())),
        };

        let locale = match env::var("APP_LOCALE") {
            Ok(raw) => Locale::parse(raw.trim()).map_err(ConfigError::InvalidLocale)?,
            Err(_) => Locale::default(),
        };

        let enabled = match env::var("APP_SCHEDULER") {
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "on" | "true" | "1" => true,
                "off" | "false" | "0" => false,
                _ => return Err(ConfigError::InvalidScheduler),
            },
            Err(_) => false,
        };
        let interval_secs = env::var("APP_SCHEDULER_INTERVAL_SECS")
            .unwrap_or_else(|_| DEFAULT_SCHEDULER_INTERVAL_SECS.to_string())
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::InvalidSchedulerInterval)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            storage,
            locale,
            scheduler: SchedulerConfig {
                enabled,
                interval: Duration::from_secs(interval_secs),
            },
        })
    }
}

const DEFAULT_DATABASE_PATH: &str = "campus-admin.db";
const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 86_400;

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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Backend holding discounts, price lists, concepts, receipts and concept types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Memory,
    Sqlite { path: PathBuf },
}

/// In-process trigger for the daily batch transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidStorage(String),
    InvalidLocale(LocaleError),
    InvalidScheduler,
    InvalidSchedulerInterval,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidStorage(value) => {
                write!(f, "APP_STORAGE must be 'sqlite' or 'memory', got '{value}'")
            }
            ConfigError::InvalidLocale(err) => write!(f, "APP_LOCALE: {err}"),
            ConfigError::InvalidScheduler => write!(f, "APP_SCHEDULER must be 'on' or 'off'"),
            ConfigError::InvalidSchedulerInterval => {
                write!(f, "APP_SCHEDULER_INTERVAL_SECS must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidLocale(err) => Some(err),
            ConfigError::InvalidPort
            | ConfigError::InvalidStorage(_)
            | ConfigError::InvalidScheduler
            | ConfigError::InvalidSchedulerInterval => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_STORAGE",
            "APP_DATABASE_PATH",
            "APP_LOCALE",
            "APP_SCHEDULER",
            "APP_SCHEDULER_INTERVAL_SECS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(
            config.storage,
            StorageConfig::Sqlite {
                path: PathBuf::from("campus-admin.db")
            }
        );
        assert_eq!(config.locale, Locale::Es);
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.interval, Duration::from_secs(86_400));
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_storage_locale_and_scheduler_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_STORAGE", "memory");
        env::set_var("APP_LOCALE", "en");
        env::set_var("APP_SCHEDULER", "on");
        env::set_var("APP_SCHEDULER_INTERVAL_SECS", "60");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.locale, Locale::En);
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.interval, Duration::from_secs(60));
        reset_env();
    }

    #[test]
    fn rejects_unknown_storage_and_locale() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_STORAGE", "postgres");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidStorage(value)) if value == "postgres"
        ));

        reset_env();
        env::set_var("APP_LOCALE", "fr");
        assert!(matches!(AppConfig::load(), Err(ConfigError::InvalidLocale(_))));

        reset_env();
        env::set_var("APP_SCHEDULER_INTERVAL_SECS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidSchedulerInterval)
        ));
        reset_env();
    }
}
