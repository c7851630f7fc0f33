use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

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

/// Largest number of decimals a composition share may carry.
pub const MAX_SHARE_PRECISION: u32 = 4;

/// Top-level configuration for the pipeline and the metrics service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pipeline: PipelineConfig,
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

        let pipeline = PipelineConfig::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pipeline,
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

/// Locations of the data layers and the knobs of the metric builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub bronze_path: PathBuf,
    pub silver_path: PathBuf,
    pub gold_dir: PathBuf,
    pub share_precision: u32,
    pub gold_retain: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bronze_path: PathBuf::from("data/bronze/oecd_tax.csv"),
            silver_path: PathBuf::from("data/silver/oecd_tax.csv"),
            gold_dir: PathBuf::from("data/gold"),
            share_precision: 1,
            gold_retain: 3,
        }
    }
}

impl PipelineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bronze_path = env::var("ETL_BRONZE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.bronze_path);
        let silver_path = env::var("ETL_SILVER_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.silver_path);
        let gold_dir = env::var("ETL_GOLD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.gold_dir);

        let share_precision = match env::var("ETL_SHARE_PRECISION") {
            Ok(raw) => parse_precision(&raw)?,
            Err(_) => defaults.share_precision,
        };

        let gold_retain = match env::var("ETL_GOLD_RETAIN") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|retain| *retain >= 1)
                .ok_or(ConfigError::InvalidRetention)?,
            Err(_) => defaults.gold_retain,
        };

        Ok(Self {
            bronze_path,
            silver_path,
            gold_dir,
            share_precision,
            gold_retain,
        })
    }

    /// Companion metadata record written next to the Bronze extract.
    pub fn bronze_meta_path(&self) -> PathBuf {
        self.bronze_path.with_extension("meta.json")
    }
}

/// Parses a share precision, rejecting values the integer share arithmetic cannot hold.
pub fn parse_precision(raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|precision| *precision <= MAX_SHARE_PRECISION)
        .ok_or(ConfigError::InvalidPrecision)
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidPrecision,
    InvalidRetention,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidPrecision => write!(
                f,
                "ETL_SHARE_PRECISION must be an integer between 0 and {}",
                MAX_SHARE_PRECISION
            ),
            ConfigError::InvalidRetention => {
                write!(f, "ETL_GOLD_RETAIN must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidPrecision
            | ConfigError::InvalidRetention => None,
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
            "ETL_BRONZE_PATH",
            "ETL_SILVER_PATH",
            "ETL_GOLD_DIR",
            "ETL_SHARE_PRECISION",
            "ETL_GOLD_RETAIN",
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
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(
            config.pipeline.bronze_meta_path(),
            PathBuf::from("data/bronze/oecd_tax.meta.json")
        );
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
    fn pipeline_settings_come_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ETL_GOLD_DIR", "/tmp/gold");
        env::set_var("ETL_SHARE_PRECISION", "2");
        env::set_var("ETL_GOLD_RETAIN", "5");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.pipeline.gold_dir, PathBuf::from("/tmp/gold"));
        assert_eq!(config.pipeline.share_precision, 2);
        assert_eq!(config.pipeline.gold_retain, 5);
        reset_env();
    }

    #[test]
    fn rejects_out_of_range_precision_and_retention() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ETL_SHARE_PRECISION", "9");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidPrecision)
        ));
        reset_env();
        env::set_var("ETL_GOLD_RETAIN", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidRetention)
        ));
        reset_env();
    }
}
