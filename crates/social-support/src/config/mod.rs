use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pipeline: PipelineConfig,
    pub authorities: AuthorityConfig,
    pub generation: GenerationConfig,
    pub storage: StorageConfig,
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

        let pipeline = PipelineConfig {
            model_path: PathBuf::from(
                env::var("APP_MODEL_PATH")
                    .unwrap_or_else(|_| "models/eligibility_model.json".to_string()),
            ),
            income_tolerance: bounded("APP_INCOME_TOLERANCE", 500.0, 0.0, f64::MAX)?,
            address_similarity: bounded("APP_ADDRESS_SIMILARITY", 0.70, 0.0, 1.0)?,
            eligibility_cutoff: bounded("APP_ELIGIBILITY_CUTOFF", 0.5, 0.0, 1.0)?,
            demo_sentinels: flag("APP_DEMO_SENTINELS", false)?,
        };

        let authorities = AuthorityConfig {
            identity_url: optional("APP_IDENTITY_AUTHORITY_URL"),
            financial_url: optional("APP_FINANCIAL_AUTHORITY_URL"),
            credit_url: optional("APP_CREDIT_AUTHORITY_URL"),
            timeout: millis("APP_AUTHORITY_TIMEOUT_MS", 2_000)?,
        };

        let generation = GenerationConfig {
            base_url: optional("APP_TEXT_GENERATION_URL"),
            model: env::var("APP_TEXT_GENERATION_MODEL")
                .unwrap_or_else(|_| "llama3".to_string()),
            timeout: millis("APP_TEXT_GENERATION_TIMEOUT_MS", 30_000)?,
        };

        let storage = StorageConfig {
            ledger_path: optional("APP_APPLICATION_LEDGER").map(PathBuf::from),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pipeline,
            authorities,
            generation,
            storage,
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

/// Model location and the decision thresholds applied by the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub model_path: PathBuf,
    pub income_tolerance: f64,
    pub address_similarity: f64,
    pub eligibility_cutoff: f64,
    pub demo_sentinels: bool,
}

/// External authority endpoints; a missing URL selects the offline authority.
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    pub identity_url: Option<String>,
    pub financial_url: Option<String>,
    pub credit_url: Option<String>,
    pub timeout: Duration,
}

/// Text generation endpoint; generation is disabled without a base URL.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub base_url: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub ledger_path: Option<PathBuf>,
}

fn optional(variable: &str) -> Option<String> {
    env::var(variable)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed<T: FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(variable) {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { variable, value }),
    }
}

fn bounded(variable: &'static str, default: f64, min: f64, max: f64) -> Result<f64, ConfigError> {
    let value = parsed(variable, default)?;
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::OutOfRange {
            variable,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn millis(variable: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let value = parsed(variable, default)?;
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            variable,
            value: value.to_string(),
        });
    }
    Ok(Duration::from_millis(value))
}

fn flag(variable: &'static str, default: bool) -> Result<bool, ConfigError> {
    match optional(variable) {
        None => Ok(default),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { variable, value }),
        },
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidNumber {
        variable: &'static str,
        value: String,
    },
    OutOfRange {
        variable: &'static str,
        value: String,
    },
    InvalidFlag {
        variable: &'static str,
        value: String,
    },
    Client {
        variable: &'static str,
        message: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable, value } => {
                write!(f, "{variable} must be numeric, got '{value}'")
            }
            ConfigError::OutOfRange { variable, value } => {
                write!(f, "{variable} is out of range: {value}")
            }
            ConfigError::InvalidFlag { variable, value } => {
                write!(f, "{variable} must be true or false, got '{value}'")
            }
            ConfigError::Client { variable, message } => {
                write!(f, "client for {variable} could not be built: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

/// Serializes tests that read or mutate process environment variables.
#[cfg(test)]
pub(crate) fn env_guard() -> &'static std::sync::Mutex<()> {
    static GUARD: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    GUARD.get_or_init(|| std::sync::Mutex::new(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const VARIABLES: [&str; 17] = [
        "APP_ENV",
        "APP_HOST",
        "APP_PORT",
        "APP_LOG_LEVEL",
        "APP_MODEL_PATH",
        "APP_INCOME_TOLERANCE",
        "APP_ADDRESS_SIMILARITY",
        "APP_ELIGIBILITY_CUTOFF",
        "APP_AUTHORITY_TIMEOUT_MS",
        "APP_IDENTITY_AUTHORITY_URL",
        "APP_FINANCIAL_AUTHORITY_URL",
        "APP_CREDIT_AUTHORITY_URL",
        "APP_TEXT_GENERATION_URL",
        "APP_TEXT_GENERATION_MODEL",
        "APP_TEXT_GENERATION_TIMEOUT_MS",
        "APP_APPLICATION_LEDGER",
        "APP_DEMO_SENTINELS",
    ];

    fn reset_env() {
        for variable in VARIABLES {
            env::remove_var(variable);
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
            config.pipeline.model_path,
            PathBuf::from("models/eligibility_model.json")
        );
        assert_eq!(config.pipeline.income_tolerance, 500.0);
        assert_eq!(config.pipeline.address_similarity, 0.70);
        assert_eq!(config.pipeline.eligibility_cutoff, 0.5);
        assert!(!config.pipeline.demo_sentinels);
        assert!(config.authorities.identity_url.is_none());
        assert_eq!(config.authorities.timeout, Duration::from_millis(2_000));
        assert!(config.generation.base_url.is_none());
        assert_eq!(config.generation.model, "llama3");
        assert!(config.storage.ledger_path.is_none());
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
    fn rejects_similarity_above_one() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ADDRESS_SIMILARITY", "1.5");
        let err = AppConfig::load().expect_err("similarity out of range");
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                variable: "APP_ADDRESS_SIMILARITY",
                ..
            }
        ));
        reset_env();
    }

    #[test]
    fn reads_thresholds_and_flags() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_INCOME_TOLERANCE", "250");
        env::set_var("APP_DEMO_SENTINELS", "yes");
        env::set_var("APP_TEXT_GENERATION_URL", " http://localhost:11434 ");
        env::set_var("APP_AUTHORITY_TIMEOUT_MS", "750");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.pipeline.income_tolerance, 250.0);
        assert!(config.pipeline.demo_sentinels);
        assert_eq!(
            config.generation.base_url.as_deref(),
            Some("http://localhost:11434")
        );
        assert_eq!(config.authorities.timeout, Duration::from_millis(750));
        reset_env();
    }

    #[test]
    fn rejects_malformed_flag() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_DEMO_SENTINELS", "sometimes");
        let err = AppConfig::load().expect_err("flag rejected");
        assert_eq!(
            err.to_string(),
            "APP_DEMO_SENTINELS must be true or false, got 'sometimes'"
        );
        reset_env();
    }
}
