//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;
use std::net::IpAddr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub acquirer: AcquirerConfig,
    pub reference: ReferenceConfig,
    pub webhook: WebhookConfig,
    pub settlement: SettlementConfig,
    pub escalation: EscalationConfig,
    pub result_api: ResultApiConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Which acquirer environment the lookup client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquirerEnvironment {
    Test,
    Live,
}

impl AcquirerEnvironment {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            AcquirerEnvironment::Test => "https://try.access.worldpay.com",
            AcquirerEnvironment::Live => "https://access.worldpay.com",
        }
    }
}

/// Card-acquirer credentials and lookup settings
#[derive(Debug, Clone)]
pub struct AcquirerConfig {
    pub environment: AcquirerEnvironment,
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub provider_id: i64,
    pub request_timeout: Duration,
    pub settlement_currency: String,
}

/// Outbound reference shaping. The prefix is compared case-sensitively and
/// the maximum length is an inclusive bound counted in characters.
#[derive(Debug, Clone)]
pub struct ReferenceConfig {
    pub prefix: String,
    pub max_length: usize,
}

/// Webhook intake settings
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub allowed_ips: Vec<IpAddr>,
    pub trust_forwarded_for: bool,
}

/// Bounded wait and search pacing
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub wait_attempts: u32,
    pub wait_interval: Duration,
    pub search_pause: Duration,
}

/// Escalation target when a settled transaction is later reported failed
#[derive(Debug, Clone, Default)]
pub struct EscalationConfig {
    pub fallback_user_id: Option<i64>,
}

/// Result endpoint caller authentication
#[derive(Debug, Clone, Default)]
pub struct ResultApiConfig {
    pub api_token: Option<String>,
}

pub const MAX_SEARCH_PAUSE: Duration = Duration::from_millis(500);

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let skip_externals = env::var("SKIP_EXTERNALS")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: if skip_externals {
                None
            } else {
                Some(DatabaseConfig::from_env()?)
            },
            logging: LoggingConfig::from_env()?,
            acquirer: AcquirerConfig::from_env()?,
            reference: ReferenceConfig::from_env()?,
            webhook: WebhookConfig::from_env()?,
            settlement: SettlementConfig::from_env()?,
            escalation: EscalationConfig::from_env()?,
            result_api: ResultApiConfig::from_env(),
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        self.acquirer.validate()?;
        self.reference.validate()?;
        self.settlement.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl AcquirerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match env::var("ACQUIRER_ENVIRONMENT")
            .unwrap_or_else(|_| "test".to_string())
            .to_lowercase()
            .as_str()
        {
            "live" | "enabled" => AcquirerEnvironment::Live,
            "test" => AcquirerEnvironment::Test,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "ACQUIRER_ENVIRONMENT".to_string(),
                ))
            }
        };

        Ok(AcquirerConfig {
            environment,
            base_url: env::var("ACQUIRER_BASE_URL")
                .unwrap_or_else(|_| environment.default_base_url().to_string()),
            username: env::var("ACQUIRER_USERNAME")
                .map_err(|_| ConfigError::MissingVariable("ACQUIRER_USERNAME".to_string()))?,
            password: env::var("ACQUIRER_PASSWORD")
                .map_err(|_| ConfigError::MissingVariable("ACQUIRER_PASSWORD".to_string()))?,
            provider_id: env::var("ACQUIRER_PROVIDER_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ACQUIRER_PROVIDER_ID".to_string()))?,
            request_timeout: Duration::from_secs(
                env::var("ACQUIRER_REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .map_err(|_| {
                        ConfigError::InvalidValue("ACQUIRER_REQUEST_TIMEOUT_SECS".to_string())
                    })?,
            ),
            settlement_currency: env::var("ACQUIRER_SETTLEMENT_CURRENCY")
                .unwrap_or_else(|_| "GBP".to_string()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "ACQUIRER_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.username.is_empty() {
            return Err(ConfigError::InvalidValue("ACQUIRER_USERNAME".to_string()));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "ACQUIRER_REQUEST_TIMEOUT_SECS".to_string(),
            ));
        }

        if self.settlement_currency.len() != 3 {
            return Err(ConfigError::InvalidValue(
                "ACQUIRER_SETTLEMENT_CURRENCY must be an ISO 4217 code".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            prefix: "SNSVT-".to_string(),
            max_length: 20,
        }
    }
}

impl ReferenceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(ReferenceConfig {
            prefix: env::var("REFERENCE_PREFIX").unwrap_or(defaults.prefix),
            max_length: match env::var("REFERENCE_MAX_LENGTH") {
                Ok(value) => value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("REFERENCE_MAX_LENGTH".to_string()))?,
                Err(_) => defaults.max_length,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.chars().count() >= self.max_length {
            return Err(ConfigError::ValidationFailed(
                "REFERENCE_PREFIX must be shorter than REFERENCE_MAX_LENGTH".to_string(),
            ));
        }

        Ok(())
    }
}

impl WebhookConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(WebhookConfig {
            allowed_ips: parse_ip_list(&env::var("WEBHOOK_ALLOWED_IPS").unwrap_or_default())?,
            trust_forwarded_for: env::var("WEBHOOK_TRUST_FORWARDED_FOR")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("WEBHOOK_TRUST_FORWARDED_FOR".to_string()))?,
        })
    }
}

/// Parse a comma-separated list of exact IP addresses.
pub fn parse_ip_list(raw: &str) -> Result<Vec<IpAddr>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidValue(format!("WEBHOOK_ALLOWED_IPS: {}", s)))
        })
        .collect()
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            wait_attempts: 30,
            wait_interval: Duration::from_secs(1),
            search_pause: MAX_SEARCH_PAUSE,
        }
    }
}

impl SettlementConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(SettlementConfig {
            wait_attempts: env::var("SETTLEMENT_WAIT_ATTEMPTS")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .map_err(|_| ConfigError::InvalidValue("SETTLEMENT_WAIT_ATTEMPTS".to_string()))?
                .unwrap_or(defaults.wait_attempts),
            wait_interval: env::var("SETTLEMENT_WAIT_INTERVAL_MS")
                .ok()
                .map(|v| v.parse().map(Duration::from_millis))
                .transpose()
                .map_err(|_| ConfigError::InvalidValue("SETTLEMENT_WAIT_INTERVAL_MS".to_string()))?
                .unwrap_or(defaults.wait_interval),
            search_pause: env::var("SEARCH_PAUSE_MS")
                .ok()
                .map(|v| v.parse().map(Duration::from_millis))
                .transpose()
                .map_err(|_| ConfigError::InvalidValue("SEARCH_PAUSE_MS".to_string()))?
                .unwrap_or(defaults.search_pause)
                .min(MAX_SEARCH_PAUSE),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wait_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "SETTLEMENT_WAIT_ATTEMPTS".to_string(),
            ));
        }

        if self.search_pause > MAX_SEARCH_PAUSE {
            return Err(ConfigError::InvalidValue("SEARCH_PAUSE_MS".to_string()));
        }

        Ok(())
    }
}

impl EscalationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(EscalationConfig {
            fallback_user_id: env::var("ESCALATION_FALLBACK_USER_ID")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim().parse())
                .transpose()
                .map_err(|_| {
                    ConfigError::InvalidValue("ESCALATION_FALLBACK_USER_ID".to_string())
                })?,
        })
    }
}

impl ResultApiConfig {
    pub fn from_env() -> Self {
        ResultApiConfig {
            api_token: env::var("RESULT_API_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reference_defaults_match_acquirer_limits() {
        let config = ReferenceConfig::default();
        assert_eq!(config.prefix, "SNSVT-");
        assert_eq!(config.max_length, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_prefix_longer_than_limit_is_rejected() {
        let config = ReferenceConfig {
            prefix: "LONGPREFIX-".to_string(),
            max_length: 8,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ip_list_parsing() {
        let ips = parse_ip_list(" 10.0.0.1, ,2001:db8::1 ").unwrap();
        assert_eq!(ips.len(), 2);
        assert_eq!(ips[0], "10.0.0.1".parse::<IpAddr>().unwrap());

        assert!(parse_ip_list("10.0.0.0/24").is_err());
        assert!(parse_ip_list("").unwrap().is_empty());
    }

    #[test]
    fn test_settlement_defaults() {
        let config = SettlementConfig::default();
        assert_eq!(config.wait_attempts, 30);
        assert_eq!(config.wait_interval, Duration::from_secs(1));
        assert_eq!(config.search_pause, Duration::from_millis(500));
    }

    #[test]
    fn test_environment_base_urls() {
        assert_eq!(
            AcquirerEnvironment::Test.default_base_url(),
            "https://try.access.worldpay.com"
        );
        assert_eq!(
            AcquirerEnvironment::Live.default_base_url(),
            "https://access.worldpay.com"
        );
    }
}
