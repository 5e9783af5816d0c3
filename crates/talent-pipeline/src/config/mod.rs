use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::hiring::aptitude::ScoringPolicy;
use crate::workflows::hiring::config::{
    PipelineConfig, DEFAULT_MIRROR_RETRY_ATTEMPTS, DEFAULT_MIRROR_RETRY_BACKOFF,
};

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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pipeline: load_pipeline()?,
        })
    }
}

fn load_pipeline() -> Result<PipelineConfig, ConfigError> {
    let mirror_retry_attempts = match env::var("PIPELINE_MIRROR_RETRIES") {
        Ok(raw) => raw
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|attempts| *attempts > 0)
            .ok_or(ConfigError::InvalidMirrorRetries { value: raw })?,
        Err(_) => DEFAULT_MIRROR_RETRY_ATTEMPTS,
    };

    let mirror_retry_backoff = match env::var("PIPELINE_MIRROR_BACKOFF_MS") {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidMirrorBackoff { value: raw })?,
        Err(_) => DEFAULT_MIRROR_RETRY_BACKOFF,
    };

    let scoring_policy = match env::var("PIPELINE_SHORT_ANSWER_POLICY") {
        Ok(raw) => ScoringPolicy::parse(&raw).ok_or(ConfigError::InvalidScoringPolicy { value: raw })?,
        Err(_) => ScoringPolicy::default(),
    };

    let final_decision_gate = match env::var("PIPELINE_FINAL_DECISION_GATE") {
        Ok(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag {
            name: "PIPELINE_FINAL_DECISION_GATE",
            value: raw,
        })?,
        Err(_) => false,
    };

    Ok(PipelineConfig {
        mirror_retry_attempts,
        mirror_retry_backoff,
        scoring_policy,
        final_decision_gate,
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidMirrorRetries { value: String },
    InvalidMirrorBackoff { value: String },
    InvalidScoringPolicy { value: String },
    InvalidFlag { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidMirrorRetries { value } => write!(
                f,
                "PIPELINE_MIRROR_RETRIES must be an integer within 1..=255 (got '{value}')"
            ),
            ConfigError::InvalidMirrorBackoff { value } => write!(
                f,
                "PIPELINE_MIRROR_BACKOFF_MS must be a non-negative integer (got '{value}')"
            ),
            ConfigError::InvalidScoringPolicy { value } => write!(
                f,
                "PIPELINE_SHORT_ANSWER_POLICY must be 'auto_credit' or 'manual_review' (got '{value}')"
            ),
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be a boolean flag (got '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidMirrorRetries { .. }
            | ConfigError::InvalidMirrorBackoff { .. }
            | ConfigError::InvalidScoringPolicy { .. }
            | ConfigError::InvalidFlag { .. } => None,
        }
    }
}
