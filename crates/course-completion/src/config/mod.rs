use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::workflows::learning::{
    AttemptPolicy, CompletionPolicy, EligibilityConfig, EngineSettings, PipelineConfig,
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
    pub policy: PolicyConfig,
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
            policy: PolicyConfig::from_env()?,
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

/// Completion and certification thresholds, overridable per deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    pub text_min_seconds: u32,
    pub video_min_watch_percent: u8,
    pub quiz_grace_seconds: i64,
    pub min_time_fraction: f64,
    pub cert_retries_per_sweep: u32,
    pub cert_max_generation_attempts: u32,
    pub certificate_prefix: String,
    pub verification_prefix: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            text_min_seconds: 30,
            video_min_watch_percent: 90,
            quiz_grace_seconds: 30,
            min_time_fraction: 0.5,
            cert_retries_per_sweep: 3,
            cert_max_generation_attempts: 10,
            certificate_prefix: "CERT".to_string(),
            verification_prefix: "VC".to_string(),
        }
    }
}

impl PolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let video_min_watch_percent = parse_var(
            "POLICY_VIDEO_MIN_WATCH_PERCENT",
            defaults.video_min_watch_percent,
        )?;
        if video_min_watch_percent > 100 {
            return Err(ConfigError::InvalidPolicy {
                key: "POLICY_VIDEO_MIN_WATCH_PERCENT",
                value: video_min_watch_percent.to_string(),
            });
        }

        let min_time_fraction =
            parse_var("POLICY_MIN_TIME_FRACTION", defaults.min_time_fraction)?;
        if !(0.0..=1.0).contains(&min_time_fraction) {
            return Err(ConfigError::InvalidPolicy {
                key: "POLICY_MIN_TIME_FRACTION",
                value: min_time_fraction.to_string(),
            });
        }

        let cert_retries_per_sweep = parse_var(
            "POLICY_CERT_RETRIES_PER_SWEEP",
            defaults.cert_retries_per_sweep,
        )?;
        if cert_retries_per_sweep == 0 {
            return Err(ConfigError::InvalidPolicy {
                key: "POLICY_CERT_RETRIES_PER_SWEEP",
                value: "0".to_string(),
            });
        }

        let cert_max_generation_attempts = parse_var(
            "POLICY_CERT_MAX_GENERATION_ATTEMPTS",
            defaults.cert_max_generation_attempts,
        )?;
        if cert_max_generation_attempts == 0 {
            return Err(ConfigError::InvalidPolicy {
                key: "POLICY_CERT_MAX_GENERATION_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            text_min_seconds: parse_var("POLICY_TEXT_MIN_SECONDS", defaults.text_min_seconds)?,
            video_min_watch_percent,
            quiz_grace_seconds: parse_var(
                "POLICY_QUIZ_GRACE_SECONDS",
                defaults.quiz_grace_seconds,
            )?
            .max(0),
            min_time_fraction,
            cert_retries_per_sweep,
            cert_max_generation_attempts,
            certificate_prefix: prefix_var("POLICY_CERT_PREFIX", defaults.certificate_prefix)?,
            verification_prefix: prefix_var(
                "POLICY_VERIFICATION_PREFIX",
                defaults.verification_prefix,
            )?,
        })
    }

    /// Per-component policies for the learning engine.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            completion: CompletionPolicy {
                minimum_text_seconds: self.text_min_seconds,
                minimum_video_watch_percentage: self.video_min_watch_percent,
                ..CompletionPolicy::default()
            },
            attempts: AttemptPolicy {
                grace_period_seconds: self.quiz_grace_seconds,
            },
            eligibility: EligibilityConfig {
                minimum_time_fraction: self.min_time_fraction,
                ..EligibilityConfig::default()
            },
            pipeline: PipelineConfig {
                retries_per_sweep: self.cert_retries_per_sweep,
                max_generation_attempts: self.cert_max_generation_attempts,
                certificate_prefix: self.certificate_prefix.clone(),
                verification_prefix: self.verification_prefix.clone(),
                ..PipelineConfig::default()
            },
        }
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidPolicy { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn prefix_var(key: &'static str, default: String) -> Result<String, ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };
    let prefix = raw.trim();
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::InvalidPolicy { key, value: raw });
    }
    Ok(prefix.to_ascii_uppercase())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidPolicy { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidPolicy { key, value } => {
                write!(f, "{key} has an unusable value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidPolicy { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const POLICY_KEYS: [&str; 8] = [
        "POLICY_TEXT_MIN_SECONDS",
        "POLICY_VIDEO_MIN_WATCH_PERCENT",
        "POLICY_QUIZ_GRACE_SECONDS",
        "POLICY_MIN_TIME_FRACTION",
        "POLICY_CERT_RETRIES_PER_SWEEP",
        "POLICY_CERT_MAX_GENERATION_ATTEMPTS",
        "POLICY_CERT_PREFIX",
        "POLICY_VERIFICATION_PREFIX",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        for key in POLICY_KEYS {
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
        assert_eq!(config.policy, PolicyConfig::default());
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
    fn policy_overrides_flow_into_engine_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("POLICY_TEXT_MIN_SECONDS", "45");
        env::set_var("POLICY_VIDEO_MIN_WATCH_PERCENT", "80");
        env::set_var("POLICY_QUIZ_GRACE_SECONDS", "10");
        env::set_var("POLICY_CERT_MAX_GENERATION_ATTEMPTS", "4");
        env::set_var("POLICY_CERT_PREFIX", "acme");

        let policy = PolicyConfig::from_env().expect("policy loads");
        reset_env();

        let settings = policy.engine_settings();
        assert_eq!(settings.completion.minimum_text_seconds, 45);
        assert_eq!(settings.completion.minimum_video_watch_percentage, 80);
        assert!(settings.completion.requires_quiz_pass);
        assert_eq!(settings.attempts.grace_period_seconds, 10);
        assert_eq!(settings.pipeline.max_generation_attempts, 4);
        assert_eq!(settings.pipeline.certificate_prefix, "ACME");
        assert_eq!(settings.pipeline.verification_prefix, "VC");
        assert_eq!(settings.eligibility, EligibilityConfig::default());
    }

    #[test]
    fn rejects_out_of_range_watch_percentage() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("POLICY_VIDEO_MIN_WATCH_PERCENT", "120");

        let err = PolicyConfig::from_env().expect_err("120% is not a threshold");
        reset_env();

        match err {
            ConfigError::InvalidPolicy { key, value } => {
                assert_eq!(key, "POLICY_VIDEO_MIN_WATCH_PERCENT");
                assert_eq!(value, "120");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_unparseable_time_fraction() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("POLICY_MIN_TIME_FRACTION", "half");

        let err = PolicyConfig::from_env().expect_err("fraction must be numeric");
        reset_env();

        assert!(matches!(
            err,
            ConfigError::InvalidPolicy {
                key: "POLICY_MIN_TIME_FRACTION",
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_retries_per_sweep() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("POLICY_CERT_RETRIES_PER_SWEEP", "0");

        let err = PolicyConfig::from_env().expect_err("a sweep must try at least once");
        reset_env();

        match err {
            ConfigError::InvalidPolicy { key, value } => {
                assert_eq!(key, "POLICY_CERT_RETRIES_PER_SWEEP");
                assert_eq!(value, "0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
