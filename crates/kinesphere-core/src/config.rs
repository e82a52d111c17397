//! Runtime configuration.
//!
//! Every value has an environment default; `KINESPHERE_*` variables
//! override it. The data directory follows this precedence, read from the
//! same variable source as everything else:
//! 1. KINESPHERE_DATA_DIR environment variable
//! 2. ~/.config/kinesphere/data
//! 3. ./data (fallback for development)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::remote::DEFAULT_RETRIES;
use crate::store::embedded::DEFAULT_READY_TIMEOUT;

const DEFAULT_CONFIG_DIR: &str = ".config/kinesphere/data";
const DEV_DATA_DIR: &str = "./data";
const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Sub-directory of the data dir holding browser-style key/value entries.
pub const WEB_STORAGE_DIR: &str = "web-storage";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown environment {0:?} (expected development, staging or production)")]
    UnknownEnvironment(String),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Deployment environment; selects the default backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Environment::Development => "http://localhost:3000",
            Environment::Staging => "https://staging.api.kinesphere.com/v1",
            Environment::Production => "https://api.kinesphere.com/v1",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub environment: Environment,
    pub remote_base_url: String,
    pub remote_timeout: Duration,
    /// Additional attempts after a failed remote request
    pub remote_retries: u32,
    /// Per-call wait for the embedded store
    pub ready_timeout: Duration,
    pub data_dir: PathBuf,
    /// Treat a native runtime as a browser (debugging aid)
    pub force_browser_mode: bool,
}

impl Config {
    /// Defaults for an environment, with the data directory resolved from
    /// the process environment.
    pub fn for_environment(environment: Environment) -> Self {
        Self::with_data_dir(environment, get_data_dir())
    }

    fn with_data_dir(environment: Environment, data_dir: PathBuf) -> Self {
        Self {
            environment,
            remote_base_url: environment.default_base_url().to_string(),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            remote_retries: DEFAULT_RETRIES,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            data_dir,
            force_browser_mode: false,
        }
    }

    /// Read `KINESPHERE_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Nothing is read from the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = match lookup("KINESPHERE_ENV") {
            Some(raw) => raw.parse()?,
            None => Environment::default(),
        };
        let mut config = Self::with_data_dir(environment, data_dir_from(&lookup));

        if let Some(url) = lookup("KINESPHERE_API_URL") {
            config.remote_base_url = url;
        }
        if let Some(raw) = lookup("KINESPHERE_API_TIMEOUT_MS") {
            config.remote_timeout = Duration::from_millis(parse_number("KINESPHERE_API_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = lookup("KINESPHERE_API_RETRIES") {
            config.remote_retries = parse_number("KINESPHERE_API_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("KINESPHERE_READY_TIMEOUT_MS") {
            config.ready_timeout = Duration::from_millis(parse_number("KINESPHERE_READY_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = lookup("KINESPHERE_FORCE_BROWSER") {
            config.force_browser_mode = parse_flag("KINESPHERE_FORCE_BROWSER", &raw)?;
        }
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(crate::store::embedded::DATABASE_FILE)
    }

    pub fn web_storage_dir(&self) -> PathBuf {
        self.data_dir.join(WEB_STORAGE_DIR)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_environment(Environment::default())
    }
}

fn parse_number<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

/// Get the data directory for persistence.
pub fn get_data_dir() -> PathBuf {
    data_dir_from(&|key: &str| std::env::var(key).ok())
}

fn data_dir_from(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = lookup("KINESPHERE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = lookup("HOME") {
        return PathBuf::from(home).join(DEFAULT_CONFIG_DIR);
    }

    PathBuf::from(DEV_DATA_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_environment_selects_base_url() {
        let config = Config::from_lookup(lookup(&[("KINESPHERE_ENV", "staging")])).unwrap();
        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.remote_base_url, "https://staging.api.kinesphere.com/v1");

        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.remote_base_url, "http://localhost:3000");
        assert_eq!(config.remote_retries, 2);
        assert_eq!(config.ready_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("KINESPHERE_ENV", "production"),
            ("KINESPHERE_API_URL", "http://127.0.0.1:9999"),
            ("KINESPHERE_API_RETRIES", "0"),
            ("KINESPHERE_READY_TIMEOUT_MS", "250"),
            ("KINESPHERE_DATA_DIR", "/tmp/kinesphere"),
            ("KINESPHERE_FORCE_BROWSER", "true"),
        ]))
        .unwrap();
        assert_eq!(config.remote_base_url, "http://127.0.0.1:9999");
        assert_eq!(config.remote_retries, 0);
        assert_eq!(config.ready_timeout, Duration::from_millis(250));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/kinesphere/kinesphere.db"));
        assert!(config.force_browser_mode);
    }

    #[test]
    fn test_invalid_values() {
        let result = Config::from_lookup(lookup(&[("KINESPHERE_ENV", "qa")]));
        assert_eq!(result, Err(ConfigError::UnknownEnvironment("qa".into())));

        let result = Config::from_lookup(lookup(&[("KINESPHERE_API_RETRIES", "many")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { key: "KINESPHERE_API_RETRIES", .. })));
    }

    #[test]
    fn test_data_dir_comes_from_lookup() {
        let config = Config::from_lookup(lookup(&[("HOME", "/home/ana")])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/home/ana/.config/kinesphere/data"));

        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));

        let config = Config::from_lookup(lookup(&[
            ("HOME", "/home/ana"),
            ("KINESPHERE_DATA_DIR", "/srv/kinesphere"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/kinesphere"));
    }

    #[test]
    fn test_get_data_dir_fallback() {
        let dir = get_data_dir();
        assert!(!dir.as_os_str().is_empty());
    }
}
