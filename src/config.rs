//! Runtime configuration: defaults, optional `crawler.toml` overlay, and
//! validation.
//!
//! The binary takes no command-line flags; everything is driven by defaults
//! plus an optional TOML file in the working directory. Library users build
//! a [`Config`] through [`ConfigBuilder`].

use crate::error::{AppError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default file the builder looks for when no explicit path is given.
const DEFAULT_CONFIG_FILE: &str = "crawler.toml";

/// Effective runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum concurrent in-flight enrichment requests.
    pub max_concurrency: usize,
    /// Steady request rate enforced by the governor.
    pub requests_per_sec: f64,
    /// Per-request deadline, also used for validation probes.
    pub request_timeout: Duration,
    /// Below this many live credentials the minter is invoked.
    pub min_credentials: usize,
    /// Mint target when refilling the working set.
    pub max_credentials: usize,
    /// Pause before process exit (also the post-shutdown drain window).
    pub shutdown_pause: Duration,

    pub emails_file: PathBuf,
    pub accounts_file: PathBuf,
    pub tokens_file: PathBuf,
    pub output_file: PathBuf,
    pub database_file: PathBuf,
    pub log_file: PathBuf,

    /// WebDriver endpoint used by the credential minter.
    pub webdriver_url: String,

    /// Path of the config file that was actually loaded, if any.
    pub loaded_config_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: 50,
            requests_per_sec: 20.0,
            request_timeout: Duration::from_secs(15),
            min_credentials: 10,
            max_credentials: 10,
            shutdown_pause: Duration::from_secs(60),
            emails_file: PathBuf::from("emails.txt"),
            accounts_file: PathBuf::from("accounts.txt"),
            tokens_file: PathBuf::from("tokens.txt"),
            output_file: PathBuf::from("hit.txt"),
            database_file: PathBuf::from("crawler.db"),
            log_file: PathBuf::from("crawler.log"),
            webdriver_url: "http://localhost:4444".to_string(),
            loaded_config_path: None,
        }
    }
}

/// On-disk representation of `crawler.toml`. Every field is optional;
/// missing values keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub crawl: CrawlSection,
    pub credentials: CredentialsSection,
    pub files: FilesSection,
    pub shutdown: ShutdownSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrawlSection {
    pub max_concurrency: Option<usize>,
    pub requests_per_sec: Option<f64>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    pub min_credentials: Option<usize>,
    pub max_credentials: Option<usize>,
    pub webdriver_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilesSection {
    pub emails: Option<String>,
    pub accounts: Option<String>,
    pub tokens: Option<String>,
    pub output: Option<String>,
    pub database: Option<String>,
    pub log: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShutdownSection {
    pub pause_secs: Option<u64>,
}

/// Builder pattern for creating `Config` instances fluently.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    config_file_path: Option<String>,
    overrides: ConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Specify an explicit configuration file path to load.
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file_path = Some(path.into());
        self
    }

    pub fn max_concurrency(mut self, value: usize) -> Self {
        self.overrides.crawl.max_concurrency = Some(value);
        self
    }

    pub fn requests_per_sec(mut self, value: f64) -> Self {
        self.overrides.crawl.requests_per_sec = Some(value);
        self
    }

    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.overrides.crawl.request_timeout_secs = Some(duration.as_secs());
        self
    }

    pub fn credential_range(mut self, min: usize, max: usize) -> Self {
        self.overrides.credentials.min_credentials = Some(min);
        self.overrides.credentials.max_credentials = Some(max);
        self
    }

    pub fn webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.overrides.credentials.webdriver_url = Some(url.into());
        self
    }

    /// Builds the final `Config`, applying defaults, file settings,
    /// overrides, and validation.
    pub fn build(mut self) -> Result<Config> {
        let mut loaded_path: Option<String> = None;

        if let Some(ref path) = self.config_file_path {
            let file_config = load_config_file(path)?;
            apply_file_config(&mut self.config, &file_config);
            loaded_path = Some(path.clone());
            tracing::info!("Loaded configuration from specified file: {}", path);
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            match load_config_file(DEFAULT_CONFIG_FILE) {
                Ok(file_config) => {
                    apply_file_config(&mut self.config, &file_config);
                    loaded_path = Some(DEFAULT_CONFIG_FILE.to_string());
                    tracing::info!(
                        "Loaded configuration from default location: {}",
                        DEFAULT_CONFIG_FILE
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to load or parse default config '{}': {}",
                        DEFAULT_CONFIG_FILE,
                        e
                    );
                }
            }
        } else {
            tracing::debug!("No configuration file found. Using default values.");
        }

        apply_file_config(&mut self.config, &self.overrides);
        self.config.loaded_config_path = loaded_path;
        validate_config(&self.config)?;

        Ok(self.config)
    }
}

/// Loads configuration settings from a TOML file.
pub(crate) fn load_config_file(file_path: &str) -> Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() || !path.is_file() {
        return Err(AppError::Config(format!(
            "config file not found or is not a file: {}",
            file_path
        )));
    }
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| AppError::Config(format!("failed to parse '{}': {}", file_path, e)))
}

/// Applies settings from a parsed `ConfigFile` onto a mutable `Config`.
pub(crate) fn apply_file_config(config: &mut Config, file: &ConfigFile) {
    if let Some(v) = file.crawl.max_concurrency {
        config.max_concurrency = v;
    }
    if let Some(v) = file.crawl.requests_per_sec {
        config.requests_per_sec = v;
    }
    if let Some(v) = file.crawl.request_timeout_secs {
        config.request_timeout = Duration::from_secs(v);
    }
    if let Some(v) = file.credentials.min_credentials {
        config.min_credentials = v;
    }
    if let Some(v) = file.credentials.max_credentials {
        config.max_credentials = v;
    }
    if let Some(ref v) = file.credentials.webdriver_url {
        config.webdriver_url = v.clone();
    }
    if let Some(ref v) = file.files.emails {
        config.emails_file = PathBuf::from(v);
    }
    if let Some(ref v) = file.files.accounts {
        config.accounts_file = PathBuf::from(v);
    }
    if let Some(ref v) = file.files.tokens {
        config.tokens_file = PathBuf::from(v);
    }
    if let Some(ref v) = file.files.output {
        config.output_file = PathBuf::from(v);
    }
    if let Some(ref v) = file.files.database {
        config.database_file = PathBuf::from(v);
    }
    if let Some(ref v) = file.files.log {
        config.log_file = PathBuf::from(v);
    }
    if let Some(v) = file.shutdown.pause_secs {
        config.shutdown_pause = Duration::from_secs(v);
    }
}

/// Sanity-checks the assembled configuration.
pub(crate) fn validate_config(config: &Config) -> Result<()> {
    if config.max_concurrency == 0 {
        return Err(AppError::Config(
            "max_concurrency must be at least 1".into(),
        ));
    }
    if config.requests_per_sec <= 0.0 {
        return Err(AppError::Config(
            "requests_per_sec must be positive".into(),
        ));
    }
    if config.request_timeout.is_zero() {
        return Err(AppError::Config("request_timeout must be non-zero".into()));
    }
    if config.min_credentials > config.max_credentials {
        return Err(AppError::Config(format!(
            "min_credentials ({}) exceeds max_credentials ({})",
            config.min_credentials, config.max_credentials
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.max_concurrency, 50);
        assert_eq!(config.requests_per_sec, 20.0);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.min_credentials, 10);
        assert_eq!(config.max_credentials, 10);
    }

    #[test]
    fn file_overlay_wins_over_defaults() {
        let file: ConfigFile = toml::from_str(
            r#"
            [crawl]
            max_concurrency = 8
            requests_per_sec = 2.5

            [files]
            emails = "targets.txt"
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        apply_file_config(&mut config, &file);
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.requests_per_sec, 2.5);
        assert_eq!(config.emails_file, PathBuf::from("targets.txt"));
        // Untouched fields keep defaults.
        assert_eq!(config.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Config::default();
        config.max_concurrency = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.requests_per_sec = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.min_credentials = 20;
        config.max_credentials = 10;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn builder_overrides_apply_last() {
        let config = ConfigBuilder::new()
            .max_concurrency(4)
            .requests_per_sec(1.0)
            .credential_range(1, 2)
            .webdriver_url("http://localhost:9999")
            .build()
            .unwrap();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.min_credentials, 1);
        assert_eq!(config.max_credentials, 2);
        assert_eq!(config.webdriver_url, "http://localhost:9999");
    }
}
