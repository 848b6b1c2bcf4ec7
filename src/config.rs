//! Configuration loaded with Figment.
//!
//! Values are layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. `config/twain_scan.toml` (or the file given to [`ScanConfig::load_from`])
//! 3. Environment variables prefixed with `TWAINSCAN_`
//!
//! Nested keys in environment variables are separated by a double underscore:
//!
//! ```text
//! TWAINSCAN_APPLICATION__LOG_LEVEL=debug
//! TWAINSCAN_SESSION__TRANSFER_COUNT=-1
//! TWAINSCAN_OUTPUT__FILE_NAME=page.png
//! ```
//!
//! # Example
//!
//! ```no_run
//! use twain_scan::config::ScanConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ScanConfig::load()?;
//!     println!("Application: {}", config.application.product_name);
//!     println!("Pages per scan: {}", config.session.transfer_count);
//!     Ok(())
//! }
//! ```

use crate::output::format_for_path;
use crate::protocol::{COUNTRY_USA, LANGUAGE_ENGLISH_USA};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/twain_scan.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "TWAINSCAN_";

/// Longest identity string that fits the 32-character protocol field.
const IDENTITY_STRING_MAX: usize = 32;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScanConfig {
    /// Identity presented to the data source manager
    pub application: ApplicationConfig,
    /// Scan negotiation and message pump settings
    pub session: SessionConfig,
    /// Where scanned pages are written
    pub output: OutputConfig,
}

/// Application identity and logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Manufacturer in the application identity
    pub manufacturer: String,
    /// Product family in the application identity
    pub product_family: String,
    /// Product name in the application identity
    pub product_name: String,
    /// Application major version
    pub version_major: u16,
    /// Application minor version
    pub version_minor: u16,
    /// Application version text
    pub version_info: String,
    /// Protocol language code
    pub language: u16,
    /// Protocol country code
    pub country: u16,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            manufacturer: "twain_scan".to_string(),
            product_family: "Image Acquisition".to_string(),
            product_name: "twain_scan".to_string(),
            version_major: 1,
            version_minor: 0,
            version_info: env!("CARGO_PKG_VERSION").to_string(),
            language: LANGUAGE_ENGLISH_USA,
            country: COUNTRY_USA,
            log_level: "info".to_string(),
        }
    }
}

/// Scan session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pages requested per scan; -1 for all pages
    pub transfer_count: i16,
    /// Show the source's own user interface
    pub show_ui: bool,
    /// Make the source UI modal
    pub modal_ui: bool,
    /// Use the extended manager library when it is installed
    pub prefer_extended: bool,
    /// Delay between idle messages of the polling pump
    pub poll_interval_ms: u64,
    /// Idle messages to pump before giving up on a scan
    pub poll_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transfer_count: 1,
            show_ui: false,
            modal_ui: true,
            prefer_extended: true,
            poll_interval_ms: 50,
            poll_limit: 1200,
        }
    }
}

/// Output file settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory scanned pages are written to
    pub directory: PathBuf,
    /// Base file name; the extension selects the image codec
    pub file_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("scans"),
            file_name: "scan.png".to_string(),
        }
    }
}

impl OutputConfig {
    /// Base path pages are numbered from.
    pub fn base_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

impl ScanConfig {
    /// Load configuration from the default file and the environment
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply. The result is validated.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file cannot be parsed or the merged
    /// configuration is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path.as_ref())
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// The provider stack behind [`ScanConfig::load_from`].
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(ScanConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Transfer count is -1 or positive
    /// - Identity strings fit the protocol's 32-character fields
    /// - The output file extension has an image codec
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.session.transfer_count == 0 || self.session.transfer_count < -1 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid transfer_count {}. Must be -1 (all pages) or positive",
                self.session.transfer_count
            )));
        }

        let identity_fields = [
            ("manufacturer", &self.application.manufacturer),
            ("product_family", &self.application.product_family),
            ("product_name", &self.application.product_name),
            ("version_info", &self.application.version_info),
        ];
        for (name, value) in identity_fields {
            if value.len() > IDENTITY_STRING_MAX {
                return Err(ConfigError::ValidationError(format!(
                    "'{}' is {} bytes long; at most {} fit the identity record",
                    name,
                    value.len(),
                    IDENTITY_STRING_MAX
                )));
            }
        }

        if format_for_path(Path::new(&self.output.file_name)).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "Output file '{}' has no supported image extension",
                self.output.file_name
            )));
        }

        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(format!("Cannot render configuration: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.transfer_count, 1);
        assert!(!config.session.show_ui);
        assert_eq!(config.output.base_path(), PathBuf::from("scans/scan.png"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = ScanConfig::default();
        config.application.log_level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log_level"));
    }

    #[test]
    fn test_invalid_transfer_count() {
        let mut config = ScanConfig::default();
        config.session.transfer_count = 0;
        assert!(config.validate().is_err());
        config.session.transfer_count = -2;
        assert!(config.validate().is_err());
        config.session.transfer_count = -1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_identity_string_too_long() {
        let mut config = ScanConfig::default();
        config.application.product_name = "x".repeat(33);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("product_name"));
    }

    #[test]
    fn test_unknown_output_extension() {
        let mut config = ScanConfig::default();
        config.output.file_name = "scan.xyz".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[session]\ntransfer_count = -1\n\n[output]\nfile_name = \"page.jpg\""
        )
        .unwrap();

        let config = ScanConfig::load_from(file.path()).unwrap();
        assert_eq!(config.session.transfer_count, -1);
        assert_eq!(config.output.file_name, "page.jpg");
        assert_eq!(config.application.log_level, "info");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ScanConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config, ScanConfig::default());
    }

    #[test]
    fn test_toml_output() {
        let text = ScanConfig::default().to_toml().unwrap();
        assert!(text.contains("[session]"));
        assert!(text.contains("transfer_count = 1"));
    }
}
