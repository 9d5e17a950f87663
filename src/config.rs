//! Engine-wide configuration: liveness knobs plus an optional multi-format
//! loader.
//!
//! [`EngineConfig`] always exists; loading it from a file is gated behind
//! the `config` feature so a caller content with the defaults (or building
//! an `EngineConfig` by hand) does not pull in the `config`/`toml`/
//! `serde_yaml`/`regex` dependency chain.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const fn default_max_submit() -> Duration {
    Duration::from_secs(30 * 60)
}

const fn default_max_last_update() -> Duration {
    Duration::from_secs(30 * 60)
}

/// The two liveness knobs a [`crate::workstream::Workstream`] is constructed
/// with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `Start` refuses a Plan whose `now - SubmitTime` exceeds this.
    #[serde(with = "duration_secs")]
    pub max_submit: Duration,
    /// Recovery treats a Running Plan as resumable only if its last update
    /// is within this window.
    #[serde(with = "duration_secs")]
    pub max_last_update: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_submit: default_max_submit(),
            max_last_update: default_max_last_update(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Configuration loading error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parsing error: {0}")]
    Parse(String),

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("config deserialization error: {0}")]
    Deserialize(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(feature = "config")]
mod loader {
    use super::{ConfigError, ConfigResult, EngineConfig};
    use ::config::{Config as Cfg, File, FileFormat};
    use regex::Regex;
    use std::path::Path;

    /// Detect a configuration format from a file extension.
    pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat("no file extension".into()))?;

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(FileFormat::Yaml),
            "toml" => Ok(FileFormat::Toml),
            "json" => Ok(FileFormat::Json),
            "ini" => Ok(FileFormat::Ini),
            "ron" => Ok(FileFormat::Ron),
            "json5" => Ok(FileFormat::Json5),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Substitute `${VAR}` and `$VAR` references against the process
    /// environment, leaving unresolved references untouched.
    pub fn substitute_env_vars(content: &str) -> String {
        let braced = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
        let mut result = braced
            .replace_all(content, |caps: &regex::Captures| {
                std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
            })
            .to_string();

        let bare = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").unwrap();
        result = bare
            .replace_all(&result, |caps: &regex::Captures| {
                std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
            })
            .to_string();

        result
    }

    /// Load an [`EngineConfig`] from a file, auto-detecting its format from
    /// the extension and substituting environment variable references
    /// before parsing.
    pub fn load(path: &str) -> ConfigResult<EngineConfig> {
        let format = detect_format(path)?;
        let raw = std::fs::read_to_string(path)?;
        from_str(&raw, format)
    }

    /// Parse an [`EngineConfig`] from an in-memory string in a known
    /// format.
    pub fn from_str(content: &str, format: FileFormat) -> ConfigResult<EngineConfig> {
        let substituted = substitute_env_vars(content);
        let built = Cfg::builder()
            .add_source(File::from_str(&substituted, format))
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        built
            .try_deserialize()
            .map_err(|e| ConfigError::Deserialize(e.to_string()))
    }

    /// Load an [`EngineConfig`] from multiple files, later files overriding
    /// fields set by earlier ones.
    pub fn load_merged(paths: &[&str]) -> ConfigResult<EngineConfig> {
        let mut builder = Cfg::builder();
        for path in paths {
            let format = detect_format(path)?;
            let raw = std::fs::read_to_string(path)?;
            let substituted = substitute_env_vars(&raw);
            builder = builder.add_source(File::from_str(&substituted, format));
        }
        let built = builder.build().map_err(|e| ConfigError::Parse(e.to_string()))?;
        built
            .try_deserialize()
            .map_err(|e| ConfigError::Deserialize(e.to_string()))
    }
}

#[cfg(feature = "config")]
pub use loader::{detect_format, from_str, load, load_merged, substitute_env_vars};
