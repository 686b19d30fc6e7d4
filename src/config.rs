//! Runtime configuration - TOML file plus environment overrides
//!
//! ```toml
//! [pools]
//! zap = true
//!
//! [virt_space]
//! alignment = 0          # 0 = OS page size
//! executable = false
//! always_pretouch = false
//!
//! [logging]
//! level = "info"
//! format = "compact"     # compact | pretty | json
//! spans = false
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::logging::{parse_level, warn, LogConfig, LogFormat, Level};
use crate::memory::ChunkPools;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    #[serde(default)]
    pub pools: PoolConfig,

    #[serde(default)]
    pub virt_space: VirtSpaceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Fill fresh and released chunks with a marker byte
    #[serde(default = "default_zap")]
    pub zap: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtSpaceConfig {
    /// Commit granularity; rounded up to the page size, 0 means page size
    #[serde(default)]
    pub alignment: usize,

    #[serde(default)]
    pub executable: bool,

    /// Pretouch on every expansion regardless of the caller's request
    #[serde(default)]
    pub always_pretouch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Directory for rolling log files
    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default)]
    pub spans: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { zap: default_zap() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Compact,
            file: None,
            spans: false,
        }
    }
}

fn default_zap() -> bool { cfg!(debug_assertions) }
fn default_level() -> String { "info".to_string() }

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Failed to read config: {}", err),
            Self::Parse(err) => write!(f, "Failed to parse config: {}", err),
            Self::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err)
    }
}

impl VmConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    ///
    /// `VMCORE_CONFIG` names a TOML file to start from; `VMCORE_ZAP_CHUNKS`
    /// and `VMCORE_ALWAYS_PRETOUCH` (`1`/`true`/`0`/`false`) override
    /// single flags. Unreadable files fall back to defaults.
    pub fn from_env() -> Self {
        let mut config = std::env::var("VMCORE_CONFIG")
            .map(|path| Self::load_or_default(Path::new(&path)))
            .unwrap_or_default();

        if let Some(zap) = env_flag("VMCORE_ZAP_CHUNKS") {
            config.pools.zap = zap;
        }
        if let Some(pretouch) = env_flag("VMCORE_ALWAYS_PRETOUCH") {
            config.virt_space.always_pretouch = pretouch;
        }

        config
    }

    /// Load `path`, warning and falling back to defaults if it is unusable
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|err| {
            warn!(
                target: "vmcore",
                path = %path.display(),
                error = %err,
                "ignoring unusable config file, using defaults"
            );
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let alignment = self.virt_space.alignment;
        if alignment != 0 && !alignment.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "virt_space.alignment must be 0 or a power of two, got {}",
                alignment
            )));
        }

        if parse_level(&self.logging.level).is_none() {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of trace, debug, info, warn, error, got '{}'",
                self.logging.level
            )));
        }

        Ok(())
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: parse_level(&self.logging.level).unwrap_or(Level::INFO),
            format: self.logging.format,
            file: self.logging.file.clone(),
            spans: self.logging.spans,
        }
    }

    /// Fresh, empty pools following this configuration
    pub fn chunk_pools(&self) -> ChunkPools {
        ChunkPools::with_zap(self.pools.zap)
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_gives_defaults() {
        let config = VmConfig::from_toml_str("").expect("empty config");
        assert_eq!(config, VmConfig::default());
        assert_eq!(config.virt_space.alignment, 0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn sections_are_parsed() {
        let config = VmConfig::from_toml_str(
            r#"
            [pools]
            zap = false

            [virt_space]
            alignment = 65536
            always_pretouch = true

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .expect("valid config");

        assert!(!config.pools.zap);
        assert_eq!(config.virt_space.alignment, 65536);
        assert!(config.virt_space.always_pretouch);
        assert!(!config.virt_space.executable);

        let log = config.log_config();
        assert_eq!(log.level, Level::DEBUG);
        assert_eq!(log.format, LogFormat::Json);
    }

    #[test]
    fn non_power_of_two_alignment_is_invalid() {
        let err = VmConfig::from_toml_str("[virt_space]\nalignment = 12288\n").expect_err("invalid");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_level_is_invalid() {
        let err = VmConfig::from_toml_str("[logging]\nlevel = \"loud\"\n").expect_err("invalid");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = VmConfig::from_toml_str("[pools\nzap = ").expect_err("malformed");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[pools]\nzap = true").expect("write");

        let config = VmConfig::load(file.path()).expect("load");
        assert!(config.pools.zap);
        assert!(config.chunk_pools().zaps());
    }

    #[test]
    fn unusable_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[virt_space]\nalignment = 3").expect("write");

        assert_eq!(VmConfig::load_or_default(file.path()), VmConfig::default());
        assert_eq!(
            VmConfig::load_or_default(Path::new("/nonexistent/vmcore.toml")),
            VmConfig::default()
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = VmConfig::load(Path::new("/nonexistent/vmcore.toml")).expect_err("missing");
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
