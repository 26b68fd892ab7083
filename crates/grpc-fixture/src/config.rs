use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::correlator::{CorrelationRule, ExtractRule, FieldCorrelator, FieldPath};

/// Fixture server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    pub server: ServerConfig,
    pub fixture: FixtureSection,
    pub logging: LoggingConfig,
    pub correlation: Vec<CorrelationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureSection {
    /// Recorded dump to replay.
    pub dump: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for the log file; environment variables are expanded.
    pub directory: String,
    pub stdout: bool,
}

/// One `[[correlation]]` table.
///
/// Exactly one of `extract_path` and `extract` must be given. The only named
/// extraction is `"first_quoted_token"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_path: Option<FieldPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<String>,
    pub inject_path: FieldPath,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([127, 0, 0, 1], 50051)),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "$HOME/.grpc-fixture/logs".to_string(),
            stdout: false,
        }
    }
}

impl CorrelationConfig {
    pub fn to_rule(&self) -> Result<CorrelationRule> {
        let extract = match (&self.extract_path, self.extract.as_deref()) {
            (Some(path), None) => ExtractRule::Path(path.clone()),
            (None, Some("first_quoted_token")) => ExtractRule::FirstQuotedToken,
            (None, Some(other)) => bail!(
                "Unknown extraction '{}' for method {}",
                other,
                self.method
            ),
            (Some(_), Some(_)) => bail!(
                "Method {} sets both extract_path and extract",
                self.method
            ),
            (None, None) => bail!(
                "Method {} needs one of extract_path or extract",
                self.method
            ),
        };
        Ok(CorrelationRule::new(extract, self.inject_path.clone()))
    }
}

impl FixtureConfig {
    /// Load from `path` if given, otherwise start from defaults, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::load_from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("GRPC_FIXTURE_ADDRESS") {
            if let Ok(parsed_addr) = addr.parse() {
                self.server.address = parsed_addr;
            }
        }

        if let Ok(level) = std::env::var("GRPC_FIXTURE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Build the correlator described by the `[[correlation]]` tables.
    pub fn correlator(&self) -> Result<FieldCorrelator> {
        let mut correlator = FieldCorrelator::new();
        for entry in &self.correlation {
            if correlator.has_rule(&entry.method) {
                bail!("Duplicate correlation rule for method {}", entry.method);
            }
            correlator.insert(entry.method.clone(), entry.to_rule()?);
        }
        Ok(correlator)
    }
}
