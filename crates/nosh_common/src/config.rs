//! Nosh configuration.
//!
//! Config file: $NOSH_CONFIG, then /etc/nosh/config.toml, then defaults.
//! Nothing here is hardcoded in the daemon: state file location, TTL,
//! trust threshold, sweep cadence, socket path, and analyzer endpoint all
//! come from this file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where pending clarifications live on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON state file, rewritten atomically on every mutation.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("/var/lib/nosh/pending_clarifications.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

/// Clarification lifecycle knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationConfig {
    /// How long a pending clarification stays answerable.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,

    /// Confidence at or above which an analysis is stored without asking.
    #[serde(default = "default_trust_threshold")]
    pub trust_threshold: f64,

    /// Re-enter pending when a merged result is still uncertain
    /// (multi-round clarification). Off by default.
    #[serde(default)]
    pub reclarify: bool,

    /// Cadence of the eager expiry sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_hours() -> i64 {
    24
}

fn default_trust_threshold() -> f64 {
    0.7
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for ClarificationConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            trust_threshold: default_trust_threshold(),
            reclarify: false,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Daemon surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_socket")]
    pub socket: PathBuf,
}

fn default_socket() -> PathBuf {
    PathBuf::from("/run/nosh/nosh.sock")
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket: default_socket(),
        }
    }
}

/// Analyzer endpoint (OpenAI-compatible chat completions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:11434/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Main Nosh configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoshConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub clarification: ClarificationConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

impl NoshConfig {
    /// Load from the first config file found, or fall back to defaults.
    /// A missing file is normal; an unparseable file is an error so typos
    /// do not silently revert the daemon to defaults.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var("NOSH_CONFIG") {
            return Self::load_from(Path::new(&path));
        }

        let system = Path::new("/etc/nosh/config.toml");
        if system.exists() {
            return Self::load_from(system);
        }

        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: NoshConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok(config)
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.clarification.ttl_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NoshConfig::default();
        assert_eq!(config.clarification.ttl_hours, 24);
        assert_eq!(config.clarification.trust_threshold, 0.7);
        assert!(!config.clarification.reclarify);
        assert_eq!(
            config.storage.state_file,
            PathBuf::from("/var/lib/nosh/pending_clarifications.json")
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let original = NoshConfig::default();
        let toml_string = toml::to_string(&original).unwrap();
        let parsed: NoshConfig = toml::from_str(&toml_string).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let toml_string = r#"
[clarification]
ttl_hours = 6

[storage]
state_file = "/tmp/nosh-test/state.json"
"#;
        let config: NoshConfig = toml::from_str(toml_string).unwrap();
        assert_eq!(config.clarification.ttl_hours, 6);
        assert_eq!(config.clarification.trust_threshold, 0.7);
        assert_eq!(
            config.storage.state_file,
            PathBuf::from("/tmp/nosh-test/state.json")
        );
    }

    #[test]
    fn test_load_from_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "clarification = \"not a table\"").unwrap();
        assert!(NoshConfig::load_from(&path).is_err());
    }
}
