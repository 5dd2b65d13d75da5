//! Gateway configuration loaded from YAML.
//!
//! ```yaml
//! family: core
//! channel:
//!   tcp: "10.0.0.5:8000"
//! transport:
//!   timeout_ms: 5000
//!   retries: 3
//! memory:
//!   read_chunk: 32
//!   write_boundary: 128
//! extensions:
//!   path: /var/lib/master/extensions.json
//! ```
//!
//! Every section except `family` is optional. Missing values take the
//! defaults of the family.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use master_link::{FaultPlan, TransportConfig};
use master_memory::MemoryConfig;
use master_protocol::HardwareFamily;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid YAML for this layout.
    #[error("cannot parse {path}: {source}")]
    Parse {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: serde_yaml::Error,
    },

    /// A value is out of its domain.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// How to reach the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelConfig {
    /// A TCP serial bridge, `host:port`.
    Tcp(String),
    /// A serial device node.
    Device(PathBuf),
    /// An in-process simulated master.
    Simulated(FaultPlan),
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig::Simulated(FaultPlan::default())
    }
}

/// Transport overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// Attempt deadline in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Extra attempts after the first.
    pub retries: Option<u32>,
}

impl TransportSection {
    /// Transport settings for a family with these overrides applied.
    pub fn resolve(&self, family: HardwareFamily) -> TransportConfig {
        let mut config = TransportConfig::for_family(family);
        if let Some(ms) = self.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Some(retries) = self.retries {
            config = config.with_retries(retries);
        }
        config
    }
}

/// Memory access overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// Bytes per core memory read.
    pub read_chunk: Option<usize>,
    /// Largest core memory write.
    pub max_write_length: Option<usize>,
    /// Core writes never cross a multiple of this offset.
    pub write_boundary: Option<usize>,
    /// Fram cache lifetime in milliseconds, 0 keeps pages forever.
    pub fram_stale_after_ms: Option<u64>,
}

impl MemorySection {
    /// Memory settings with these overrides applied.
    pub fn resolve(&self) -> Result<MemoryConfig, ConfigError> {
        let mut config = MemoryConfig::default();
        if let Some(chunk) = self.read_chunk {
            if !(1..=255).contains(&chunk) {
                return Err(ConfigError::Invalid {
                    field: "memory.read_chunk",
                    reason: format!("{} is not within 1..=255", chunk),
                });
            }
            config.read_chunk = chunk;
        }
        if let Some(length) = self.max_write_length {
            if length == 0 {
                return Err(ConfigError::Invalid {
                    field: "memory.max_write_length",
                    reason: "must be positive".into(),
                });
            }
            config.max_write_length = length;
        }
        if let Some(boundary) = self.write_boundary {
            if boundary == 0 {
                return Err(ConfigError::Invalid {
                    field: "memory.write_boundary",
                    reason: "must be positive".into(),
                });
            }
            config.write_boundary = Some(boundary);
        }
        match self.fram_stale_after_ms {
            Some(0) => config.fram_stale_after = None,
            Some(ms) => config.fram_stale_after = Some(Duration::from_millis(ms)),
            None => {}
        }
        Ok(config)
    }
}

/// Extension store location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionSection {
    /// JSON file holding extension values. No store without it.
    pub path: Option<PathBuf>,
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Hardware family of the master.
    pub family: HardwareFamily,
    /// How to reach it.
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Transport overrides.
    #[serde(default)]
    pub transport: TransportSection,
    /// Memory overrides.
    #[serde(default)]
    pub memory: MemorySection,
    /// Extension store.
    #[serde(default)]
    pub extensions: ExtensionSection,
}

impl GatewayConfig {
    /// A simulated master of a family with default settings.
    pub fn simulated(family: HardwareFamily) -> Self {
        GatewayConfig {
            family,
            channel: ChannelConfig::default(),
            transport: TransportSection::default(),
            memory: MemorySection::default(),
            extensions: ExtensionSection::default(),
        }
    }

    /// Load and check a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GatewayConfig = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.memory.resolve()?;
        Ok(config)
    }

    /// Transport settings.
    pub fn transport_config(&self) -> TransportConfig {
        self.transport.resolve(self.family)
    }

    /// Memory settings.
    pub fn memory_config(&self) -> Result<MemoryConfig, ConfigError> {
        self.memory.resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_file() {
        let yaml = r#"
family: core
channel:
  tcp: "10.0.0.5:8000"
transport:
  timeout_ms: 5000
  retries: 3
memory:
  read_chunk: 64
  max_write_length: 256
  write_boundary: null
  fram_stale_after_ms: 1000
extensions:
  path: /var/lib/master/extensions.json
"#;
        let config: GatewayConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(config.family, HardwareFamily::Core);
        assert_eq!(config.channel, ChannelConfig::Tcp("10.0.0.5:8000".into()));

        let transport = config.transport_config();
        assert_eq!(transport.timeout, Duration::from_millis(5000));
        assert_eq!(transport.retries, 3);

        let memory = config.memory_config().expect("memory");
        assert_eq!(memory.read_chunk, 64);
        assert_eq!(memory.write_boundary, None);
        assert_eq!(memory.fram_stale_after, Some(Duration::from_secs(1)));
        assert_eq!(
            config.extensions.path.as_deref(),
            Some(Path::new("/var/lib/master/extensions.json"))
        );
    }

    #[test]
    fn test_minimal_file_uses_family_defaults() {
        let config: GatewayConfig = serde_yaml::from_str("family: classic\n").expect("parse");
        assert_eq!(config, GatewayConfig::simulated(HardwareFamily::Classic));
        assert_eq!(
            config.transport_config(),
            TransportConfig::for_family(HardwareFamily::Classic)
        );
        assert_eq!(config.memory_config().expect("memory"), MemoryConfig::default());
        assert_eq!(config.extensions.path, None);
    }

    #[test]
    fn test_sections_stand_alone() {
        let memory: MemorySection = serde_yaml::from_str("write_boundary: 128").expect("memory");
        assert_eq!(memory.resolve().expect("resolve").write_boundary, Some(128));

        let transport: TransportSection = serde_yaml::from_str("retries: 0").expect("transport");
        assert_eq!(transport.resolve(HardwareFamily::Core).retries, 0);

        let channel: ChannelConfig = serde_yaml::from_str("device: /dev/ttyO5").expect("channel");
        assert_eq!(channel, ChannelConfig::Device(PathBuf::from("/dev/ttyO5")));

        let channel: ChannelConfig = serde_yaml::from_str("simulated:\n  drop_replies: 2").expect("channel");
        match channel {
            ChannelConfig::Simulated(plan) => assert_eq!(plan.drop_replies, 2),
            other => panic!("unexpected channel {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values() {
        let memory = MemorySection {
            read_chunk: Some(0),
            ..MemorySection::default()
        };
        assert!(matches!(
            memory.resolve(),
            Err(ConfigError::Invalid {
                field: "memory.read_chunk",
                ..
            })
        ));
        assert!(serde_yaml::from_str::<GatewayConfig>("family: gold\n").is_err());
        assert!(serde_yaml::from_str::<GatewayConfig>("channel:\n  tcp: x\n").is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let path = std::env::temp_dir().join(format!("master-tool-{}.yaml", std::process::id()));
        fs::write(&path, "family: core\nmemory:\n  read_chunk: 300\n").expect("write");
        assert!(matches!(
            GatewayConfig::load(&path),
            Err(ConfigError::Invalid { .. })
        ));
        fs::write(&path, "family: [core\n").expect("write");
        let err = GatewayConfig::load(&path).expect_err("parse error");
        assert!(err.to_string().contains(&path.display().to_string()));
        let _ = fs::remove_file(&path);

        assert!(matches!(
            GatewayConfig::load("/nonexistent/master.yaml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
