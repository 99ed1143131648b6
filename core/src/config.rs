//! Node configuration

use crate::types::NodeId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File inside the data directory holding a generated node id
const NODE_ID_FILE: &str = "node_id";

/// Per-node settings, loadable from JSON; missing keys take defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Stable identity of this device; generated on first start when unset
    pub node_id: Option<NodeId>,

    /// Storage directory
    pub data_dir: PathBuf,

    /// Seconds between background integrity runs
    pub integrity_interval_secs: u64,

    /// More low-severity findings than this lowers the health score to FAIR
    pub low_severity_fair_threshold: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            data_dir: PathBuf::from("./bizsync-data"),
            integrity_interval_secs: 3600,
            low_severity_fair_threshold: 10,
        }
    }
}

impl NodeConfig {
    /// Read a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: NodeConfig = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.integrity_interval_secs == 0 {
            return Err(Error::Config("integrity_interval_secs must be greater than zero".to_string()));
        }
        if let Some(node_id) = &self.node_id {
            if node_id.as_str().trim().is_empty() {
                return Err(Error::Config("node_id must not be empty".to_string()));
            }
        }
        Ok(())
    }

    pub fn integrity_interval(&self) -> Duration {
        Duration::from_secs(self.integrity_interval_secs)
    }

    /// Configured node id, or the one persisted in `data_dir`
    ///
    /// Generates and persists a new id the first time a data directory is
    /// used, so a device keeps its identity across restarts.
    pub fn resolve_node_id(&self) -> Result<NodeId> {
        if let Some(node_id) = &self.node_id {
            return Ok(node_id.clone());
        }

        let path = self.data_dir.join(NODE_ID_FILE);
        if path.exists() {
            let stored = std::fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
            let stored = stored.trim();
            if !stored.is_empty() {
                return Ok(NodeId::new(stored));
            }
        }

        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| Error::Config(format!("Failed to create {}: {}", self.data_dir.display(), e)))?;
        let node_id = NodeId::generate();
        std::fs::write(&path, node_id.as_str())
            .map_err(|e| Error::Config(format!("Failed to write {}: {}", path.display(), e)))?;

        tracing::info!(%node_id, "Generated node id");
        Ok(node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_json_takes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bizsync.json");
        std::fs::write(&path, r#"{ "node_id": "till-1", "integrity_interval_secs": 60 }"#).unwrap();

        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.node_id, Some(NodeId::from("till-1")));
        assert_eq!(config.integrity_interval(), Duration::from_secs(60));
        assert_eq!(config.low_severity_fair_threshold, NodeConfig::default().low_severity_fair_threshold);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bizsync.json");
        std::fs::write(&path, r#"{ "integrity_interval_secs": 0 }"#).unwrap();

        assert!(matches!(NodeConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_generated_node_id_is_persisted() {
        let dir = TempDir::new().unwrap();
        let config = NodeConfig {
            data_dir: dir.path().join("data"),
            ..Default::default()
        };

        let first = config.resolve_node_id().unwrap();
        let second = config.resolve_node_id().unwrap();
        assert_eq!(first, second);
    }
}
