//! Deployed layout versions, one entry per cluster.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default state file location: ~/.ecsform/state.yaml
pub fn default_state_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ecsform")
        .join("state.yaml")
}

/// Resolve a user-supplied state path, expanding `~`
pub fn resolve_state_path(path: Option<&str>) -> PathBuf {
    match path {
        Some(path) => PathBuf::from(shellexpand::tilde(path).into_owned()),
        None => default_state_path(),
    }
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to parse state: {0}")]
    ParseError(String),

    #[error("Failed to write state: {0}")]
    WriteError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    /// Resource layout version the cluster was last deployed with
    pub version: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterState>,
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

pub fn parse_state(content: &str) -> Result<StateFile, StateError> {
    if content.trim().is_empty() {
        return Ok(StateFile::default());
    }
    serde_yaml::from_str(content).map_err(|e| StateError::ParseError(e.to_string()))
}

pub fn serialize_state(state: &StateFile) -> Result<String, StateError> {
    serde_yaml::to_string(state).map_err(|e| StateError::WriteError(e.to_string()))
}

impl StateFile {
    pub fn deployed_version(&self, cluster: &str) -> Option<u32> {
        self.clusters.get(cluster).map(|c| c.version)
    }

    /// Record a successful deployment
    pub fn record(&mut self, cluster: &str, version: u32, at: DateTime<Utc>) {
        self.clusters.insert(
            cluster.to_string(),
            ClusterState {
                version,
                updated_at: at,
            },
        );
    }
}

// ============================================================================
// I/O boundary functions
// ============================================================================

/// Load state, treating a missing file as empty
pub fn load_state_from(path: &Path) -> Result<StateFile, StateError> {
    if !path.exists() {
        return Ok(StateFile::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_state(&content)
}

pub fn save_state_to(state: &StateFile, path: &Path) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serialize_state(state)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_empty_state() {
        let state = parse_state("").unwrap();
        assert!(state.clusters.is_empty());
        assert_eq!(state.deployed_version("prod"), None);
    }

    #[test]
    fn test_parse_state() {
        let yaml = r#"
clusters:
  prod:
    version: 1
    updated_at: 2025-03-01T12:00:00Z
"#;
        let state = parse_state(yaml).unwrap();
        assert_eq!(state.deployed_version("prod"), Some(1));
    }

    #[test]
    fn test_record_and_serialize() {
        let mut state = StateFile::default();
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        state.record("prod", 2, at);

        let yaml = serialize_state(&state).unwrap();
        assert!(yaml.contains("prod:"));
        assert!(yaml.contains("version: 2"));
        assert_eq!(parse_state(&yaml).unwrap(), state);
    }

    #[test]
    fn test_load_missing_file() {
        let state = load_state_from(Path::new("/nonexistent/state.yaml")).unwrap();
        assert!(state.clusters.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.yaml");

        let mut state = StateFile::default();
        state.record("staging", 2, Utc::now());
        save_state_to(&state, &path).unwrap();

        let loaded = load_state_from(&path).unwrap();
        assert_eq!(loaded.deployed_version("staging"), Some(2));
    }

    #[test]
    fn test_resolve_state_path() {
        assert_eq!(resolve_state_path(Some("/tmp/s.yaml")), PathBuf::from("/tmp/s.yaml"));
        assert_eq!(resolve_state_path(None), default_state_path());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(parse_state("clusters: [1, 2"), Err(StateError::ParseError(_))));
    }
}
