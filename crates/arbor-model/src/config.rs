//! Registry configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for a [`Registry`](crate::Registry). Every field has a default, so
/// a config file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Display name of the owning project.
    pub project_name: String,
    /// How many commit records the registry keeps.
    pub history_limit: usize,
    /// Log a warning for each order entry left dangling after a commit.
    pub report_dangling_references: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            project_name: "project".to_string(),
            history_limit: 64,
            report_dangling_references: true,
        }
    }
}

impl RegistryConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Read a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!("Registry config loaded from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = RegistryConfig::from_toml_str("history_limit = 3").unwrap();
        assert_eq!(config.history_limit, 3);
        assert_eq!(config.project_name, "project");
        assert!(config.report_dangling_references);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = RegistryConfig::from_toml_str("history_limit = \"many\"").unwrap_err();
        assert!(matches!(err, crate::ModelError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "project_name = \"demo\"\nreport_dangling_references = false").unwrap();

        let config = RegistryConfig::load(file.path()).unwrap();
        assert_eq!(config.project_name, "demo");
        assert!(!config.report_dangling_references);
        assert_eq!(config.history_limit, 64);
    }
}
