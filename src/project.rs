//! Registry and dependency engine bundled for embedding

use std::path::Path;

use anyhow::Context;
use arbor_graph::DependencyEngine;
use arbor_model::{Generation, ModelError, ProjectSnapshot, Registry, RegistryConfig};
use tracing::{debug, info, warn};

/// One project: the versioned model plus the graph engine listening to it.
#[derive(Debug)]
pub struct Project {
    registry: Registry,
    graph: DependencyEngine,
}

impl Project {
    pub fn new(config: RegistryConfig) -> Self {
        info!("Opening project '{}'", config.project_name);
        let registry = Registry::new(config);
        let graph = DependencyEngine::new(registry.clone());
        Project { registry, graph }
    }

    /// Load a TOML [`RegistryConfig`] and open an empty project with it.
    pub fn from_config_file(path: &Path) -> anyhow::Result<Self> {
        let config = RegistryConfig::load(path)
            .with_context(|| format!("Failed to load project config from {}", path.display()))?;
        Ok(Self::new(config))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn graph(&self) -> &DependencyEngine {
        &self.graph
    }

    pub fn open(&self) -> ProjectSnapshot {
        self.registry.open()
    }

    /// Apply `edit` to a fresh snapshot and commit it. A commit rejected with
    /// `StaleBase` is retried on a new snapshot, up to `attempts` times in
    /// total. Other errors are returned at once.
    pub fn commit_with_retry<F>(&self, attempts: usize, mut edit: F) -> Result<Generation, ModelError>
    where
        F: FnMut(&mut ProjectSnapshot) -> Result<(), ModelError>,
    {
        let mut attempt = 1;
        loop {
            let mut snapshot = self.registry.open();
            edit(&mut snapshot)?;
            match snapshot.commit() {
                Ok(generation) => {
                    debug!("Committed {} after {} attempt(s)", generation, attempt);
                    return Ok(generation);
                }
                Err(err) if err.is_stale_base() && attempt < attempts => {
                    warn!("Retrying commit: {}", err);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
