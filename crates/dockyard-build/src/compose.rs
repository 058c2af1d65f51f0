use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dockyard_core::ServiceSpec;
use serde::{Deserialize, Serialize};

/// The `docker-compose.yml` document.
///
/// Always derived from the full service list; there is no way to patch an
/// existing manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeManifest {
    pub version: String,
    pub services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeService {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl ComposeManifest {
    pub fn from_services(version: &str, services: &[ServiceSpec]) -> Self {
        let services = services
            .iter()
            .map(|svc| {
                let entry = ComposeService {
                    image: svc.image.clone(),
                    ports: svc.port_mapping().into_iter().collect(),
                    depends_on: svc.depends_on.clone(),
                    environment: svc.environment.clone(),
                };
                (svc.name.clone(), entry)
            })
            .collect();

        Self {
            version: version.to_owned(),
            services,
        }
    }

    pub fn render(&self) -> Result<String, ComposeError> {
        serde_yaml::to_string(self).map_err(|e| ComposeError::Serialize { source: e })
    }

    /// Serialize to `path`, replacing whatever was there.
    pub fn write(&self, path: &Path) -> Result<(), ComposeError> {
        let content = self.render()?;
        std::fs::write(path, content).map_err(|e| ComposeError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ComposeError> {
        let content = std::fs::read_to_string(path).map_err(|e| ComposeError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_yaml::from_str(&content).map_err(|e| ComposeError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("failed to serialize compose manifest")]
    Serialize { source: serde_yaml::Error },
    #[error("failed to write compose manifest at {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read compose manifest at {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse compose manifest at {path}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}
