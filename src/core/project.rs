//! Project discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Represents a Convive workspace
#[derive(Debug)]
pub struct Project {
    /// Root directory of the workspace (parent of .convive/)
    root: PathBuf,
}

impl Project {
    /// Find the workspace root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current = std::env::current_dir().map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find the workspace root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            let convive_dir = current.join(".convive");
            if convive_dir.is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create a new workspace structure at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let convive_dir = root.join(".convive");
        if convive_dir.exists() {
            return Err(ProjectError::AlreadyExists(root.clone()));
        }

        std::fs::create_dir_all(&convive_dir)
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        let config_path = convive_dir.join("config.yaml");
        std::fs::write(&config_path, Self::default_config())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        Ok(Self { root })
    }

    fn default_config() -> &'static str {
        r#"# Configuración del espacio de trabajo Convive

# Colegio (tenant) por defecto para los comandos que no reciben --colegio
# default_tenant: ""

# Responsable por defecto para nuevas etapas
# responsible: ""

# Formato de salida por defecto (auto, yaml, json, csv, id)
# default_format: auto
"#
    }

    /// Get the workspace root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .convive configuration directory
    pub fn convive_dir(&self) -> PathBuf {
        self.root.join(".convive")
    }

    /// Get the path of the case store database
    pub fn store_path(&self) -> PathBuf {
        self.convive_dir().join("convive.db")
    }
}

/// Errors that can occur during workspace operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("no es un espacio Convive (buscado desde {searched_from:?}). Ejecute 'convive init' para crear uno.")]
    NotFound { searched_from: PathBuf },

    #[error("ya existe un espacio Convive en {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}
