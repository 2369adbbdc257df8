//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::PathBuf;

use crate::core::Project;

/// Convive configuration with layered hierarchy
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default tenant (school) for commands that omit --colegio
    pub default_tenant: Option<String>,

    /// Default responsible person for new stage followups
    pub responsible: Option<String>,

    /// Default output format
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/convive/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Ok(contents) = std::fs::read_to_string(&global_path) {
                    if let Ok(global) = serde_yml::from_str::<Config>(&contents) {
                        config.merge(global);
                    }
                }
            }
        }

        // 3. Workspace config (.convive/config.yaml)
        if let Ok(project) = Project::discover() {
            let project_config_path = project.convive_dir().join("config.yaml");
            if project_config_path.exists() {
                if let Ok(contents) = std::fs::read_to_string(&project_config_path) {
                    if let Ok(project_config) = serde_yml::from_str::<Config>(&contents) {
                        config.merge(project_config);
                    }
                }
            }
        }

        // 4. Environment variables
        if let Ok(tenant) = std::env::var("CONVIVE_TENANT") {
            config.default_tenant = Some(tenant);
        }
        if let Ok(responsible) = std::env::var("CONVIVE_RESPONSIBLE") {
            config.responsible = Some(responsible);
        }

        config
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "convive")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.default_tenant.is_some() {
            self.default_tenant = other.default_tenant;
        }
        if other.responsible.is_some() {
            self.responsible = other.responsible;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
    }

    /// Get the responsible person, falling back to the OS username
    pub fn responsible(&self) -> String {
        if let Some(ref responsible) = self.responsible {
            return responsible.clone();
        }

        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "desconocido".to_string())
    }
}
