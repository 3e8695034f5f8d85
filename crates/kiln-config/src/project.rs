//! Project configuration (`kiln.toml`)

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Search roots used when `packages.search_roots` is not set
pub const DEFAULT_SEARCH_ROOTS: &[&str] = &["apps", "hw", "libs", "targets"];

/// Generated source directory used when `build.generated_dir` is not set
pub const DEFAULT_GENERATED_DIR: &str = "bin/generated";

/// Project configuration from kiln.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectSection>,

    /// Package discovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<PackagesConfig>,

    /// Generated output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct PackagesConfig {
    /// Directories searched for packages, relative to the project root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_roots: Option<Vec<PathBuf>>,

    /// Extra entry names skipped when hashing packages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hash_ignore: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Where generated sources go (default: "bin/generated")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_dir: Option<PathBuf>,
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config = Self::parse(&content).map_err(|e| match e {
            ConfigError::TomlParseError { error, .. } => ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error,
            },
            other => other,
        })?;
        tracing::debug!("Loaded project config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|error| ConfigError::TomlParseError {
            file: PathBuf::from(crate::CONFIG_FILE_NAME),
            error,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(project) = &self.project {
            if project.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "project.name".to_string(),
                    reason: "name cannot be empty".to_string(),
                });
            }
        }

        if let Some(roots) = self.packages.as_ref().and_then(|p| p.search_roots.as_ref()) {
            if roots.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "packages.search_roots".to_string(),
                    reason: "at least one search root is required".to_string(),
                });
            }
            for root in roots {
                validate_relative("packages.search_roots", root)?;
            }
        }

        if let Some(names) = self.packages.as_ref().map(|p| &p.hash_ignore) {
            if names.iter().any(|n| n.is_empty() || n.contains(['/', '\\'])) {
                return Err(ConfigError::InvalidValue {
                    field: "packages.hash_ignore".to_string(),
                    reason: "entries must be plain file or directory names".to_string(),
                });
            }
        }

        if let Some(dir) = self.build.as_ref().and_then(|b| b.generated_dir.as_ref()) {
            validate_relative("build.generated_dir", dir)?;
        }

        Ok(())
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.name.as_str())
    }

    /// Configured search roots, or the defaults
    pub fn search_roots(&self) -> Vec<PathBuf> {
        match self.packages.as_ref().and_then(|p| p.search_roots.as_ref()) {
            Some(roots) => roots.clone(),
            None => DEFAULT_SEARCH_ROOTS.iter().map(PathBuf::from).collect(),
        }
    }

    pub fn hash_ignore(&self) -> &[String] {
        self.packages
            .as_ref()
            .map(|p| p.hash_ignore.as_slice())
            .unwrap_or(&[])
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.build
            .as_ref()
            .and_then(|b| b.generated_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GENERATED_DIR))
    }

    pub fn set_search_roots(&mut self, roots: Vec<PathBuf>) {
        self.packages.get_or_insert_with(Default::default).search_roots = Some(roots);
    }

    pub fn set_generated_dir(&mut self, dir: PathBuf) {
        self.build.get_or_insert_with(Default::default).generated_dir = Some(dir);
    }
}

/// Paths must stay inside the project root
fn validate_relative(field: &str, path: &Path) -> ConfigResult<()> {
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if path.as_os_str().is_empty() || escapes {
        return Err(ConfigError::InvalidPath {
            field: field.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
