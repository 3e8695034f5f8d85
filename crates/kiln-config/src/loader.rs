//! Configuration Loader
//!
//! Finds the project root, loads `kiln.toml` and applies environment
//! overrides.

use crate::project::ProjectConfig;
use crate::{ConfigError, ConfigResult, CONFIG_FILE_NAME};
use std::env;
use std::path::{Path, PathBuf};

/// Overrides `build.generated_dir`
pub const ENV_GENERATED_DIR: &str = "KILN_GENERATED_DIR";

/// Overrides `packages.search_roots`; colon separated
pub const ENV_SEARCH_ROOTS: &str = "KILN_SEARCH_ROOTS";

/// Configuration loader
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip `KILN_*` overrides
    ignore_env: bool,
}

/// Loaded configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Project root directory (where kiln.toml was found)
    pub project_root: Option<PathBuf>,

    /// Directory relative paths resolve against when there is no project
    pub working_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore environment overrides
    pub fn without_env(mut self) -> Self {
        self.ignore_env = true;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find kiln.toml. Without one, the
    /// defaults apply relative to `start_dir`.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project) = self.find_project_config(start_dir)?;
        let project = self.apply_env_overrides(project)?;

        Ok(Config {
            project,
            project_root,
            working_dir: start_dir.to_path_buf(),
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let project = ProjectConfig::load_from_file(config_path)?;
        let project = self.apply_env_overrides(project)?;
        let project_root = config_path.parent().map(Path::to_path_buf);

        Ok(Config {
            project,
            working_dir: project_root.clone().unwrap_or_default(),
            project_root,
        })
    }

    fn find_project_config(&self, start_dir: &Path) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.is_file() {
                let project = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(dir.to_path_buf()), project));
            }
            current = dir.parent();
        }

        tracing::debug!(
            "No {} found above {}; using defaults",
            CONFIG_FILE_NAME,
            start_dir.display()
        );
        Ok((None, ProjectConfig::default()))
    }

    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if self.ignore_env {
            return Ok(config);
        }

        if let Ok(dir) = env::var(ENV_GENERATED_DIR) {
            config.set_generated_dir(PathBuf::from(dir));
        }

        if let Ok(roots) = env::var(ENV_SEARCH_ROOTS) {
            let roots: Vec<PathBuf> = roots
                .split(':')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(PathBuf::from)
                .collect();
            config.set_search_roots(roots);
        }

        config.validate().map_err(|e| match e {
            ConfigError::InvalidValue { field, reason } => ConfigError::InvalidValue {
                field,
                reason: format!("{} (after applying KILN_* environment overrides)", reason),
            },
            other => other,
        })?;
        Ok(config)
    }
}

impl Config {
    /// Defaults rooted at `dir`, ignoring any kiln.toml
    pub fn with_defaults(dir: impl Into<PathBuf>) -> Self {
        Self {
            project: ProjectConfig::default(),
            project_root: None,
            working_dir: dir.into(),
        }
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has kiln.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project.project_name()
    }

    /// Directory every configured path is relative to
    pub fn base_dir(&self) -> &Path {
        self.project_root.as_deref().unwrap_or(&self.working_dir)
    }

    /// Search roots resolved against the base directory
    pub fn search_root_paths(&self) -> Vec<PathBuf> {
        let base = self.base_dir();
        self.project
            .search_roots()
            .iter()
            .map(|root| base.join(root))
            .collect()
    }

    /// Generated source directory resolved against the base directory
    pub fn generated_dir_path(&self) -> PathBuf {
        self.base_dir().join(self.project.generated_dir())
    }

    pub fn hash_ignore(&self) -> &[String] {
        self.project.hash_ignore()
    }
}
