//! Project discovery and initialization
//!
//! A project is a directory holding `.olt/config.yaml`; its collection files
//! live under the configured data directory.

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::config::{Config, ConfigLayer};
use crate::store::{DataFormat, FileStore, RecordKind};
use crate::yaml::YamlError;

/// Marker directory of a project root
pub const PROJECT_DIR: &str = ".olt";

/// Project config file inside [`PROJECT_DIR`]
pub const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Error, Diagnostic)]
pub enum ProjectError {
    #[error("Not inside an olt project (searched from {})", .start.display())]
    #[diagnostic(
        code(olt::project::not_found),
        help("Run `olt init` to create a project in the current directory")
    )]
    NotFound { start: PathBuf },

    #[error("A project already exists at {}", .root.display())]
    #[diagnostic(code(olt::project::exists))]
    AlreadyExists { root: PathBuf },

    #[error("IO error on {}: {source}", .path.display())]
    #[diagnostic(code(olt::project::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration")]
    #[diagnostic(code(olt::project::config))]
    Config(#[from] YamlError),
}

#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Find the project containing the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let cwd = std::env::current_dir().map_err(|source| ProjectError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        Self::discover_from(&cwd)
    }

    /// Walk up from `start` to the first directory holding `.olt/`
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let root = start
            .ancestors()
            .find(|dir| dir.join(PROJECT_DIR).is_dir())
            .ok_or_else(|| ProjectError::NotFound {
                start: start.to_path_buf(),
            })?;
        Self::open(root)
    }

    /// Open a project root and load its layered config
    pub fn open(root: &Path) -> Result<Self, ProjectError> {
        let config_path = root.join(PROJECT_DIR).join(CONFIG_FILE);
        let config = Config::load(Some(&config_path))?;
        tracing::debug!(root = %root.display(), data_dir = %config.data_dir.display(), "opened project");
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    /// Create a project with an empty collection file per record kind
    pub fn init(root: &Path, layer: ConfigLayer) -> Result<Self, ProjectError> {
        let project_dir = root.join(PROJECT_DIR);
        if project_dir.exists() {
            return Err(ProjectError::AlreadyExists {
                root: root.to_path_buf(),
            });
        }
        create_dir(&project_dir)?;

        let rendered = serde_yml::to_string(&layer).map_err(|e| ProjectError::Io {
            path: project_dir.join(CONFIG_FILE),
            source: std::io::Error::other(e.to_string()),
        })?;
        write_file(&project_dir.join(CONFIG_FILE), &rendered)?;

        let project = Self::open(root)?;
        let data_dir = project.data_dir();
        create_dir(&data_dir)?;
        let store = project.store();
        for kind in RecordKind::ALL {
            let path = store.path_for(kind);
            if !path.exists() {
                write_file(&path, "[]\n")?;
            }
        }
        tracing::info!(root = %root.display(), "initialized project");
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(PROJECT_DIR).join(CONFIG_FILE)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(&self.config.data_dir)
    }

    pub fn format(&self) -> DataFormat {
        self.config.format
    }

    pub fn store(&self) -> FileStore {
        FileStore::new(self.data_dir(), self.config.format)
    }
}

fn create_dir(path: &Path) -> Result<(), ProjectError> {
    std::fs::create_dir_all(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, content: &str) -> Result<(), ProjectError> {
    std::fs::write(path, content).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStore;
    use crate::entities::StageRecord;
    use tempfile::tempdir;

    #[test]
    fn test_init_then_discover_from_subdirectory() {
        let dir = tempdir().unwrap();
        let layer = ConfigLayer {
            format: Some(DataFormat::Json),
            default_division: Some("D1".into()),
            ..Default::default()
        };
        Project::init(dir.path(), layer).unwrap();

        let nested = dir.path().join("reports").join("2026");
        std::fs::create_dir_all(&nested).unwrap();
        let project = Project::discover_from(&nested).unwrap();
        assert_eq!(project.root(), dir.path());
        assert_eq!(project.format(), DataFormat::Json);
        assert_eq!(project.config().default_division.as_deref(), Some("D1"));
        assert!(project.data_dir().join("stages.json").exists());

        let stages: Vec<StageRecord> = project.store().get_all().unwrap();
        assert!(stages.is_empty());
    }

    #[test]
    fn test_init_twice_fails() {
        let dir = tempdir().unwrap();
        Project::init(dir.path(), ConfigLayer::default()).unwrap();
        let err = Project::init(dir.path(), ConfigLayer::default()).unwrap_err();
        assert!(matches!(err, ProjectError::AlreadyExists { .. }));
    }

    #[test]
    fn test_discover_outside_project() {
        let dir = tempdir().unwrap();
        let err = Project::discover_from(dir.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
    }
}
