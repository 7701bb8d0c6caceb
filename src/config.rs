//! Configuration loading and database path resolution

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Error, Result};
use crate::state::library::Library;
use crate::state::namespace::DEFAULT_USERS;

/// Environment variable naming the database file
pub const DB_ENV_VAR: &str = "URBAN_AUDIT_DB";

/// Settings read from `config.toml`; every field is optional
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding `urban_audit.db`
    pub data_dir: Option<PathBuf>,
    /// Users a fresh store starts with
    pub default_users: Option<Vec<String>>,
    /// `tracing` filter directive, e.g. `urban_audit=debug`
    pub log_level: Option<String>,
    /// Where exports are written when no directory is given
    pub export_dir: Option<PathBuf>,
}

impl Config {
    /// Load from the platform config location.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load() -> Result<Self> {
        match config_file_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Config::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Configured default users, falling back to the built-in list.
    /// Blank names are ignored.
    pub fn default_users(&self) -> Vec<String> {
        let configured: Vec<String> = self
            .default_users
            .iter()
            .flatten()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        if configured.is_empty() {
            DEFAULT_USERS.iter().map(|name| name.to_string()).collect()
        } else {
            configured
        }
    }

    /// Database location, in priority order:
    /// 1. Command-line argument
    /// 2. `URBAN_AUDIT_DB` environment variable
    /// 3. `data_dir` from the config file
    /// 4. OS-dependent default
    pub fn resolve_db_path(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(DB_ENV_VAR) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
            warn!("{} is set but empty, ignoring", DB_ENV_VAR);
        }

        if let Some(dir) = &self.data_dir {
            return dir.join("urban_audit.db");
        }

        Library::default_path()
    }

    /// Export directory: argument, then config, then the current directory
    pub fn resolve_export_dir(&self, cli_arg: Option<&Path>) -> PathBuf {
        cli_arg
            .map(Path::to_path_buf)
            .or_else(|| self.export_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// `<config_dir>/urban-audit/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("urban-audit").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_full_toml() {
        let config = Config::from_toml(
            r#"
            data_dir = "/srv/audit"
            default_users = ["Asha", " ", "Ravi"]
            log_level = "urban_audit=debug"
            export_dir = "/tmp/exports"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_users(), vec!["Asha", "Ravi"]);
        assert_eq!(config.log_level.as_deref(), Some("urban_audit=debug"));
        assert_eq!(
            config.resolve_export_dir(None),
            PathBuf::from("/tmp/exports")
        );
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        assert!(matches!(
            Config::from_toml("data_dir = [1,"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_default_users_fallback() {
        assert_eq!(Config::default().default_users(), vec!["Manthan", "Vihan", "Nemi"]);
    }

    #[test]
    fn test_cli_arg_wins() {
        let config = Config {
            data_dir: Some(PathBuf::from("/srv/audit")),
            ..Config::default()
        };
        let cli = PathBuf::from("/tmp/cli.db");
        assert_eq!(config.resolve_db_path(Some(&cli)), cli);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_users = [\"Nemi\"]\n").unwrap();
        assert_eq!(Config::from_file(&path).unwrap().default_users(), vec!["Nemi"]);
    }
}
