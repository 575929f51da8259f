//! Configuration for snapshelf paths and fetching.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SNAPSHELF_HOME, SNAPSHELF_LIBRARY)
//! 2. Config file (.snapshelf/config.yaml)
//! 3. Defaults (~/.snapshelf)
//!
//! Config file discovery:
//! - Searches current directory and parents for .snapshelf/config.yaml
//! - Paths in config file are relative to the config file's parent directory
//!
//! Resolution is an explicit call; nothing is cached in process globals,
//! so independent sessions and tests can resolve against different
//! environments.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::import::FetchOptions;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub fetch: Option<FetchConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to config file)
    pub home: Option<String>,
    /// Library directory (relative to config file)
    pub library: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    pub timeout_seconds: Option<u64>,
    pub max_redirects: Option<usize>,
    pub user_agent: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to snapshelf home
    pub home: PathBuf,
    /// Absolute path to the library root
    pub library: PathBuf,
    /// Import fetch settings
    pub fetch: FetchOptions,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".snapshelf").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge the optional fetch section over the built-in defaults
fn resolve_fetch(section: Option<FetchConfig>) -> FetchOptions {
    let mut fetch = FetchOptions::default();
    if let Some(section) = section {
        if let Some(seconds) = section.timeout_seconds {
            fetch.timeout = Duration::from_secs(seconds);
        }
        if let Some(max) = section.max_redirects {
            fetch.max_redirects = max;
        }
        if let Some(user_agent) = section.user_agent {
            fetch.user_agent = user_agent;
        }
    }
    fetch
}

/// Load configuration from all sources
pub fn resolve() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".snapshelf");

    // Check for config file
    let config_file = find_config_file();

    let (home, library, fetch) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        // Base directory is the parent of .snapshelf/ (the project root)
        let base_dir = config_path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."));

        let home = if let Ok(env_home) = std::env::var("SNAPSHELF_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            // home is relative to the .snapshelf/ directory
            let snapshelf_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(snapshelf_dir, home_path)
        } else {
            default_home.clone()
        };

        let library = if let Ok(env_lib) = std::env::var("SNAPSHELF_LIBRARY") {
            PathBuf::from(env_lib)
        } else if let Some(ref lib_path) = config.paths.library {
            resolve_path(base_dir, lib_path)
        } else {
            home.join("library")
        };

        (home, library, resolve_fetch(config.fetch))
    } else {
        // No config file - use env vars or defaults
        let home = std::env::var("SNAPSHELF_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home.clone());

        let library = std::env::var("SNAPSHELF_LIBRARY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join("library"));

        (home, library, resolve_fetch(None))
    };

    Ok(ResolvedConfig {
        home,
        library,
        fetch,
        config_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let snapshelf_dir = temp.path().join(".snapshelf");
        std::fs::create_dir_all(&snapshelf_dir).unwrap();

        let config_path = snapshelf_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./
  library: ../library
fetch:
  timeout_seconds: 5
  max_redirects: 3
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.home, Some("./".to_string()));
        assert_eq!(config.paths.library, Some("../library".to_string()));

        let fetch = resolve_fetch(config.fetch);
        assert_eq!(fetch.timeout, Duration::from_secs(5));
        assert_eq!(fetch.max_redirects, 3);
    }

    #[test]
    fn test_fetch_defaults() {
        let fetch = resolve_fetch(None);
        assert_eq!(fetch.timeout, Duration::from_secs(30));
        assert_eq!(fetch.max_redirects, 10);
        assert!(fetch.user_agent.contains("snapshelf"));
    }

    #[test]
    fn test_fetch_section_overrides_are_partial() {
        let fetch = resolve_fetch(Some(FetchConfig {
            timeout_seconds: Some(5),
            max_redirects: None,
            user_agent: None,
        }));
        assert_eq!(fetch.timeout, Duration::from_secs(5));
        assert_eq!(fetch.max_redirects, 10);
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        // Non-existent relative paths fall back to plain joining
        assert_eq!(
            resolve_path(&base, "subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
    }
}
