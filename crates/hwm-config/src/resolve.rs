//! Configuration directory resolution.
//!
//! Resolution order: CLI argument → environment variable → XDG path → system path.

use std::path::{Path, PathBuf};

/// Where the configuration directory came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Fallback /etc/hwmatch/.
    #[default]
    SystemConfig,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
        }
    }
}

/// A resolved configuration directory with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDir {
    pub path: PathBuf,
    pub source: ConfigSource,
}

/// Environment variable naming the configuration directory.
pub const ENV_CONFIG_DIR: &str = "HWM_CONFIG_DIR";

/// Application name for XDG and system directories.
const APP_NAME: &str = "hwmatch";

/// Resolve the directory holding `state`, `lock`, `*.specs` and `*.cmdb`.
///
/// 1. Explicit CLI path
/// 2. `HWM_CONFIG_DIR`
/// 3. XDG config directory (~/.config/hwmatch/) when it exists
/// 4. System config (/etc/hwmatch/)
pub fn resolve_config_dir(cli_dir: Option<&Path>) -> ConfigDir {
    resolve_with_env(cli_dir, std::env::var(ENV_CONFIG_DIR).ok())
}

fn resolve_with_env(cli_dir: Option<&Path>, env_dir: Option<String>) -> ConfigDir {
    if let Some(path) = cli_dir {
        return ConfigDir {
            path: path.to_path_buf(),
            source: ConfigSource::CliArgument,
        };
    }

    if let Some(dir) = env_dir.filter(|d| !d.is_empty()) {
        return ConfigDir {
            path: PathBuf::from(dir),
            source: ConfigSource::Environment,
        };
    }

    if let Some(xdg) = xdg_config_dir() {
        if xdg.is_dir() {
            return ConfigDir {
                path: xdg,
                source: ConfigSource::XdgConfig,
            };
        }
    }

    ConfigDir {
        path: system_config_dir(),
        source: ConfigSource::SystemConfig,
    }
}

/// Get the XDG config directory for hwmatch.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

/// List the profile names that have a `.specs` file in `dir`, sorted.
pub fn list_spec_profiles(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();

    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "specs") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
    }

    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(format!("{}", ConfigSource::XdgConfig), "XDG config");
        assert_eq!(format!("{}", ConfigSource::SystemConfig), "system config");
    }

    #[test]
    fn cli_wins_over_env() {
        let dir = resolve_with_env(Some(Path::new("/srv/hw")), Some("/tmp/env".into()));
        assert_eq!(dir.path, PathBuf::from("/srv/hw"));
        assert_eq!(dir.source, ConfigSource::CliArgument);
    }

    #[test]
    fn env_used_without_cli() {
        let dir = resolve_with_env(None, Some("/tmp/env".into()));
        assert_eq!(dir.path, PathBuf::from("/tmp/env"));
        assert_eq!(dir.source, ConfigSource::Environment);
    }

    #[test]
    fn empty_env_is_ignored() {
        let dir = resolve_with_env(None, Some(String::new()));
        assert_ne!(dir.source, ConfigSource::Environment);
    }

    #[test]
    fn test_system_config_dir() {
        assert_eq!(system_config_dir(), PathBuf::from("/etc/hwmatch"));
    }

    #[test]
    fn lists_spec_profiles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hw2.specs"), "[]").unwrap();
        std::fs::write(dir.path().join("hw1.specs"), "[]").unwrap();
        std::fs::write(dir.path().join("hw1.cmdb"), "[]").unwrap();
        assert_eq!(list_spec_profiles(dir.path()), vec!["hw1", "hw2"]);
    }
}
