// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Engine configuration
//!
//! An explicit value handed to the parser and executor. It is read from a
//! TOML or YAML file and never written back.
//!
//! ```toml
//! max_parallel = 4
//! timeout_seconds = 120
//! plugin_prefix = "convpipe-"
//!
//! [default_options]
//! quality = "85"
//!
//! [[plugin_options]]
//! name = "model"
//! targets = ["faces"]
//! required = true
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::errors::{ConvpipeError, ConvpipeResult};
use crate::executors::PluginOptionDef;
use crate::pipeline::Options;

/// Executable prefix for plugins
pub const DEFAULT_PLUGIN_PREFIX: &str = "convpipe-";

/// File name looked up in the user's config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Options merged into every element; element options win
    pub default_options: Options,
    /// Upper bound on concurrently running nodes (0 = available parallelism)
    pub max_parallel: usize,
    /// Per plugin invocation (0 = no limit)
    pub timeout_seconds: u64,
    /// Root for per-node work directories
    pub temp_dir: Option<PathBuf>,
    /// Prefix of plugin executables
    pub plugin_prefix: String,
    /// Options plugins declare; required ones are checked before a plugin runs
    pub plugin_options: Vec<PluginOptionDef>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_options: Options::new(),
            max_parallel: 0,
            timeout_seconds: 0,
            temp_dir: None,
            plugin_prefix: DEFAULT_PLUGIN_PREFIX.to_string(),
            plugin_options: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load from a file; `.yaml`/`.yml` is YAML, anything else TOML
    pub fn from_file(path: &Path) -> ConvpipeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConvpipeError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let is_yaml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        let config = if is_yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_toml(&content)
        };

        let config = config.map_err(|e| ConvpipeError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> ConvpipeResult<Self> {
        toml::from_str(content).map_err(Into::into)
    }

    pub fn from_yaml(content: &str) -> ConvpipeResult<Self> {
        // An empty YAML document means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(Into::into)
    }

    /// `config.toml` in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "convpipe").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load `path` if given, else the default file if it exists, else defaults
    pub fn load(path: Option<&Path>) -> ConvpipeResult<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Add or replace default options
    pub fn set_defaults<I, K, V>(&mut self, options: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in options {
            self.default_options.insert(name.into(), value.into());
        }
    }

    /// Plugin time limit, if any
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.plugin_prefix, "convpipe-");
        assert_eq!(config.max_parallel, 0);
        assert!(config.timeout().is_none());
        assert!(config.default_options.is_empty());
    }

    #[test]
    fn test_from_toml() {
        let config = EngineConfig::from_toml(
            r#"
max_parallel = 2
timeout_seconds = 30

[default_options]
quality = "85"
"#,
        )
        .unwrap();

        assert_eq!(config.max_parallel, 2);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.default_options.get("quality").map(String::as_str), Some("85"));
        assert_eq!(config.plugin_prefix, DEFAULT_PLUGIN_PREFIX);
    }

    #[test]
    fn test_plugin_options_from_toml() {
        let config = EngineConfig::from_toml(
            r#"
[[plugin_options]]
name = "--model"
targets = ["faces"]
required = true

[[plugin_options]]
name = "quality"
type = "int"
default = "85"
"#,
        )
        .unwrap();

        assert_eq!(config.plugin_options.len(), 2);
        assert_eq!(config.plugin_options[0].key(), "model");
        assert!(config.plugin_options[0].required);
        assert_eq!(config.plugin_options[1].kind, "int");
        assert_eq!(config.plugin_options[1].default.as_deref(), Some("85"));
    }

    #[test]
    fn test_from_file_by_extension() {
        let tmp = TempDir::new().unwrap();

        let yaml = tmp.path().join("engine.yaml");
        std::fs::write(&yaml, "plugin_prefix: uc-\ntemp_dir: /tmp/work\n").unwrap();
        let config = EngineConfig::from_file(&yaml).unwrap();
        assert_eq!(config.plugin_prefix, "uc-");
        assert_eq!(config.temp_dir, Some(PathBuf::from("/tmp/work")));

        let toml = tmp.path().join("engine.toml");
        std::fs::write(&toml, "max_parallel = 3\n").unwrap();
        assert_eq!(EngineConfig::from_file(&toml).unwrap().max_parallel, 3);
    }

    #[test]
    fn test_invalid_file_names_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "max_parallel = \"many\"\n").unwrap();

        let err = EngineConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConvpipeError::ConfigError { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_file(Path::new("/nonexistent/convpipe.toml")).unwrap_err();
        assert!(matches!(err, ConvpipeError::FileReadError { .. }));
    }

    #[test]
    fn test_set_defaults() {
        let mut config = EngineConfig::default();
        config.set_defaults([("quality", "90"), ("strip", "true")]);
        config.set_defaults([("quality", "70")]);
        assert_eq!(config.default_options.len(), 2);
        assert_eq!(config.default_options["quality"], "70");
    }
}
