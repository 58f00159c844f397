//! `weave.toml` configuration.
//!
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use engine::Options;
use engine::artifact::DEFAULT_ARTIFACT_PREFIX;
use engine::assembler::{DEFAULT_ARTIFACT_DIR, DEFAULT_OUTPUT_LANGUAGE};
use serde::Deserialize;
use weave::{DEFAULT_MAX_INCLUDE_DEPTH, Modifier, ModifierRegistry};

/// Looked up next to the input file when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "weave.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("modifier alias `{alias}` targets unknown modifier `{target}`")]
    UnknownAliasTarget { alias: String, target: String },
    #[error("unsupported language `{0}` (only `calc` can be executed)")]
    UnsupportedLanguage(String),
}

/// Top-level config, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub expand: ExpandConfig,

    #[serde(default)]
    pub modifiers: ModifiersConfig,
}

/// `[expand]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpandConfig {
    /// Fence language that is executed.
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,

    /// Artifact directory, relative to the output document.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,

    /// Info string of fences wrapping captured output.
    #[serde(default = "default_output_language")]
    pub output_language: String,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            max_include_depth: default_max_include_depth(),
            artifact_dir: default_artifact_dir(),
            artifact_prefix: default_artifact_prefix(),
            output_language: default_output_language(),
        }
    }
}

fn default_language() -> String {
    engine::CalcExecutor::LANGUAGE.into()
}
fn default_max_include_depth() -> usize {
    DEFAULT_MAX_INCLUDE_DEPTH
}
fn default_artifact_dir() -> String {
    DEFAULT_ARTIFACT_DIR.into()
}
fn default_artifact_prefix() -> String {
    DEFAULT_ARTIFACT_PREFIX.into()
}
fn default_output_language() -> String {
    DEFAULT_OUTPUT_LANGUAGE.into()
}

/// `[modifiers]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModifiersConfig {
    /// Extra spellings for built-in modifiers, e.g. `"echo-false" = "output-only"`.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl Config {
    pub fn registry(&self) -> Result<ModifierRegistry, ConfigError> {
        let mut registry = ModifierRegistry::new();
        for (alias, target) in &self.modifiers.aliases {
            let modifier =
                Modifier::from_token(target).ok_or_else(|| ConfigError::UnknownAliasTarget {
                    alias: alias.clone(),
                    target: target.clone(),
                })?;
            registry.alias(alias.clone(), modifier);
        }
        Ok(registry)
    }

    pub fn options(&self) -> Result<Options, ConfigError> {
        Ok(Options {
            max_include_depth: self.expand.max_include_depth,
            artifact_dir: self.expand.artifact_dir.clone(),
            artifact_prefix: self.expand.artifact_prefix.clone(),
            output_language: self.expand.output_language.clone(),
            registry: self.registry()?,
        })
    }

    /// The executor for the configured language.
    pub fn executor(&self) -> Result<engine::CalcExecutor, ConfigError> {
        if self.expand.language == engine::CalcExecutor::LANGUAGE {
            Ok(engine::CalcExecutor::new())
        } else {
            Err(ConfigError::UnsupportedLanguage(self.expand.language.clone()))
        }
    }
}

/// Load the config for `input`: the explicit path if given, otherwise
/// `weave.toml` next to the input, otherwise defaults.
pub fn load(explicit: Option<&Path>, input: &Path) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        return load_from(path);
    }

    let path = input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(CONFIG_FILE_NAME);
    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(Config::default());
    }
    load_from(&path)
}

/// Load the config from a specific file path.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse(&content).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })?;
    tracing::debug!(?path, "loaded config");
    Ok(config)
}

fn parse(content: &str) -> Result<Config, String> {
    toml::from_str(content).map_err(|e| e.to_string())
}
