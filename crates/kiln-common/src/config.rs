//! Project configuration model.
//!
//! Loaded from `kiln.yaml` next to the project sources. Every field has a
//! default, so an absent file or a partial file is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{KilnError, Result};

/// Root configuration for a kiln project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    /// Entry script unit.
    pub entry_script: String,
    /// Entry stylesheet unit.
    pub entry_style: String,
    /// Bare specifiers provided by the render host; never rewritten.
    pub externals: Vec<String>,
    /// Base URL of the CDN used by the built-in resolver.
    pub cdn_base: String,
    /// Options handed to the script-transform capability.
    pub target: TargetOptions,
    /// Custom property scoping.
    pub scope: ScopeOptions,
    /// Stylesheet resolution.
    pub style: StyleOptions,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            entry_script: constants::DEFAULT_ENTRY_SCRIPT.to_owned(),
            entry_style: constants::DEFAULT_ENTRY_STYLE.to_owned(),
            externals: constants::DEFAULT_EXTERNALS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            cdn_base: constants::DEFAULT_CDN_BASE.to_owned(),
            target: TargetOptions::default(),
            scope: ScopeOptions::default(),
            style: StyleOptions::default(),
        }
    }
}

/// Options for turning a parsed unit into executable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetOptions {
    /// Language level of the emitted code.
    pub target: String,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            target: "esnext".to_owned(),
        }
    }
}

/// Options for the custom property scoping pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeOptions {
    /// Rewrite `:root` to `:host` so root-level rules apply inside a shadow tree.
    pub replace_root: bool,
    /// Register scoped properties with the host registry.
    pub register: bool,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            replace_root: true,
            register: true,
        }
    }
}

/// Options for stylesheet resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleOptions {
    /// `@import` directive prepended when the source has none, e.g. a utility framework.
    pub implicit_import: Option<String>,
}

impl KilnConfig {
    /// Parses a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or a value is invalid.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `kiln.yaml` from `project_dir`, falling back to defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(constants::CONFIG_FILE);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        tracing::info!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(&path).map_err(|e| KilnError::Io {
            path: path.clone(),
            source: e,
        })?;
        Self::from_yaml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if !constants::is_script(&self.entry_script) {
            return Err(KilnError::Config {
                message: format!("entry_script \"{}\" is not a script file", self.entry_script),
            });
        }
        if !constants::is_style(&self.entry_style) {
            return Err(KilnError::Config {
                message: format!("entry_style \"{}\" is not a stylesheet", self.entry_style),
            });
        }
        Ok(())
    }
}
