//! Site settings
//!
//! A TOML file fixes rendering and emission options for a site, names an
//! extra directory of dialect definitions, and supplies per-dialect default
//! bindings such as the site's account or queue.
//!
//! ```toml
//! [render]
//! mode = "lenient"
//! unbound_optional = "blank"
//!
//! [emit]
//! metadata = true
//!
//! [dialects]
//! dir = "dialects"
//!
//! [defaults.cobalt]
//! account = "Catalysis"
//! queue = "debug-cache-quad"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::emit::Emitter;
use crate::renderer::RenderConfig;
use crate::validate::Bindings;

/// Errors that can occur when loading or parsing settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse settings TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid defaults for dialect '{dialect}': {message}")]
    Defaults { dialect: String, message: String },
}

/// Emission options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmitSettings {
    pub metadata: bool,
    pub executable: bool,
}

impl EmitSettings {
    pub fn emitter(&self) -> Emitter {
        Emitter::new()
            .with_metadata(self.metadata)
            .with_executable(self.executable)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DialectSettings {
    /// Directory of extra `*.toml` dialect definitions
    pub dir: Option<PathBuf>,
}

/// Loaded site settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub render: RenderConfig,
    pub emit: EmitSettings,
    pub dialects: DialectSettings,
    /// Default bindings keyed by lowercase dialect name
    pub defaults: BTreeMap<String, Bindings>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlSettings {
    #[serde(default)]
    render: RenderConfig,
    #[serde(default)]
    emit: EmitSettings,
    #[serde(default)]
    dialects: DialectSettings,
    #[serde(default)]
    defaults: BTreeMap<String, toml::Table>,
}

impl Settings {
    /// Load settings from a TOML file
    ///
    /// A relative dialect directory is resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let mut settings = Self::from_str(&content)?;
        if let (Some(dir), Some(base)) = (settings.dialects.dir.as_mut(), path.parent()) {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        Ok(settings)
    }

    /// Load settings from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, SettingsError> {
        let parsed: TomlSettings = toml::from_str(content)?;

        let mut defaults = BTreeMap::new();
        for (dialect, table) in parsed.defaults {
            let bindings = Bindings::from_toml_table(table).map_err(|message| {
                SettingsError::Defaults {
                    dialect: dialect.clone(),
                    message,
                }
            })?;
            defaults.insert(dialect.to_ascii_lowercase(), bindings);
        }

        Ok(Settings {
            render: parsed.render,
            emit: parsed.emit,
            dialects: parsed.dialects,
            defaults,
        })
    }

    /// Site default bindings for a dialect (empty if none are configured)
    pub fn site_bindings(&self, dialect: &str) -> Bindings {
        self.defaults
            .get(&dialect.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}
