//! Dialect registry for storing and retrieving scheduler templates

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::{builtin, Template};
use crate::error::{Error, ScanError};
use crate::schema::{FieldDef, FieldDefError, FieldSpec, Schema};

/// Errors that can occur while loading dialect definitions
#[derive(Debug, Error)]
pub enum DialectError {
    /// Definition file could not be read
    #[error("error reading dialect file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Definition is not valid TOML or has the wrong shape
    #[error("invalid dialect definition in {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    /// Duplicate dialect name
    #[error("duplicate dialect definition: {name}")]
    Duplicate { name: String },

    /// Dialect name is empty or not an identifier
    #[error("invalid dialect name '{name}'")]
    InvalidName { name: String },

    /// Directive prefix must be a shell comment
    #[error("dialect {dialect}: directive prefix '{prefix}' must start with '#'")]
    InvalidPrefix { dialect: String, prefix: String },

    /// Template text contains a malformed placeholder
    #[error("dialect {dialect}: {source}")]
    Malformed {
        dialect: String,
        #[source]
        source: ScanError,
    },

    /// Template references a placeholder with no field definition
    #[error("dialect {dialect}: placeholder '{field}' has no field definition")]
    UndeclaredField { dialect: String, field: String },

    /// Field pattern is not a valid regex
    #[error("dialect {dialect}: invalid pattern for field '{field}': {source}")]
    InvalidPattern {
        dialect: String,
        field: String,
        #[source]
        source: regex::Error,
    },

    /// Field default fails its own rule
    #[error("dialect {dialect}: default for field '{field}' is not a valid {expected}")]
    InvalidDefault {
        dialect: String,
        field: String,
        expected: String,
    },
}

/// A dialect as written in a definition file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DialectDefinition {
    pub name: String,
    pub description: Option<String>,
    /// Prefix of scheduler directive lines, e.g. `#COBALT`
    pub directive_prefix: String,
    /// Command that consumes the script (informational only)
    pub submit_command: Option<String>,
    pub template: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
}

impl DialectDefinition {
    /// Parse a definition from TOML; `origin` names the source in errors
    pub fn from_toml(source: &str, origin: &str) -> Result<Self, DialectError> {
        toml::from_str(source).map_err(|e| DialectError::Parse {
            origin: origin.to_string(),
            source: e,
        })
    }
}

/// A loaded scheduler dialect
#[derive(Debug, Clone)]
pub struct Dialect {
    name: String,
    description: Option<String>,
    directive_prefix: String,
    submit_command: Option<String>,
    template: Template,
}

impl Dialect {
    /// Compile a definition, checking its template against its field set
    pub fn from_definition(def: DialectDefinition) -> Result<Self, DialectError> {
        let name = def.name.trim().to_ascii_lowercase();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DialectError::InvalidName { name: def.name });
        }
        if !def.directive_prefix.starts_with('#') {
            return Err(DialectError::InvalidPrefix {
                dialect: name,
                prefix: def.directive_prefix,
            });
        }

        let mut schema = Schema::new();
        for (field, field_def) in &def.fields {
            let spec = FieldSpec::from_def(field_def).map_err(|e| match e {
                FieldDefError::Pattern(source) => DialectError::InvalidPattern {
                    dialect: name.clone(),
                    field: field.clone(),
                    source,
                },
                FieldDefError::Default { expected } => DialectError::InvalidDefault {
                    dialect: name.clone(),
                    field: field.clone(),
                    expected,
                },
            })?;
            schema.insert(field.clone(), spec);
        }

        let template = Template::builder(name.clone(), def.template)
            .dialect(name.clone())
            .directive_prefix(def.directive_prefix.clone())
            .schema(schema)
            .build()
            .map_err(|source| DialectError::Malformed {
                dialect: name.clone(),
                source,
            })?;

        if let Some(field) = template
            .names()
            .iter()
            .find(|n| !template.schema().contains(n))
        {
            return Err(DialectError::UndeclaredField {
                dialect: name,
                field: field.clone(),
            });
        }

        for (field, _) in template.schema().iter() {
            if !template.references(field) {
                warn!(dialect = %name, field, "field defined but never used by the template");
            }
        }
        if template.directive_lines().next().is_none() {
            warn!(dialect = %name, prefix = %def.directive_prefix, "template has no directive lines");
        }

        Ok(Dialect {
            name,
            description: def.description,
            directive_prefix: def.directive_prefix,
            submit_command: def.submit_command,
            template,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn directive_prefix(&self) -> &str {
        &self.directive_prefix
    }

    pub fn submit_command(&self) -> Option<&str> {
        self.submit_command.as_deref()
    }

    pub fn template(&self) -> &Template {
        &self.template
    }
}

/// Collects dialect definitions before freezing them into a [`DialectRegistry`]
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    dialects: BTreeMap<String, Dialect>,
}

impl RegistryBuilder {
    /// Create a new empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the packaged dialects (cobalt, slurm, pbs, lsf)
    pub fn with_builtins(mut self) -> Result<Self, DialectError> {
        for (origin, source) in builtin::DEFINITIONS {
            self.register_toml(source, origin)?;
        }
        Ok(self)
    }

    /// Register a dialect from a definition
    pub fn register(&mut self, def: DialectDefinition) -> Result<(), DialectError> {
        let dialect = Dialect::from_definition(def)?;
        if self.dialects.contains_key(dialect.name()) {
            return Err(DialectError::Duplicate {
                name: dialect.name().to_string(),
            });
        }
        debug!(dialect = dialect.name(), template = %dialect.template().id(), "registered dialect");
        self.dialects.insert(dialect.name().to_string(), dialect);
        Ok(())
    }

    /// Register a dialect from TOML source
    pub fn register_toml(&mut self, source: &str, origin: &str) -> Result<(), DialectError> {
        self.register(DialectDefinition::from_toml(source, origin)?)
    }

    /// Register every `*.toml` file in a directory, in file-name order
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, DialectError> {
        let io_err = |source: std::io::Error| DialectError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            let source = fs::read_to_string(path).map_err(|source| DialectError::Io {
                path: path.clone(),
                source,
            })?;
            self.register_toml(&source, &path.display().to_string())?;
        }
        Ok(paths.len())
    }

    /// Check if a dialect has been registered
    pub fn contains(&self, name: &str) -> bool {
        self.dialects.contains_key(&name.to_ascii_lowercase())
    }

    /// Freeze the registry
    pub fn build(self) -> DialectRegistry {
        DialectRegistry {
            dialects: self.dialects,
        }
    }
}

/// Immutable table of scheduler dialects
#[derive(Debug, Clone)]
pub struct DialectRegistry {
    dialects: BTreeMap<String, Dialect>,
}

impl DialectRegistry {
    /// Registry holding only the packaged dialects
    pub fn builtin() -> Result<Self, DialectError> {
        Ok(RegistryBuilder::new().with_builtins()?.build())
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a dialect by name (case-insensitive)
    pub fn get(&self, name: &str) -> Result<&Dialect, Error> {
        self.dialects
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| Error::unknown_dialect(name, self.names()))
    }

    /// Check if a dialect exists
    pub fn contains(&self, name: &str) -> bool {
        self.dialects.contains_key(&name.to_ascii_lowercase())
    }

    /// Get all dialect names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dialects.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dialect> {
        self.dialects.values()
    }

    pub fn len(&self) -> usize {
        self.dialects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialects.is_empty()
    }
}
