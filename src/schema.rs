//! Field schemas for template placeholders
//!
//! Each placeholder of a dialect template is a typed field. Bindings arrive
//! as strings and are checked against the field's kind, then against its
//! optional regex pattern, before they may be substituted.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Type of a template field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Positive integer (node counts, task counts)
    Integer,
    /// Wall-clock limit written as `HH:MM:SS`
    Duration,
    /// Filesystem path on a single line
    Path,
    /// Opaque free text
    #[default]
    Text,
}

impl FieldKind {
    /// Human-readable description of what this kind accepts
    pub fn expected(&self) -> &'static str {
        match self {
            FieldKind::Integer => "positive integer",
            FieldKind::Duration => "HH:MM:SS",
            FieldKind::Path => "single-line path",
            FieldKind::Text => "text",
        }
    }

    /// Parse a raw binding into a typed value
    pub fn parse(&self, raw: &str) -> Option<Value> {
        match self {
            FieldKind::Integer => {
                if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                raw.parse::<u64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .map(Value::Integer)
            }
            FieldKind::Duration => raw.parse().ok().map(Value::Duration),
            FieldKind::Path => {
                if raw.is_empty() || raw.contains(['\n', '\r', '\0']) {
                    None
                } else {
                    Some(Value::Path(PathBuf::from(raw)))
                }
            }
            FieldKind::Text => Some(Value::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Integer => "integer",
            FieldKind::Duration => "duration",
            FieldKind::Path => "path",
            FieldKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// Wall-clock limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Walltime {
    pub hours: u32,
    pub minutes: u8,
    pub seconds: u8,
}

impl Walltime {
    pub fn total_seconds(&self) -> u64 {
        u64::from(self.hours) * 3600 + u64::from(self.minutes) * 60 + u64::from(self.seconds)
    }
}

/// Walltime strings that are not `HH:MM:SS`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalltimeError;

impl fmt::Display for WalltimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected HH:MM:SS")
    }
}

impl std::error::Error for WalltimeError {}

impl FromStr for Walltime {
    type Err = WalltimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(h), Some(m), Some(sec), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(WalltimeError);
        };

        let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
        if !digits(h) || !digits(m) || !digits(sec) || m.len() != 2 || sec.len() != 2 {
            return Err(WalltimeError);
        }

        let hours = h.parse::<u32>().map_err(|_| WalltimeError)?;
        let minutes = m.parse::<u8>().map_err(|_| WalltimeError)?;
        let seconds = sec.parse::<u8>().map_err(|_| WalltimeError)?;
        if minutes > 59 || seconds > 59 {
            return Err(WalltimeError);
        }

        Ok(Walltime {
            hours,
            minutes,
            seconds,
        })
    }
}

impl fmt::Display for Walltime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// A validated binding value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(u64),
    Duration(Walltime),
    Path(PathBuf),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Integer(_) => FieldKind::Integer,
            Value::Duration(_) => FieldKind::Duration,
            Value::Path(_) => FieldKind::Path,
            Value::Text(_) => FieldKind::Text,
        }
    }
}

/// Field definition as written in a dialect file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDef {
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default = "default_required")]
    pub required: bool,
    pub pattern: Option<String>,
    pub default: Option<String>,
    pub description: Option<String>,
}

fn default_required() -> bool {
    true
}

/// Why a field definition could not be compiled
#[derive(Debug)]
pub enum FieldDefError {
    Pattern(regex::Error),
    Default { expected: String },
}

const SENTINEL: &str = "$${";

/// Expected format reported for values containing a placeholder sentinel
pub const NO_SENTINEL: &str = "no placeholder sentinel";

/// Compiled field rule
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub required: bool,
    pub pattern: Option<Regex>,
    pub default: Option<String>,
    pub description: Option<String>,
}

/// Rule applied to placeholders that have no schema entry
pub static IMPLICIT_FIELD: FieldSpec = FieldSpec::implicit();

impl FieldSpec {
    /// Required free-text field
    pub const fn implicit() -> Self {
        Self {
            kind: FieldKind::Text,
            required: true,
            pattern: None,
            default: None,
            description: None,
        }
    }

    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            ..Self::implicit()
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set the regex pattern; the whole value must match
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.pattern = Some(Regex::new(&format!("^(?:{})$", pattern))?);
        Ok(self)
    }

    /// Compile a definition, checking the pattern and the default
    pub fn from_def(def: &FieldDef) -> Result<Self, FieldDefError> {
        let mut spec = FieldSpec {
            kind: def.kind,
            required: def.required,
            pattern: None,
            default: def.default.clone(),
            description: def.description.clone(),
        };
        if let Some(pattern) = &def.pattern {
            spec = spec.with_pattern(pattern).map_err(FieldDefError::Pattern)?;
        }
        if let Some(default) = &def.default {
            spec.check(default)
                .map_err(|expected| FieldDefError::Default { expected })?;
        }
        Ok(spec)
    }

    /// Source text of the pattern without the anchoring wrapper
    pub fn pattern_source(&self) -> Option<&str> {
        self.pattern.as_ref().map(|re| {
            let s = re.as_str();
            s.strip_prefix("^(?:")
                .and_then(|s| s.strip_suffix(")$"))
                .unwrap_or(s)
        })
    }

    /// Check a raw value, returning the typed value or the expected format
    ///
    /// Values may never contain the `$${` sentinel, whatever their kind, so
    /// rendered output can always be re-scanned without finding a placeholder.
    pub fn check(&self, raw: &str) -> Result<Value, String> {
        if raw.contains(SENTINEL) {
            return Err(NO_SENTINEL.to_string());
        }
        let value = self
            .kind
            .parse(raw)
            .ok_or_else(|| self.kind.expected().to_string())?;
        if let Some(re) = &self.pattern {
            if !re.is_match(raw) {
                return Err(format!("match /{}/", self.pattern_source().unwrap_or("")));
            }
        }
        Ok(value)
    }
}

/// Field rules for a template, keyed by placeholder name
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, spec: FieldSpec) {
        self.fields.insert(name.into(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Rule for `name`, falling back to a required text field
    pub fn field(&self, name: &str) -> &FieldSpec {
        self.fields.get(name).unwrap_or(&IMPLICIT_FIELD)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
