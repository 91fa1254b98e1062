//! Binding validation
//!
//! [`validate`] checks a caller's bindings against a template's placeholder
//! names and field schema. Every problem is collected into one
//! [`ValidationReport`]; only an empty report yields [`ValidatedBindings`],
//! which is the only input the renderer accepts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schema::Value;
use crate::template::Template;

/// How bindings for names the template never references are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Unknown bindings are violations
    #[default]
    Strict,
    /// Unknown bindings are ignored
    Lenient,
}

/// Placeholder values supplied for one render call
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Bindings(BTreeMap<String, String>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    /// Names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` on top of these bindings
    pub fn merge(&mut self, other: Bindings) {
        self.0.extend(other.0);
    }

    /// Parse a `name=value` assignment
    pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing name in '{}'", s));
        }
        Ok((name.to_string(), value.to_string()))
    }

    /// Parse a TOML table of bindings; scalar values are converted to strings
    pub fn from_toml_str(source: &str) -> Result<Self, String> {
        let table: toml::Table = toml::from_str(source).map_err(|e| e.to_string())?;
        Self::from_toml_table(table)
    }

    pub fn from_toml_table(table: toml::Table) -> Result<Self, String> {
        let mut bindings = Bindings::new();
        for (name, value) in table {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => {
                    return Err(format!(
                        "binding '{}' must be a string or number, got {}",
                        name,
                        other.type_str()
                    ))
                }
            };
            bindings.insert(name, text);
        }
        Ok(bindings)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Bindings(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<Bindings> for BTreeMap<String, String> {
    fn from(bindings: Bindings) -> Self {
        bindings.0
    }
}

/// What is wrong with a binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// Required name has no binding and no default
    MissingBinding,
    /// Value does not match the field's rule
    InvalidFormat { expected: String },
    /// Binding for a name the template does not use (strict mode)
    UnknownBinding,
}

/// One problem with one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl Violation {
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: ViolationKind::MissingBinding,
        }
    }

    pub fn invalid(field: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: ViolationKind::InvalidFormat {
                expected: expected.into(),
            },
        }
    }

    pub fn unknown(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: ViolationKind::UnknownBinding,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::MissingBinding => write!(f, "{}: missing binding", self.field),
            ViolationKind::InvalidFormat { expected } => {
                write!(f, "{}: invalid format, expected {}", self.field, expected)
            }
            ViolationKind::UnknownBinding => write!(f, "{}: unknown binding", self.field),
        }
    }
}

/// All violations found for one binding set; empty means render-safe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.violations.iter()
    }

    /// Field names with at least one violation
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.field.as_str())
    }

    fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {}", violation)?;
        }
        Ok(())
    }
}

impl From<Vec<Violation>> for ValidationReport {
    fn from(violations: Vec<Violation>) -> Self {
        Self { violations }
    }
}

impl<'a> IntoIterator for &'a ValidationReport {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.violations.iter()
    }
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingSource {
    Caller,
    Default,
}

/// A checked value ready for substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundValue {
    /// Exact text substituted into the template
    pub raw: String,
    pub value: Value,
    pub source: BindingSource,
}

/// Bindings that passed validation
#[derive(Debug, Clone, Default)]
pub struct ValidatedBindings {
    values: BTreeMap<String, BoundValue>,
}

impl ValidatedBindings {
    pub fn get(&self, name: &str) -> Option<&BoundValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoundValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw values actually used, defaults included
    pub fn to_bindings(&self) -> Bindings {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.raw.clone()))
            .collect()
    }
}

/// Check `bindings` against `template`
pub fn validate(
    template: &Template,
    bindings: &Bindings,
    mode: ValidationMode,
) -> Result<ValidatedBindings, ValidationReport> {
    let mut report = ValidationReport::default();
    let mut values = BTreeMap::new();

    for name in template.names() {
        let spec = template.field(name);
        let (raw, source) = match (bindings.get(name), &spec.default) {
            (Some(raw), _) => (raw, BindingSource::Caller),
            (None, Some(default)) => (default.as_str(), BindingSource::Default),
            (None, None) if spec.required => {
                report.push(Violation::missing(name.as_str()));
                continue;
            }
            (None, None) => continue,
        };

        match spec.check(raw) {
            Ok(_) if template.in_directive(name) && raw.contains(['\n', '\r']) => {
                report.push(Violation::invalid(name.as_str(), "single-line value"));
            }
            Ok(value) => {
                values.insert(
                    name.clone(),
                    BoundValue {
                        raw: raw.to_string(),
                        value,
                        source,
                    },
                );
            }
            Err(expected) => report.push(Violation::invalid(name.as_str(), expected)),
        }
    }

    for name in bindings.names().filter(|n| !template.references(n)) {
        match mode {
            ValidationMode::Strict => report.push(Violation::unknown(name)),
            ValidationMode::Lenient => {
                debug!(template = template.name(), binding = name, "ignoring unknown binding")
            }
        }
    }

    if report.is_empty() {
        Ok(ValidatedBindings { values })
    } else {
        debug!(template = template.name(), violations = report.len(), "bindings rejected");
        Err(report)
    }
}

/// The validation report alone; empty when the bindings are render-safe
pub fn report(template: &Template, bindings: &Bindings, mode: ValidationMode) -> ValidationReport {
    validate(template, bindings, mode).err().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec, Schema};

    fn cobalt() -> Template {
        let schema = Schema::new()
            .with_field("nnodes", FieldSpec::new(FieldKind::Integer))
            .with_field(
                "walltime",
                FieldSpec::new(FieldKind::Duration).with_default("00:30:00"),
            )
            .with_field("account", FieldSpec::new(FieldKind::Text).optional())
            .with_field("launch_dir", FieldSpec::new(FieldKind::Path));
        Template::builder(
            "cobalt",
            "#COBALT -n $${nnodes}\n#COBALT -t $${walltime}\n#COBALT -A $${account}\ncd $${launch_dir}\n",
        )
        .directive_prefix("#COBALT")
        .schema(schema)
        .build()
        .expect("Should build")
    }

    #[test]
    fn test_valid_bindings() {
        let bindings = Bindings::new()
            .with("nnodes", "4")
            .with("launch_dir", "/home/x");
        let validated = validate(&cobalt(), &bindings, ValidationMode::Strict).expect("Should pass");

        assert_eq!(validated.get("nnodes").map(|v| &v.value), Some(&Value::Integer(4)));
        let walltime = validated.get("walltime").expect("Default applied");
        assert_eq!(walltime.raw, "00:30:00");
        assert_eq!(walltime.source, BindingSource::Default);
        assert!(validated.get("account").is_none());
    }

    #[test]
    fn test_collects_every_violation() {
        let bindings = Bindings::new()
            .with("nnodes", "0")
            .with("walltime", "1h")
            .with("queue", "debug");
        let report = report(&cobalt(), &bindings, ValidationMode::Strict);
        assert_eq!(
            report.violations(),
            &[
                Violation::invalid("nnodes", "positive integer"),
                Violation::invalid("walltime", "HH:MM:SS"),
                Violation::missing("launch_dir"),
                Violation::unknown("queue"),
            ]
        );
    }

    #[test]
    fn test_lenient_ignores_unknown() {
        let bindings = Bindings::new()
            .with("nnodes", "2")
            .with("launch_dir", "/scratch")
            .with("queue", "debug");
        assert!(validate(&cobalt(), &bindings, ValidationMode::Lenient).is_ok());
        assert_eq!(
            report(&cobalt(), &bindings, ValidationMode::Strict).violations(),
            &[Violation::unknown("queue")]
        );
    }

    #[test]
    fn test_directive_values_single_line() {
        let bindings = Bindings::new()
            .with("nnodes", "2")
            .with("account", "proj\n#COBALT -q prod")
            .with("launch_dir", "/scratch");
        let report = report(&cobalt(), &bindings, ValidationMode::Strict);
        assert_eq!(
            report.violations(),
            &[Violation::invalid("account", "single-line value")]
        );
    }

    #[test]
    fn test_report_display() {
        let bindings = Bindings::new().with("launch_dir", "/home/x");
        let report = report(&cobalt(), &bindings, ValidationMode::Strict);
        assert_eq!(report.to_string(), "  nnodes: missing binding");
    }

    #[test]
    fn test_report_serializes() {
        let report = ValidationReport {
            violations: vec![Violation::invalid("nnodes", "positive integer")],
        };
        let json = serde_json::to_string(&report).expect("Should serialize");
        assert_eq!(
            json,
            r#"[{"field":"nnodes","kind":"invalid_format","expected":"positive integer"}]"#
        );
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            Bindings::parse_assignment("nnodes=4"),
            Ok(("nnodes".to_string(), "4".to_string()))
        );
        assert_eq!(
            Bindings::parse_assignment("pre_rocket=module load x=y"),
            Ok(("pre_rocket".to_string(), "module load x=y".to_string()))
        );
        assert!(Bindings::parse_assignment("nnodes").is_err());
        assert!(Bindings::parse_assignment("=4").is_err());
    }

    #[test]
    fn test_bindings_from_toml() {
        let bindings = Bindings::from_toml_str(
            r#"
nnodes = 4
launch_dir = "/home/x"
exclusive = true
"#,
        )
        .expect("Should parse");
        assert_eq!(bindings.get("nnodes"), Some("4"));
        assert_eq!(bindings.get("exclusive"), Some("true"));
        assert!(Bindings::from_toml_str("nested = { a = 1 }").is_err());
    }
}
