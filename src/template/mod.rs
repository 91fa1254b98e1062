//! Job script templates and the dialect registry
//!
//! A [`Template`] is immutable text scanned once at construction. Its
//! placeholders, their line numbers and whether they sit on a scheduler
//! directive line are computed up front; the token sequence itself can be
//! re-walked lazily at any time through [`Template::tokens`].
//!
//! # Example
//!
//! ```rust
//! use qscript::Template;
//!
//! let template = Template::builder("job", "#COBALT -n $${nnodes}\ncd $${launch_dir}\n")
//!     .directive_prefix("#COBALT")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(template.names(), ["nnodes", "launch_dir"]);
//! assert!(template.in_directive("nnodes"));
//! assert!(!template.in_directive("launch_dir"));
//! ```

mod builtin;
mod registry;

pub use registry::{Dialect, DialectDefinition, DialectError, DialectRegistry, RegistryBuilder};

use tracing::warn;

use crate::digest::ContentHash;
use crate::error::ScanError;
use crate::renderer::SyntaxPolicy;
use crate::scanner::{self, Segment, Token, Tokens};
use crate::schema::{FieldSpec, Schema};

/// A placeholder occurrence with its position in the template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub token: Token,
    /// 1-based line number
    pub line: usize,
    /// Whether the line starts with the dialect's directive prefix
    pub directive: bool,
}

impl Placeholder {
    pub fn name(&self) -> &str {
        &self.token.name
    }
}

/// An immutable, scanned job script template
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    dialect: Option<String>,
    text: String,
    directive_prefix: Option<String>,
    schema: Schema,
    syntax: SyntaxPolicy,
    placeholders: Vec<Placeholder>,
    names: Vec<String>,
    malformed: Vec<ScanError>,
    version: ContentHash,
}

impl Template {
    /// Scan `text` with no schema; every placeholder becomes a required text field
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Result<Self, ScanError> {
        Self::builder(name, text).build()
    }

    pub fn builder(name: impl Into<String>, text: impl Into<String>) -> TemplateBuilder {
        TemplateBuilder {
            name: name.into(),
            text: text.into(),
            dialect: None,
            directive_prefix: None,
            schema: Schema::default(),
            syntax: SyntaxPolicy::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> Option<&str> {
        self.dialect.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn directive_prefix(&self) -> Option<&str> {
        self.directive_prefix.as_deref()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn syntax(&self) -> SyntaxPolicy {
        self.syntax
    }

    /// Rule for a placeholder name
    pub fn field(&self, name: &str) -> &FieldSpec {
        self.schema.field(name)
    }

    /// Lazy token sequence; each call starts a fresh scan
    pub fn tokens(&self) -> Tokens<'_> {
        scanner::tokens(&self.text)
    }

    /// All placeholder occurrences in order
    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    /// Distinct placeholder names in order of first occurrence
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn references(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Whether any occurrence of `name` sits on a directive line
    pub fn in_directive(&self, name: &str) -> bool {
        self.placeholders
            .iter()
            .any(|p| p.directive && p.name() == name)
    }

    /// Malformed sentinels kept as literal text (only under `SyntaxPolicy::Preserve`)
    pub fn malformed(&self) -> &[ScanError] {
        &self.malformed
    }

    /// Lines of the template that start with the directive prefix
    pub fn directive_lines(&self) -> impl Iterator<Item = &str> {
        let prefix = self.directive_prefix.as_deref();
        self.text
            .lines()
            .filter(move |line| prefix.is_some_and(|p| line.starts_with(p)))
    }

    /// SHA-256 of the template text
    pub fn version(&self) -> &ContentHash {
        &self.version
    }

    /// Name plus short version hash, e.g. `cobalt@3f2a9c0d81be`
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version.short())
    }
}

/// Builder for [`Template`]
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    name: String,
    text: String,
    dialect: Option<String>,
    directive_prefix: Option<String>,
    schema: Schema,
    syntax: SyntaxPolicy,
}

impl TemplateBuilder {
    pub fn dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = Some(dialect.into());
        self
    }

    pub fn directive_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.directive_prefix = Some(prefix.into());
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn syntax(mut self, syntax: SyntaxPolicy) -> Self {
        self.syntax = syntax;
        self
    }

    /// Scan the text and freeze the template
    pub fn build(self) -> Result<Template, ScanError> {
        let mut placeholders = Vec::new();
        let mut malformed = Vec::new();
        let mut line = 1;
        let mut counted = 0;

        for segment in scanner::segments(&self.text) {
            match segment {
                Segment::Text(_) => {}
                Segment::Placeholder(token) => {
                    let start = token.span.start;
                    line += self.text[counted..start].matches('\n').count();
                    counted = start;

                    let line_start = self.text[..start].rfind('\n').map_or(0, |i| i + 1);
                    let directive = self
                        .directive_prefix
                        .as_deref()
                        .is_some_and(|p| self.text[line_start..].starts_with(p));

                    placeholders.push(Placeholder {
                        token,
                        line,
                        directive,
                    });
                }
                Segment::Malformed { error, .. } => match self.syntax {
                    SyntaxPolicy::Reject => return Err(error),
                    SyntaxPolicy::Preserve => {
                        warn!(template = %self.name, offset = error.offset(), "{}", error);
                        malformed.push(error);
                    }
                },
            }
        }

        let names = scanner::names(placeholders.iter().map(|p| &p.token));
        let version = ContentHash::of(&self.text);

        Ok(Template {
            name: self.name,
            dialect: self.dialect,
            text: self.text,
            directive_prefix: self.directive_prefix,
            schema: self.schema,
            syntax: self.syntax,
            placeholders,
            names,
            malformed,
            version,
        })
    }
}
