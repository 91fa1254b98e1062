//! qscript - batch scheduler job scripts from templates
//!
//! This library turns a scheduler template containing `$${name}`
//! placeholders and a set of bindings into a job script, checking the
//! bindings against the template's field schema first. Nothing is rendered
//! unless every binding is valid.
//!
//! # Example
//!
//! ```rust
//! use qscript::{render, Bindings, DialectRegistry, RenderConfig};
//!
//! let registry = DialectRegistry::builtin().unwrap();
//! let bindings = Bindings::new()
//!     .with("nnodes", "4")
//!     .with("launch_dir", "/home/x")
//!     .with("rocket_launch", "rlaunch singleshot");
//!
//! let script = render(&registry, "cobalt", &bindings, &RenderConfig::default()).unwrap();
//! assert!(script.text().contains("#COBALT -n 4\n"));
//! assert!(script.text().contains("cd /home/x\n"));
//! ```

pub mod digest;
pub mod emit;
pub mod error;
pub mod renderer;
pub mod scanner;
pub mod schema;
pub mod settings;
pub mod template;
pub mod validate;

pub use digest::ContentHash;
pub use emit::{Emitter, Receipt};
pub use error::{Error, Result, ScanError};
pub use renderer::{render_script, OptionalLines, RenderConfig, RenderedScript, SyntaxPolicy};
pub use scanner::{scan, tokens, Token};
pub use schema::{FieldKind, FieldSpec, Schema, Value, Walltime};
pub use settings::Settings;
pub use template::{Dialect, DialectRegistry, RegistryBuilder, Template};
pub use validate::{
    validate, Bindings, ValidatedBindings, ValidationMode, ValidationReport, Violation,
    ViolationKind,
};

use std::path::Path;

/// Render a registered dialect's template
///
/// # Errors
///
/// [`Error::UnknownDialect`] if `dialect` is not registered and
/// [`Error::Validation`] carrying the full report if any binding is missing,
/// malformed or (in strict mode) unknown.
pub fn render(
    registry: &DialectRegistry,
    dialect: &str,
    bindings: &Bindings,
    config: &RenderConfig,
) -> Result<RenderedScript> {
    let dialect = registry.get(dialect)?;
    render_template(dialect.template(), bindings, config)
}

/// Validate bindings against any template and render it
pub fn render_template(
    template: &Template,
    bindings: &Bindings,
    config: &RenderConfig,
) -> Result<RenderedScript> {
    let validated = validate(template, bindings, config.mode)?;
    render_script(template, &validated, config)
}

/// Render ad-hoc template text
///
/// Every placeholder is a required free-text field. Malformed placeholders
/// are handled according to `config.unrecognized`.
///
/// # Example
///
/// ```rust
/// use qscript::{render_text, Bindings, RenderConfig};
///
/// let bindings = Bindings::new().with("nnodes", "4").with("launch_dir", "/home/x");
/// let script = render_text(
///     "job",
///     "#COBALT -n $${nnodes}\ncd $${launch_dir}\n",
///     &bindings,
///     &RenderConfig::default(),
/// )
/// .unwrap();
///
/// assert_eq!(script.text(), "#COBALT -n 4\ncd /home/x\n");
/// ```
pub fn render_text(
    name: &str,
    text: &str,
    bindings: &Bindings,
    config: &RenderConfig,
) -> Result<RenderedScript> {
    let template = Template::builder(name, text)
        .syntax(config.unrecognized)
        .build()?;
    render_template(&template, bindings, config)
}

/// Render a registered dialect and emit it atomically to `output_path`
///
/// The returned [`Receipt`] carries the content hash. On a validation
/// failure the report is returned as [`Error::Validation`] and nothing is
/// written.
pub fn render_to_path(
    registry: &DialectRegistry,
    dialect: &str,
    bindings: &Bindings,
    output_path: &Path,
    config: &RenderConfig,
    emitter: &Emitter,
) -> Result<Receipt> {
    let script = render(registry, dialect, bindings, config)?;
    emitter.emit_to_path(&script, output_path)
}
