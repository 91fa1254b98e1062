//! Script renderer for substituting validated bindings into a template
//!
//! Substitution is a single left-to-right pass over the template lines.
//! Values are copied in verbatim and never re-scanned, and every byte of the
//! template outside placeholder spans is preserved.

pub mod config;

pub use config::{OptionalLines, RenderConfig, SyntaxPolicy};

use serde::Serialize;
use tracing::debug;

use crate::digest::ContentHash;
use crate::error::Error;
use crate::schema::NO_SENTINEL;
use crate::template::Template;
use crate::validate::{Bindings, ValidatedBindings, ValidationReport, Violation};

/// A fully substituted job script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedScript {
    text: String,
    template: String,
    dialect: Option<String>,
    template_version: ContentHash,
    bindings: Bindings,
    content_hash: ContentHash,
}

impl RenderedScript {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Name of the template that produced this script
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn dialect(&self) -> Option<&str> {
        self.dialect.as_deref()
    }

    pub fn template_version(&self) -> &ContentHash {
        &self.template_version
    }

    /// Raw values substituted, defaults included
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// SHA-256 of the rendered bytes
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    /// Rendered lines that start with `prefix`
    pub fn directives<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.text.lines().filter(move |line| line.starts_with(prefix))
    }
}

/// Lines of `text` with their byte offsets, line terminators included
fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_inclusive('\n').scan(0, |offset, line| {
        let start = *offset;
        *offset += line.len();
        Some((start, line))
    })
}

/// Append `piece`, refusing it if a `$${` sentinel now straddles the join.
/// `culprit` is the placeholder whose value sits at the join.
fn push_checked(out: &mut String, piece: &str, culprit: Option<&str>) -> Result<(), Error> {
    let start = out.len();
    out.push_str(piece);
    let Some(name) = culprit else {
        return Ok(());
    };
    let from = start.saturating_sub(2);
    let joined = out.as_bytes()[from..]
        .windows(3)
        .position(|w| w == b"$${")
        .is_some_and(|i| from + i < start);
    if joined {
        return Err(Error::Validation(ValidationReport::from(vec![
            Violation::invalid(name, NO_SENTINEL),
        ])));
    }
    Ok(())
}

/// Substitute validated bindings into a template
pub fn render_script(
    template: &Template,
    bindings: &ValidatedBindings,
    config: &RenderConfig,
) -> Result<RenderedScript, Error> {
    let text = template.text();
    let placeholders = template.placeholders();
    let mut out = String::with_capacity(text.len());
    let mut next = 0;
    let mut dropped = 0;

    for (line_start, line) in lines_with_offsets(text) {
        let line_end = line_start + line.len();
        let first = next;
        while next < placeholders.len() && placeholders[next].token.span.start < line_end {
            next += 1;
        }
        let on_line = &placeholders[first..next];

        let mut drop_line = false;
        for placeholder in on_line {
            if bindings.get(placeholder.name()).is_some() {
                continue;
            }
            if template.field(placeholder.name()).required {
                return Err(Error::UnboundToken {
                    name: placeholder.name().to_string(),
                    offset: placeholder.token.span.start,
                });
            }
            drop_line |= config.unbound_optional == OptionalLines::Drop;
        }
        if drop_line {
            dropped += 1;
            continue;
        }

        let mut cursor = line_start;
        let mut previous: Option<&str> = None;
        for placeholder in on_line {
            push_checked(&mut out, &text[cursor..placeholder.token.span.start], previous)?;
            let value = bindings.get(placeholder.name()).map_or("", |v| v.raw.as_str());
            push_checked(&mut out, value, Some(placeholder.name()))?;
            previous = Some(placeholder.name());
            cursor = placeholder.token.span.end;
        }
        push_checked(&mut out, &text[cursor..line_end], previous)?;
    }

    let content_hash = ContentHash::of(&out);
    debug!(
        template = %template.id(),
        hash = %content_hash.short(),
        dropped_lines = dropped,
        "rendered script"
    );

    Ok(RenderedScript {
        text: out,
        template: template.name().to_string(),
        dialect: template.dialect().map(str::to_string),
        template_version: *template.version(),
        bindings: bindings.to_bindings(),
        content_hash,
    })
}
