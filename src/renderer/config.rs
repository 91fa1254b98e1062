//! Configuration for rendering

use serde::{Deserialize, Serialize};

use crate::validate::ValidationMode;

/// Treatment of `$${` sentinels that do not form a valid placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntaxPolicy {
    /// Refuse the template with a `MalformedToken` error
    #[default]
    Reject,
    /// Keep the malformed text verbatim
    Preserve,
}

/// Treatment of optional placeholders that end up with no value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionalLines {
    /// Remove every line that mentions the placeholder
    #[default]
    Drop,
    /// Substitute the empty string
    Blank,
}

/// Configuration options for rendering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Whether unknown bindings are rejected
    pub mode: ValidationMode,

    /// Malformed placeholder handling for ad-hoc templates
    pub unrecognized: SyntaxPolicy,

    /// Unbound optional placeholder handling
    pub unbound_optional: OptionalLines,
}

impl RenderConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the validation mode
    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for lenient validation
    pub fn lenient(self) -> Self {
        self.with_mode(ValidationMode::Lenient)
    }

    /// Set malformed placeholder handling
    pub fn with_unrecognized(mut self, policy: SyntaxPolicy) -> Self {
        self.unrecognized = policy;
        self
    }

    /// Set unbound optional placeholder handling
    pub fn with_unbound_optional(mut self, lines: OptionalLines) -> Self {
        self.unbound_optional = lines;
        self
    }
}
