//! Compiled template artifacts
//!
//! An artifact is immutable once produced. It is shared behind an `Arc` by
//! the cache entry that holds it and by every render currently using it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Result of compiling one template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledArtifact {
    /// Template file name, relative to the project root
    pub filename: String,

    /// Directives evaluated before the body renders
    pub frontmatter: Vec<Directive>,

    /// Renderer program for the template body
    pub program: Vec<Node>,

    /// Stylesheets this template depends on
    pub css_deps: BTreeSet<String>,

    /// Non-fatal compiler findings
    pub diagnostics: Vec<Diagnostic>,
}

/// Frontmatter directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum Directive {
    /// Internally redirect the request to another path
    Reroute { path: String },
    /// Response status for the page
    Status { code: u16 },
    /// Store a value in request locals
    Set { key: String, value: String },
    /// Add a response header
    Header { name: String, value: String },
    /// Append a Set-Cookie value
    Cookie { value: String },
    /// Upgrade the connection to a WebSocket
    Upgrade,
}

/// One node of a renderer program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    /// Literal markup
    Html { value: String },
    /// Value lookup, escaped unless `raw`
    Expr { path: String, raw: bool },
    /// Insertion point for the caller's slot content
    Slot { name: String, fallback: Vec<Node> },
    /// Nested component, hydrated on the client when `client` is set
    Component {
        src: String,
        props: Vec<Prop>,
        slots: Vec<SlotFill>,
        client: Option<String>,
    },
    /// Head content (stylesheets collected so far)
    Head,
    /// Conditional on the truthiness of a value
    If {
        path: String,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// Component property passed at the call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prop {
    pub name: String,
    pub value: PropValue,
}

/// Property value: a literal string or a lookup in the caller's scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropValue {
    Literal(String),
    Path(String),
}

/// Content the caller provides for one named slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotFill {
    pub name: String,
    pub body: Vec<Node>,
}

/// Severity of a compiler diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Compiler-reported finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(line: usize, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            line,
            message: message.into(),
        }
    }
}

impl CompiledArtifact {
    /// Whether the frontmatter asks for an internal redirect
    pub fn reroute_target(&self) -> Option<&str> {
        self.frontmatter.iter().find_map(|d| match d {
            Directive::Reroute { path } => Some(path.as_str()),
            _ => None,
        })
    }
}
