//! Error types for Trellis
//!
//! All modules use `TrellisResult<T>` as their return type.

use hyper::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Trellis operations
pub type TrellisResult<T> = Result<T, TrellisError>;

/// All errors that can occur in Trellis
#[derive(Error, Debug)]
pub enum TrellisError {
    // Compilation errors
    #[error("Failed to compile {filename}: {message}")]
    Compile { filename: String, message: String },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    // Persistent cache errors (swallowed by the compilation cache)
    #[error("Compiler cache IO error: {context}")]
    CacheIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Render errors
    #[error("Render failed: {0}")]
    Render(String),

    // Dispatch errors
    #[error("Exceeded max reroute depth of {max}")]
    RerouteDepthExceeded { max: u32 },

    #[error("No route matched {0}")]
    RouteNotFound(String),

    #[error("Reroute requested but no reroute handler is registered")]
    RerouteUnavailable,

    #[error("Handler already registered: {0}")]
    AlreadyRegistered(&'static str),

    // Transport errors
    #[error("WebSocket upgrade rejected: {0}")]
    UpgradeRejected(String),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl TrellisError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a persistent cache IO error with context
    pub fn cache_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::CacheIo {
            context: context.into(),
            source,
        }
    }

    /// Create a compile error for a template
    pub fn compile(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create a render error
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    /// HTTP status the outermost handler should answer with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Self::UpgradeRejected(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RerouteDepthExceeded { .. } => {
                Some("Check for pages that reroute to each other, or raise server.max_reroute_depth")
            }
            Self::TemplateNotFound(_) => Some("Template names are relative to the project root"),
            Self::RouteNotFound(_) => Some("Run: trellis routes"),
            Self::ConfigInvalid { .. } => Some("Run: trellis config show"),
            _ => None,
        }
    }
}
