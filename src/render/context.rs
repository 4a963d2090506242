//! Per-render state shared by every slot and component of one page

use crate::app::{App, Locals, Request};
use crate::error::{TrellisError, TrellisResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Deepest component nesting a page may reach
pub const MAX_COMPONENT_DEPTH: usize = 64;

/// Cheap to clone; every clone refers to the same request and locals
#[derive(Clone)]
pub struct RenderContext {
    pub app: App,
    pub request: Arc<Request>,
    pub locals: Locals,
    pub params: Arc<HashMap<String, String>>,
    pub styles: Arc<Vec<String>>,
    committed: Arc<AtomicBool>,
    depth: usize,
}

impl RenderContext {
    pub fn new(
        app: App,
        request: Request,
        locals: Locals,
        params: HashMap<String, String>,
        styles: Vec<String>,
    ) -> Self {
        Self {
            app,
            request: Arc::new(request),
            locals,
            params: Arc::new(params),
            styles: Arc::new(styles),
            committed: Arc::new(AtomicBool::new(false)),
            depth: 0,
        }
    }

    /// Context for a component one level deeper
    pub fn nested(&self) -> TrellisResult<Self> {
        if self.depth >= MAX_COMPONENT_DEPTH {
            return Err(TrellisError::render(format!(
                "components nested deeper than {} levels",
                MAX_COMPONENT_DEPTH
            )));
        }
        let mut child = self.clone();
        child.depth += 1;
        Ok(child)
    }

    /// Flag set once the first chunk of this page reaches its response
    pub fn commit_flag(&self) -> Arc<AtomicBool> {
        self.committed.clone()
    }

    /// Whether the response is fixed and can no longer be replaced
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Request-derived values visible to templates as `request.*`
    pub fn request_value(&self, key: &str) -> Option<Value> {
        let uri = &self.request.uri;
        match key {
            "path" => Some(Value::String(uri.path().to_string())),
            "query" => Some(Value::String(uri.query().unwrap_or_default().to_string())),
            "method" => Some(Value::String(self.request.method.to_string())),
            "url" => Some(Value::String(uri.to_string())),
            _ => None,
        }
    }
}
