//! Bounded reroute dispatcher
//!
//! Resolves a request to a route and renders it. Pages may reroute the
//! request internally; each hop re-enters dispatch with the same
//! [`Locals`], and a per-request counter keyed by the locals identity
//! stops the chain once it exceeds the configured depth.
//!
//! ```text
//! Dispatching -> Rendering -> Completed
//!                    |
//!                    +-> Rerouting -> Dispatching (hop + 1)
//! ```

use crate::app::{App, Locals, Request, Response};
use crate::error::{TrellisError, TrellisResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::debug;
use uuid::Uuid;

/// Request state handed to a reroute
#[derive(Debug, Clone)]
pub struct RerouteContext {
    pub request: Request,
    pub locals: Locals,
}

/// Hook through which rendering asks for an internal redirect
#[async_trait]
pub trait RerouteHook: Send + Sync {
    async fn reroute(&self, path: &str, context: RerouteContext) -> TrellisResult<Response>;
}

/// Routes requests to pages and bounds reroute chains
pub struct Dispatcher {
    app: App,
    max_reroute_depth: u32,
    seen: Arc<Mutex<HashMap<Uuid, u32>>>,
}

fn lock(seen: &Mutex<HashMap<Uuid, u32>>) -> MutexGuard<'_, HashMap<Uuid, u32>> {
    seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes a request's reroute counter when the request finishes.
///
/// A streamed response holds the scope in its body, so the counter lives
/// until the last chunk is read or the body is dropped.
struct RerouteScope {
    seen: Arc<Mutex<HashMap<Uuid, u32>>>,
    id: Uuid,
}

impl Drop for RerouteScope {
    fn drop(&mut self) {
        lock(&self.seen).remove(&self.id);
    }
}

impl Dispatcher {
    /// Create a dispatcher and register it as the app's reroute hook
    pub fn new(app: App, max_reroute_depth: u32) -> TrellisResult<Arc<Self>> {
        let dispatcher = Arc::new(Self {
            app,
            max_reroute_depth,
            seen: Arc::new(Mutex::new(HashMap::new())),
        });

        let hook: Arc<dyn RerouteHook> = dispatcher.clone();
        let weak: Weak<dyn RerouteHook> = Arc::downgrade(&hook);
        dispatcher.app.set_reroute_hook(weak)?;

        Ok(dispatcher)
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn max_reroute_depth(&self) -> u32 {
        self.max_reroute_depth
    }

    fn seen(&self) -> MutexGuard<'_, HashMap<Uuid, u32>> {
        lock(&self.seen)
    }

    /// Number of requests currently holding a reroute counter
    pub fn active_chains(&self) -> usize {
        self.seen().len()
    }

    /// Handle one external request with fresh locals
    pub async fn handle(&self, request: Request) -> TrellisResult<Response> {
        self.handle_with_locals(request, Locals::new()).await
    }

    /// Handle one external request.
    ///
    /// `locals` must not be shared with any other in-flight request.
    pub async fn handle_with_locals(
        &self,
        request: Request,
        locals: Locals,
    ) -> TrellisResult<Response> {
        let scope = RerouteScope {
            seen: self.seen.clone(),
            id: locals.id(),
        };

        if self.app.is_dev() {
            self.app.refresh_routes().await?;
        }

        let response = self.dispatch(request, locals).await?;
        Ok(response.hold(scope))
    }

    async fn dispatch(&self, request: Request, locals: Locals) -> TrellisResult<Response> {
        let path = request.path().to_string();

        let route = match self.app.match_route(&path) {
            Some(route) => route,
            None => self
                .app
                .fallback_route()
                .ok_or_else(|| TrellisError::RouteNotFound(path.clone()))?,
        };

        debug!("{} {} -> {}", request.method, path, route.file);
        self.app.render(request, route, locals).await
    }
}

#[async_trait]
impl RerouteHook for Dispatcher {
    async fn reroute(&self, path: &str, context: RerouteContext) -> TrellisResult<Response> {
        let id = context.locals.id();
        let hop = {
            let mut seen = self.seen();
            let count = seen.get(&id).copied().unwrap_or(1);
            if count > self.max_reroute_depth {
                return Err(TrellisError::RerouteDepthExceeded {
                    max: self.max_reroute_depth,
                });
            }
            seen.insert(id, count + 1);
            count
        };

        let request = context.request.rerouted(path)?;
        debug!("Reroute {} to {} (hop {})", context.request.uri, request.uri, hop);

        self.dispatch(request, context.locals).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MemorySource;
    use hyper::StatusCode;

    async fn dispatcher(templates: &[(&str, &str)], max: u32) -> Arc<Dispatcher> {
        let source = MemorySource::new();
        for (name, body) in templates {
            source.insert(*name, *body);
        }
        let app = App::builder(Arc::new(source)).build().await.unwrap();
        Dispatcher::new(app, max).unwrap()
    }

    /// Pages /0 through /n where /i reroutes to /i+1 and /n renders
    fn chain(n: usize) -> Vec<(String, String)> {
        (0..=n)
            .map(|i| {
                let body = if i == n {
                    format!("<p>end {}</p>", i)
                } else {
                    format!("---\nreroute /{}\n---\n", i + 1)
                };
                (format!("pages/{}.tmpl", i), body)
            })
            .collect()
    }

    async fn chain_dispatcher(n: usize, max: u32) -> Arc<Dispatcher> {
        let pages = chain(n);
        let refs: Vec<(&str, &str)> = pages.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        dispatcher(&refs, max).await
    }

    async fn get(dispatcher: &Dispatcher, path: &str) -> TrellisResult<Response> {
        dispatcher.handle(Request::get(path).unwrap()).await
    }

    #[tokio::test]
    async fn exactly_max_reroutes_complete() {
        let dispatcher = chain_dispatcher(3, 3).await;

        let response = get(&dispatcher, "/0").await.unwrap();
        assert_eq!(response.into_text().await.unwrap(), "<p>end 3</p>");
        assert_eq!(dispatcher.active_chains(), 0);
    }

    #[tokio::test]
    async fn one_more_reroute_fails() {
        let dispatcher = chain_dispatcher(4, 3).await;

        let err = get(&dispatcher, "/0").await.unwrap_err();
        assert!(matches!(err, TrellisError::RerouteDepthExceeded { max: 3 }));
        assert_eq!(dispatcher.active_chains(), 0);
    }

    #[tokio::test]
    async fn self_reroute_loop_is_bounded() {
        let dispatcher = dispatcher(&[("pages/loop.tmpl", "---\nreroute /loop\n---\n")], 5).await;

        let err = get(&dispatcher, "/loop").await.unwrap_err();
        assert_eq!(err.to_string(), "Exceeded max reroute depth of 5");
    }

    #[tokio::test]
    async fn concurrent_requests_count_separately() {
        let dispatcher = chain_dispatcher(2, 2).await;

        let requests = (0..8).map(|_| get(&dispatcher, "/0"));
        let results = futures_util::future::join_all(requests).await;

        for result in results {
            assert_eq!(result.unwrap().into_text().await.unwrap(), "<p>end 2</p>");
        }
        assert_eq!(dispatcher.active_chains(), 0);
    }

    #[tokio::test]
    async fn locals_survive_reroute() {
        let dispatcher = dispatcher(
            &[
                ("pages/start.tmpl", "---\nset from start\nreroute /finish\n---\n"),
                ("pages/finish.tmpl", "came from {{ locals.from }}"),
            ],
            5,
        )
        .await;

        let locals = Locals::new();
        let response = dispatcher
            .handle_with_locals(Request::get("/start").unwrap(), locals.clone())
            .await
            .unwrap();

        assert_eq!(response.into_text().await.unwrap(), "came from start");
        assert_eq!(locals.get("from"), Some(serde_json::json!("start")));
    }

    #[tokio::test]
    async fn unmatched_route_without_fallback() {
        let dispatcher = dispatcher(&[("pages/index.tmpl", "home")], 5).await;

        let err = get(&dispatcher, "/missing").await.unwrap_err();
        assert!(matches!(err, TrellisError::RouteNotFound(ref p) if p == "/missing"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unmatched_route_uses_fallback_page() {
        let dispatcher = dispatcher(&[("pages/404.tmpl", "nothing at {{ request.path }}")], 5).await;

        let response = get(&dispatcher, "/missing").await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.into_text().await.unwrap(), "nothing at /missing");
    }

    #[tokio::test]
    async fn render_errors_in_chain_propagate() {
        let dispatcher = dispatcher(
            &[
                ("pages/a.tmpl", "---\nreroute /b\n---\n"),
                ("pages/b.tmpl", r#"{% component "components/gone.tmpl" %}{% endcomponent %}"#),
            ],
            5,
        )
        .await;

        let err = get(&dispatcher, "/a").await.unwrap_err();
        assert!(matches!(err, TrellisError::TemplateNotFound(_)));
    }

    #[tokio::test]
    async fn component_reroute_replaces_page() {
        let dispatcher = dispatcher(
            &[
                ("pages/index.tmpl", r#"{% component "components/guard.tmpl" %}{% endcomponent %}<p>secret</p>"#),
                ("components/guard.tmpl", "---\nreroute /login\n---\n"),
                ("pages/login.tmpl", "---\nstatus 401\n---\nplease log in"),
            ],
            5,
        )
        .await;

        let response = get(&dispatcher, "/").await.unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.into_text().await.unwrap(), "please log in");
    }

    #[tokio::test]
    async fn component_reroute_after_body_started_is_refused() {
        let dispatcher = dispatcher(
            &[
                (
                    "pages/index.tmpl",
                    r#"<p>start</p>{% component "components/guard.tmpl" %}{% endcomponent %}<p>end</p>"#,
                ),
                ("components/guard.tmpl", "---\nreroute /login\n---\n"),
                ("pages/login.tmpl", "---\nset visited login\n---\nplease log in"),
            ],
            5,
        )
        .await;

        for _ in 0..10 {
            let locals = Locals::new();
            let response = dispatcher
                .handle_with_locals(Request::get("/").unwrap(), locals.clone())
                .await
                .unwrap();
            assert_eq!(response.status, StatusCode::OK);

            let err = response.into_text().await.unwrap_err();
            assert!(err.to_string().contains("after the response has started"));
            assert_eq!(locals.get("visited"), None);
        }
        assert_eq!(dispatcher.active_chains(), 0);
    }

    #[tokio::test]
    async fn reroute_counter_lives_until_body_is_read() {
        let dispatcher = chain_dispatcher(1, 3).await;

        let response = get(&dispatcher, "/0").await.unwrap();
        assert_eq!(dispatcher.active_chains(), 1);

        assert_eq!(response.into_text().await.unwrap(), "<p>end 1</p>");
        assert_eq!(dispatcher.active_chains(), 0);
    }

    #[tokio::test]
    async fn dropped_body_clears_reroute_counter() {
        let dispatcher = chain_dispatcher(1, 3).await;

        let response = get(&dispatcher, "/0").await.unwrap();
        assert_eq!(dispatcher.active_chains(), 1);

        drop(response);
        assert_eq!(dispatcher.active_chains(), 0);
    }

    #[tokio::test]
    async fn second_dispatcher_cannot_register() {
        let dispatcher = dispatcher(&[], 5).await;
        let err = Dispatcher::new(dispatcher.app().clone(), 5).err().unwrap();
        assert!(matches!(err, TrellisError::AlreadyRegistered(_)));
    }
}
