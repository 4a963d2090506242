//! Application: routes, compiled pages and page rendering
//!
//! `App` is a cheap handle; clones share one compilation cache, router and
//! set of registered handlers.

pub mod locals;
pub mod request;
pub mod router;
pub mod source;

pub use locals::Locals;
pub use request::{Body, Request, Response, UPGRADED_HEADER};
pub use router::{Route, RouteMatch, Router, NOT_FOUND_PAGE};
pub use source::{DirSource, MemorySource, TemplateSource, TEMPLATE_EXT};

use crate::compile::{
    ArtifactStore, CompilationCache, CompiledArtifact, Compiler, Directive, DiskStore, Node,
    TemplateCompiler,
};
use crate::config::{Config, SiteConfig};
use crate::dispatch::{RerouteContext, RerouteHook};
use crate::error::{TrellisError, TrellisResult};
use crate::render::{
    build, render_child, ChannelDestination, PageEncoder, RenderChunk, RenderContext, Scope,
};
use crate::transport::{upgrade_websocket, EchoSocketHandler, SocketHandler};
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, StatusCode};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, OnceLock, RwLock, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

struct AppInner {
    site: Arc<SiteConfig>,
    source: Arc<dyn TemplateSource>,
    cache: CompilationCache,
    router: RwLock<Router>,
    pages_dir: String,
    dev: bool,
    websocket: bool,
    reroute: OnceLock<Weak<dyn RerouteHook>>,
    sockets: OnceLock<Arc<dyn SocketHandler>>,
}

/// Handle to a running application
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

/// Builder for [`App`]
pub struct AppBuilder {
    source: Arc<dyn TemplateSource>,
    site: SiteConfig,
    compiler: Arc<dyn Compiler>,
    store: Option<Arc<dyn ArtifactStore>>,
    pages_dir: String,
    dev: bool,
    websocket: bool,
}

impl AppBuilder {
    pub fn site(mut self, site: SiteConfig) -> Self {
        self.site = site;
        self
    }

    pub fn compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Enable the persistent cache tier
    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn pages_dir(mut self, dir: impl Into<String>) -> Self {
        self.pages_dir = dir.into();
        self
    }

    /// Recompile changed templates and rescan routes on every request
    pub fn dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    pub fn websocket(mut self, enabled: bool) -> Self {
        self.websocket = enabled;
        self
    }

    pub async fn build(self) -> TrellisResult<App> {
        let mut cache = CompilationCache::new(self.compiler);
        if let Some(store) = self.store {
            cache = cache.with_store(store);
        }

        let app = App {
            inner: Arc::new(AppInner {
                site: Arc::new(self.site),
                source: self.source,
                cache,
                router: RwLock::new(Router::default()),
                pages_dir: self.pages_dir,
                dev: self.dev,
                websocket: self.websocket,
                reroute: OnceLock::new(),
                sockets: OnceLock::new(),
            }),
        };
        app.refresh_routes().await?;
        Ok(app)
    }
}

impl App {
    pub fn builder(source: Arc<dyn TemplateSource>) -> AppBuilder {
        AppBuilder {
            source,
            site: SiteConfig::default(),
            compiler: Arc::new(TemplateCompiler::new()),
            store: None,
            pages_dir: "pages".to_string(),
            dev: false,
            websocket: true,
        }
    }

    /// App for a project described by a loaded configuration
    pub async fn from_config(config: &Config, dev: bool) -> TrellisResult<App> {
        let source = Arc::new(DirSource::new(&config.project.root));
        let mut builder = App::builder(source)
            .site(config.site.clone())
            .pages_dir(config.project.pages_dir.clone())
            .websocket(config.server.websocket)
            .dev(dev);

        if config.cache.persistent {
            let dir = config.compiler_cache_dir();
            debug!("Persistent compiler cache at {}", dir.display());
            builder = builder.store(Arc::new(DiskStore::new(dir)));
        }

        builder.build().await
    }

    /// The compile configuration; its identity keys the in-memory cache
    pub fn config(&self) -> &Arc<SiteConfig> {
        &self.inner.site
    }

    pub fn cache(&self) -> &CompilationCache {
        &self.inner.cache
    }

    pub fn is_dev(&self) -> bool {
        self.inner.dev
    }

    pub fn pages_dir(&self) -> &str {
        &self.inner.pages_dir
    }

    /// Every template under `dir`
    pub async fn templates(&self, dir: &str) -> TrellisResult<Vec<String>> {
        self.inner.source.list(dir).await
    }

    /// Rescan the pages directory
    pub async fn refresh_routes(&self) -> TrellisResult<()> {
        let files = self.inner.source.list(&self.inner.pages_dir).await?;
        let router = Router::from_files(&self.inner.pages_dir, &files);
        debug!("Loaded {} routes", router.routes().len());
        *self
            .inner
            .router
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = router;
        Ok(())
    }

    fn router(&self) -> std::sync::RwLockReadGuard<'_, Router> {
        self.inner
            .router
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn routes(&self) -> Vec<Route> {
        self.router().routes().to_vec()
    }

    pub fn match_route(&self, path: &str) -> Option<RouteMatch> {
        self.router().matches(path)
    }

    pub fn fallback_route(&self) -> Option<RouteMatch> {
        self.router().fallback()
    }

    /// Compiled artifact for a template, through the compilation cache
    pub async fn load(&self, name: &str) -> TrellisResult<Arc<CompiledArtifact>> {
        let site = &self.inner.site;
        if self.inner.dev {
            self.inner.cache.invalidate(site, name);
        } else if let Some(artifact) = self.inner.cache.get(site, name) {
            return Ok(artifact);
        }

        let source = self.inner.source.read(name).await?;
        self.inner.cache.get_or_compile(site, name, &source).await
    }

    /// Drop the in-memory artifact for a template
    pub fn invalidate(&self, name: &str) {
        self.inner.cache.invalidate(&self.inner.site, name);
    }

    /// Register the reroute hook. Allowed once per app.
    pub fn set_reroute_hook(&self, hook: Weak<dyn RerouteHook>) -> TrellisResult<()> {
        self.inner
            .reroute
            .set(hook)
            .map_err(|_| TrellisError::AlreadyRegistered("reroute hook"))
    }

    /// Register the WebSocket handler. Allowed once per app.
    pub fn set_socket_handler(&self, handler: Arc<dyn SocketHandler>) -> TrellisResult<()> {
        self.inner
            .sockets
            .set(handler)
            .map_err(|_| TrellisError::AlreadyRegistered("socket handler"))
    }

    pub fn socket_handler(&self) -> Arc<dyn SocketHandler> {
        self.inner
            .sockets
            .get()
            .cloned()
            .unwrap_or_else(|| Arc::new(EchoSocketHandler))
    }

    /// Internally redirect `request` to `path`, keeping the same locals
    pub async fn reroute(
        &self,
        path: &str,
        request: &Request,
        locals: &Locals,
    ) -> TrellisResult<Response> {
        let hook = self
            .inner
            .reroute
            .get()
            .and_then(|hook| hook.upgrade())
            .ok_or(TrellisError::RerouteUnavailable)?;

        let context = RerouteContext {
            request: request.clone(),
            locals: locals.clone(),
        };
        hook.reroute(path, context).await
    }

    /// Render a matched route.
    ///
    /// Page frontmatter runs first and may reroute or upgrade instead of
    /// rendering. Errors before the first body chunk are returned; later
    /// errors end the body stream.
    pub async fn render(
        &self,
        request: Request,
        route: RouteMatch,
        locals: Locals,
    ) -> TrellisResult<Response> {
        let artifact = self.load(&route.file).await?;

        let mut status = route.status;
        let mut headers = HeaderMap::new();
        let mut cookies = Vec::new();

        for directive in &artifact.frontmatter {
            match directive {
                Directive::Reroute { path } => {
                    debug!("{} reroutes to {}", route.file, path);
                    return self.reroute(path, &request, &locals).await;
                }
                Directive::Upgrade => return self.upgrade(&request, &locals),
                Directive::Status { code } => {
                    status = StatusCode::from_u16(*code)
                        .map_err(|e| TrellisError::render(format!("{}: {}", route.file, e)))?;
                }
                Directive::Set { key, value } => locals.insert(key.clone(), value.clone()),
                Directive::Header { name, value } => {
                    let name = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|e| TrellisError::render(format!("{}: {}", route.file, e)))?;
                    let value = HeaderValue::from_str(value)
                        .map_err(|e| TrellisError::render(format!("{}: {}", route.file, e)))?;
                    headers.append(name, value);
                }
                Directive::Cookie { value } => cookies.push(value.clone()),
            }
        }

        let styles = self.collect_styles(&artifact).await;
        let ctx = RenderContext::new(self.clone(), request, locals, route.params, styles);
        let tree = build(&ctx, &artifact.program, &Scope::default());
        let committed = ctx.commit_flag();

        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut dest = ChannelDestination::new(tx, committed);
            if let Err(e) = render_child(&mut dest, tree).await {
                dest.fail(e);
            }
        });

        let first = match rx.recv().await {
            None => None,
            Some(Err(e)) => return Err(e),
            Some(Ok(RenderChunk::Passthrough(response))) => return Ok(response),
            Some(Ok(chunk)) => Some(chunk),
        };

        let encoder = PageEncoder::new(self.inner.site.as_ref().clone());
        let mut response = Response::html_stream(status, page_stream(first, rx, encoder));
        response.headers.extend(headers);
        for cookie in cookies {
            response.append_cookie(cookie);
        }
        Ok(response)
    }

    fn upgrade(&self, request: &Request, locals: &Locals) -> TrellisResult<Response> {
        if !self.inner.websocket {
            return Err(TrellisError::UpgradeRejected(
                "WebSocket support is disabled".to_string(),
            ));
        }

        let (socket, response) = upgrade_websocket(request)?;
        let handler = self.socket_handler();
        let (request, locals) = (request.clone(), locals.clone());
        tokio::spawn(async move {
            match socket.accept().await {
                Ok(ws) => handler.handle(ws, request, locals).await,
                Err(e) => warn!("WebSocket upgrade failed: {}", e),
            }
        });

        Ok(response)
    }

    /// Stylesheets of the page and every component it can reach.
    ///
    /// Components that fail to load are skipped here; the render reports
    /// them when it reaches them.
    async fn collect_styles(&self, page: &CompiledArtifact) -> Vec<String> {
        let mut styles: Vec<String> = page.css_deps.iter().cloned().collect();
        let mut seen_styles: HashSet<String> = styles.iter().cloned().collect();
        let mut seen_components = HashSet::new();

        let mut queue = VecDeque::new();
        component_sources(&page.program, &mut queue);

        while let Some(src) = queue.pop_front() {
            if !seen_components.insert(src.clone()) {
                continue;
            }
            let artifact = match self.load(&src).await {
                Ok(artifact) => artifact,
                Err(e) => {
                    debug!("Skipping styles of {}: {}", src, e);
                    continue;
                }
            };
            for style in &artifact.css_deps {
                if seen_styles.insert(style.clone()) {
                    styles.push(style.clone());
                }
            }
            component_sources(&artifact.program, &mut queue);
        }

        styles
    }
}

fn component_sources(nodes: &[Node], out: &mut VecDeque<String>) {
    for node in nodes {
        match node {
            Node::Component { src, slots, .. } => {
                out.push_back(src.clone());
                for fill in slots {
                    component_sources(&fill.body, out);
                }
            }
            Node::If {
                then, otherwise, ..
            } => {
                component_sources(then, out);
                component_sources(otherwise, out);
            }
            Node::Slot { fallback, .. } => component_sources(fallback, out),
            _ => {}
        }
    }
}

/// Body stream of a page; a render error is yielded once and ends it
fn page_stream(
    first: Option<RenderChunk>,
    rx: mpsc::UnboundedReceiver<TrellisResult<RenderChunk>>,
    encoder: PageEncoder,
) -> BoxStream<'static, TrellisResult<Bytes>> {
    stream::unfold(
        (first, rx, encoder, false),
        |(mut pending, mut rx, mut encoder, finished)| async move {
            if finished {
                return None;
            }
            loop {
                let next = match pending.take() {
                    Some(chunk) => Ok(chunk),
                    None => match rx.recv().await {
                        Some(item) => item,
                        None => return None,
                    },
                };
                match next {
                    Ok(chunk) => {
                        if let Some(bytes) = encoder.encode(chunk) {
                            return Some((Ok(bytes), (None, rx, encoder, false)));
                        }
                    }
                    Err(e) => return Some((Err(e), (None, rx, encoder, true))),
                }
            }
        },
    )
    .boxed()
}
