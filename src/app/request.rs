//! Request and response types passed between dispatcher, renderer and transport

use crate::error::{TrellisError, TrellisResult};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{BoxStream, StreamExt};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::upgrade::OnUpgrade;
use hyper::{HeaderMap, Method, StatusCode, Uri};
use std::fmt;
use std::sync::{Arc, Mutex};
use url::Url;

/// Header marking the sentinel response of an accepted WebSocket upgrade
pub const UPGRADED_HEADER: &str = "x-upgraded-websocket";

/// Origin that origin-form request targets are resolved against
const REROUTE_BASE: &str = "http://localhost/";

/// An incoming request.
///
/// Clones share the pending connection upgrade, so a rerouted request can
/// still be upgraded by the page it lands on.
#[derive(Clone)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    upgrade: Arc<Mutex<Option<OnUpgrade>>>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            upgrade: Arc::new(Mutex::new(None)),
        }
    }

    /// GET request for a path such as `/blog?page=2`
    pub fn get(uri: &str) -> TrellisResult<Self> {
        let uri = uri
            .parse::<Uri>()
            .map_err(|e| TrellisError::User(format!("Invalid request path {}: {}", uri, e)))?;
        Ok(Self::new(Method::GET, uri))
    }

    /// Convert a request accepted by the HTTP server
    pub fn from_hyper(mut request: hyper::Request<hyper::Body>) -> Self {
        let on_upgrade = hyper::upgrade::on(&mut request);
        let (parts, _body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            upgrade: Arc::new(Mutex::new(Some(on_upgrade))),
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Take the pending connection upgrade, if the transport provided one
    pub fn take_upgrade(&self) -> Option<OnUpgrade> {
        self.upgrade
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Copy of this request aimed at `target`, resolved like a relative URL
    pub fn rerouted(&self, target: &str) -> TrellisResult<Self> {
        let mut next = self.clone();
        next.uri = self.resolve(target)?;
        Ok(next)
    }

    fn resolve(&self, target: &str) -> TrellisResult<Uri> {
        let invalid = |e: &dyn fmt::Display| {
            TrellisError::render(format!("invalid reroute target {}: {}", target, e))
        };

        let base = match self.uri.scheme() {
            Some(_) => Url::parse(&self.uri.to_string()),
            None => Url::parse(REROUTE_BASE).and_then(|origin| {
                let current = self
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                origin.join(current)
            }),
        }
        .map_err(|e| invalid(&e))?;
        let url = base.join(target).map_err(|e| invalid(&e))?;

        let resolved = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        resolved.parse::<Uri>().map_err(|e| invalid(&e))
    }
}

/// Response body
pub enum Body {
    Empty,
    Full(Bytes),
    /// Streamed chunks; an error ends the stream
    Stream(BoxStream<'static, TrellisResult<Bytes>>),
}

impl Body {
    /// Collect the whole body, failing on the first stream error
    pub async fn collect(self) -> TrellisResult<Bytes> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Full(bytes) => write!(f, "Full({} bytes)", bytes.len()),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// An outgoing response.
///
/// `Set-Cookie` values live in a side channel and are appended to the
/// headers by the transport when the response is written.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
    cookies: Vec<String>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
            cookies: Vec::new(),
        }
    }

    /// Plain-text response with status 200
    pub fn text(body: impl Into<String>) -> Self {
        let mut response = Self::new(StatusCode::OK);
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response.body = Body::Full(Bytes::from(body.into()));
        response
    }

    /// Streamed HTML response
    pub fn html_stream(status: StatusCode, stream: BoxStream<'static, TrellisResult<Bytes>>) -> Self {
        let mut response = Self::new(status);
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        response.body = Body::Stream(stream);
        response
    }

    /// Response telling the transport a socket took over the connection
    pub fn upgrade_sentinel() -> Self {
        let mut response = Self::new(StatusCode::SWITCHING_PROTOCOLS);
        response
            .headers
            .insert(UPGRADED_HEADER, HeaderValue::from_static("yes"));
        response
    }

    pub fn is_upgrade_sentinel(&self) -> bool {
        self.headers
            .get(UPGRADED_HEADER)
            .is_some_and(|v| v.as_bytes() == b"yes")
    }

    pub fn append_cookie(&mut self, value: impl Into<String>) {
        self.cookies.push(value.into());
    }

    /// Pending `Set-Cookie` values, in the order they were added
    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    pub fn take_cookies(&mut self) -> Vec<String> {
        std::mem::take(&mut self.cookies)
    }

    /// Keep `guard` alive until the body has been fully read or dropped
    pub fn hold<G: Send + 'static>(mut self, guard: G) -> Self {
        self.body = match std::mem::replace(&mut self.body, Body::Empty) {
            Body::Stream(stream) => Body::Stream(
                stream
                    .map(move |chunk| {
                        let _held = &guard;
                        chunk
                    })
                    .boxed(),
            ),
            other => other,
        };
        self
    }

    /// Collect the body as UTF-8 text
    pub async fn into_text(self) -> TrellisResult<String> {
        let bytes = self.body.collect().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| TrellisError::Internal(format!("response body is not UTF-8: {}", e)))
    }
}
