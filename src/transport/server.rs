//! HTTP/1 server over hyper

use crate::app::{Body, Request, Response, UPGRADED_HEADER};
use crate::dispatch::Dispatcher;
use crate::error::{TrellisError, TrellisResult};
use bytes::Bytes;
use futures_util::{future, StreamExt};
use hyper::header::{HeaderValue, SET_COOKIE};
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::StatusCode;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Appended to a page whose render fails after the body started
const STREAM_ERROR_CHUNK: &[u8] = b"Internal server error";

/// Listening HTTP server
pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    pub async fn bind(addr: &str, dispatcher: Arc<Dispatcher>) -> TrellisResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TrellisError::io(format!("binding {}", addr), e))?;
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> TrellisResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| TrellisError::io("reading listener address", e))
    }

    /// Accept connections until `shutdown` resolves
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> TrellisResult<()> {
        info!("Listening on http://{}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                let service = service_fn(move |request| {
                    let dispatcher = dispatcher.clone();
                    async move { Ok::<_, Infallible>(handle(&dispatcher, request).await) }
                });

                let connection = Http::new()
                    .http1_only(true)
                    .serve_connection(stream, service)
                    .with_upgrades();
                if let Err(e) = connection.await {
                    debug!("Connection from {} ended: {}", peer, e);
                }
            });
        }
    }
}

/// Dispatch one request, turning errors into plain responses
pub async fn handle(
    dispatcher: &Dispatcher,
    request: hyper::Request<hyper::Body>,
) -> hyper::Response<hyper::Body> {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = match dispatcher.handle(Request::from_hyper(request)).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    };

    debug!(
        "{} {} {} ({:?})",
        method,
        uri,
        response.status.as_u16(),
        start.elapsed()
    );
    into_hyper(response)
}

/// Response for an error reaching the outermost handler.
///
/// Diagnostics are logged and never sent to the client.
pub fn error_response(err: &TrellisError) -> Response {
    let status = err.status_code();
    let body = match status {
        StatusCode::NOT_FOUND => "Not found",
        StatusCode::BAD_REQUEST => "Bad request",
        _ => {
            error!("Request failed: {}", err);
            let mut source = std::error::Error::source(err);
            while let Some(cause) = source {
                error!("  caused by: {}", cause);
                source = cause.source();
            }
            "Server error"
        }
    };

    let mut response = Response::text(body);
    response.status = status;
    response
}

/// Write a response for hyper, appending the cookie side channel
pub fn into_hyper(mut response: Response) -> hyper::Response<hyper::Body> {
    let cookies = response.take_cookies();

    let body = if response.is_upgrade_sentinel() {
        response.headers.remove(UPGRADED_HEADER);
        hyper::Body::empty()
    } else {
        match response.body {
            Body::Empty => hyper::Body::empty(),
            Body::Full(bytes) => hyper::Body::from(bytes),
            Body::Stream(stream) => {
                let chunks = stream.scan(false, |failed, item| {
                    if *failed {
                        return future::ready(None);
                    }
                    let chunk = match item {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            error!("Render failed mid-stream: {}", e);
                            *failed = true;
                            Bytes::from_static(STREAM_ERROR_CHUNK)
                        }
                    };
                    future::ready(Some(Ok::<_, Infallible>(chunk)))
                });
                hyper::Body::wrap_stream(chunks)
            }
        }
    };

    let mut out = hyper::Response::new(body);
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                out.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => warn!("Dropping invalid cookie {:?}: {}", cookie, e),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    async fn body_text(response: hyper::Response<hyper::Body>) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn cookies_become_set_cookie_headers() {
        let mut response = Response::text("ok");
        response.append_cookie("a=1; Path=/");
        response.append_cookie("b=2");

        let out = into_hyper(response);
        let cookies: Vec<_> = out.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies, ["a=1; Path=/", "b=2"]);
        assert_eq!(body_text(out).await, "ok");
    }

    #[tokio::test]
    async fn stream_error_appends_message_and_ends() {
        let response = Response::html_stream(
            StatusCode::OK,
            stream::iter(vec![
                Ok(Bytes::from("<p>a</p>")),
                Err(TrellisError::render("boom")),
                Ok(Bytes::from("<p>b</p>")),
            ])
            .boxed(),
        );

        let out = into_hyper(response);
        assert_eq!(out.status(), StatusCode::OK);
        assert_eq!(body_text(out).await, "<p>a</p>Internal server error");
    }

    #[tokio::test]
    async fn upgrade_sentinel_has_no_body_or_marker() {
        let out = into_hyper(Response::upgrade_sentinel());
        assert_eq!(out.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert!(out.headers().get(UPGRADED_HEADER).is_none());
        assert_eq!(body_text(out).await, "");
    }

    #[tokio::test]
    async fn errors_hide_diagnostics() {
        let not_found = error_response(&TrellisError::RouteNotFound("/x".into()));
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.into_text().await.unwrap(), "Not found");

        let failed = error_response(&TrellisError::render("secret detail"));
        assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(failed.into_text().await.unwrap(), "Server error");
    }
}
