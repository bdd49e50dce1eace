//! The request-routing tree shared by every listener.
//!
//! The tree is immutable after construction, so all listeners can
//! dispatch into it concurrently without synchronization. Handlers see a
//! transport-neutral [`RequestContext`] so that HTTP/1.1, HTTP/2, and
//! HTTP/3 requests all flow through the same tree.

use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode, Uri, Version};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

pub const CONTENT_TYPE_TEXT_HTML: &str = "text/html";
pub const CONTENT_TYPE_TEXT_PLAIN: &str = "text/plain";
pub const CONTENT_TYPE_APPLICATION_JSON: &str = "application/json";
pub const MAX_AGE_ZERO: &str = "max-age=0";

/// Transport-neutral view of one request. Bodies are never consumed by
/// any handler (the whole surface is GET-shaped), so only the head is
/// carried.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub remote_addr: SocketAddr,
    pub tls: bool,
}

/// One node of the routing tree.
pub trait Handler: Send + Sync {
    fn handle(&self, request: RequestContext) -> BoxFuture<'static, Response<Bytes>>;
}

/// Immutable routing tree: exact paths first, then prefix routes in
/// registration order, then 404.
pub struct Router {
    exact: HashMap<String, Arc<dyn Handler>>,
    prefixes: Vec<(String, Arc<dyn Handler>)>,
    log_requests: bool,
}

pub struct RouterBuilder {
    exact: HashMap<String, Arc<dyn Handler>>,
    prefixes: Vec<(String, Arc<dyn Handler>)>,
    log_requests: bool,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder {
            exact: HashMap::new(),
            prefixes: Vec::new(),
            log_requests: false,
        }
    }

    fn lookup(&self, path: &str) -> Option<&Arc<dyn Handler>> {
        if let Some(handler) = self.exact.get(path) {
            return Some(handler);
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, handler)| handler)
    }

    pub async fn dispatch(&self, request: RequestContext) -> Response<Bytes> {
        let started = Instant::now();
        let method = request.method.clone();
        let path = request.uri.path().to_string();
        let version = request.version;
        let remote_addr = request.remote_addr;

        let response = match self.lookup(&path) {
            Some(handler) => handler.handle(request).await,
            None => not_found(),
        };

        if self.log_requests {
            info!(
                target: "access",
                remote = %remote_addr,
                method = %method,
                path = %path,
                version = ?version,
                status = response.status().as_u16(),
                bytes = response.body().len(),
                duration_ms = started.elapsed().as_millis() as u64,
                request_id = %Uuid::new_v4(),
                "request"
            );
        }

        response
    }
}

impl RouterBuilder {
    pub fn log_requests(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    /// Register a handler for an exact request path.
    pub fn route(mut self, path: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.exact.insert(path.into(), handler);
        self
    }

    /// Register a handler for all paths under a prefix.
    pub fn route_prefix(mut self, prefix: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.prefixes.push((prefix.into(), handler));
        self
    }

    pub fn build(self) -> Router {
        Router {
            exact: self.exact,
            prefixes: self.prefixes,
            log_requests: self.log_requests,
        }
    }
}

/// 404 response matching the shape clients of the original expect.
pub fn not_found() -> Response<Bytes> {
    plain_text_response(StatusCode::NOT_FOUND, "404 page not found\n")
}

pub fn plain_text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Bytes> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, CONTENT_TYPE_TEXT_PLAIN)
        .header(CACHE_CONTROL, MAX_AGE_ZERO)
        .body(body.into())
        .expect("valid response with static headers")
}

pub fn html_response(cache_control: &HeaderValue, body: Bytes) -> Response<Bytes> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, CONTENT_TYPE_TEXT_HTML)
        .header(CACHE_CONTROL, cache_control)
        .body(body)
        .expect("valid response with static headers")
}

pub fn json_response(body: Bytes) -> Response<Bytes> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, CONTENT_TYPE_APPLICATION_JSON)
        .header(CACHE_CONTROL, MAX_AGE_ZERO)
        .body(body)
        .expect("valid response with static headers")
}

#[cfg(test)]
pub(crate) fn test_request(path: &str) -> RequestContext {
    RequestContext {
        method: Method::GET,
        uri: path.parse().expect("valid test uri"),
        version: Version::HTTP_11,
        headers: HeaderMap::new(),
        remote_addr: "127.0.0.1:9999".parse().expect("valid test addr"),
        tls: false,
    }
}
