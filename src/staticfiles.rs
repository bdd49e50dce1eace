//! Static file and directory serving.

use crate::router::{not_found, Handler, RequestContext};
use futures::future::BoxFuture;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("ico") => "image/x-icon",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("xml") => "application/xml",
        _ => "application/octet-stream",
    }
}

async fn serve_file(path: PathBuf, cache_control: HeaderValue) -> Response<Bytes> {
    match tokio::fs::read(&path).await {
        Ok(contents) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, content_type_for(&path))
            .header(CACHE_CONTROL, cache_control)
            .body(Bytes::from(contents))
            .expect("valid response with static headers"),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Static file not readable");
            not_found()
        }
    }
}

/// Serves one file at one exact path.
pub struct StaticFileHandler {
    file_path: PathBuf,
    cache_control: HeaderValue,
}

impl StaticFileHandler {
    pub fn new(file_path: impl Into<PathBuf>, cache_control: &str) -> anyhow::Result<Self> {
        Ok(Self {
            file_path: file_path.into(),
            cache_control: HeaderValue::from_str(cache_control)
                .map_err(|e| anyhow::anyhow!("invalid cache-control value: {}", e))?,
        })
    }
}

impl Handler for StaticFileHandler {
    fn handle(&self, _request: RequestContext) -> BoxFuture<'static, Response<Bytes>> {
        let path = self.file_path.clone();
        let cache_control = self.cache_control.clone();
        Box::pin(serve_file(path, cache_control))
    }
}

/// Serves a directory under a path prefix.
pub struct StaticDirectoryHandler {
    http_prefix: String,
    root: PathBuf,
    cache_control: HeaderValue,
}

impl StaticDirectoryHandler {
    pub fn new(
        http_prefix: impl Into<String>,
        root: impl Into<PathBuf>,
        cache_control: &str,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http_prefix: http_prefix.into(),
            root: root.into(),
            cache_control: HeaderValue::from_str(cache_control)
                .map_err(|e| anyhow::anyhow!("invalid cache-control value: {}", e))?,
        })
    }

    /// Map a request path to a file under the root. Rejects anything
    /// that would escape the root.
    fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let relative = request_path.strip_prefix(self.http_prefix.as_str())?;
        let relative = Path::new(relative);

        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }

        Some(self.root.join(relative))
    }
}

impl Handler for StaticDirectoryHandler {
    fn handle(&self, request: RequestContext) -> BoxFuture<'static, Response<Bytes>> {
        match self.resolve(request.uri.path()) {
            Some(path) => {
                let cache_control = self.cache_control.clone();
                Box::pin(serve_file(path, cache_control))
            }
            None => Box::pin(async { not_found() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::test_request;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a/b.html")), "text/html");
        assert_eq!(content_type_for(Path::new("a.js")), "application/javascript");
        assert_eq!(content_type_for(Path::new("a.unknown")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_serves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("hello.txt");
        std::fs::write(&file_path, b"hello static").unwrap();

        let handler = StaticFileHandler::new(&file_path, "max-age=300").unwrap();
        let response = handler.handle(test_request("/hello.txt")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CACHE_CONTROL).unwrap(), "max-age=300");
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(response.body().as_ref(), b"hello static");
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let handler = StaticFileHandler::new("/no/such/file.txt", "max-age=0").unwrap();
        let response = handler.handle(test_request("/file.txt")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_directory_serves_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/app.js"), b"console.log(1)").unwrap();

        let handler = StaticDirectoryHandler::new("/static/", dir.path(), "max-age=60").unwrap();
        let response = handler.handle(test_request("/static/js/app.js")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/javascript"
        );
        assert_eq!(response.body().as_ref(), b"console.log(1)");
    }

    #[tokio::test]
    async fn test_directory_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("inside.txt"), b"inside").unwrap();

        let handler = StaticDirectoryHandler::new("/static/", dir.path(), "max-age=60").unwrap();
        let response = handler
            .handle(test_request("/static/../../etc/passwd"))
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
