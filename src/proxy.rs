//! Proxy passthrough API.
//!
//! `GET /api/proxies/{id}` fetches the configured URL and returns the
//! upstream status, headers, and body as JSON. Unlike the command
//! endpoints, a failed upstream fetch is an infrastructure problem and
//! surfaces as HTTP 500.

use crate::config::ProxyConfig;
use crate::pages::format_time;
use crate::router::{json_response, plain_text_response, Handler, RequestContext};
use chrono::Local;
use futures::future::BoxFuture;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Budget for one upstream fetch.
const PROXY_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the shared outbound HTTP client.
pub fn proxy_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(PROXY_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build proxy HTTP client: {}", e))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyApiResponse<'a> {
    id: &'a str,
    description: &'a str,
    url: &'a str,
    now: String,
    proxy_duration: String,
    proxy_status: String,
    proxy_resp_headers: BTreeMap<String, Vec<String>>,
    proxy_output: String,
}

pub struct ProxyApiHandler {
    info: Arc<ProxyConfig>,
    client: reqwest::Client,
}

impl ProxyApiHandler {
    pub fn new(info: Arc<ProxyConfig>, client: reqwest::Client) -> Self {
        Self { info, client }
    }

    async fn fetch(info: Arc<ProxyConfig>, client: reqwest::Client) -> Response<Bytes> {
        let started = Instant::now();
        let result = async {
            let upstream = client.get(&info.url).send().await?;
            let status = upstream.status();
            let headers: BTreeMap<String, Vec<String>> = {
                let mut map = BTreeMap::new();
                for (name, value) in upstream.headers() {
                    map.entry(name.as_str().to_string())
                        .or_insert_with(Vec::new)
                        .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
                }
                map
            };
            let body = upstream.text().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        }
        .await;
        let elapsed = started.elapsed();

        let (status, headers, body) = match result {
            Ok(parts) => parts,
            Err(e) => {
                warn!(id = %info.id, url = %info.url, error = %e, "Proxy request failed");
                return plain_text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        };

        let payload = ProxyApiResponse {
            id: &info.id,
            description: &info.description,
            url: &info.url,
            now: format_time(Local::now()),
            proxy_duration: format!("{:.9} sec", elapsed.as_secs_f64()),
            proxy_status: format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            ),
            proxy_resp_headers: headers,
            proxy_output: body,
        };

        match serde_json::to_vec(&payload) {
            Ok(body) => json_response(Bytes::from(body)),
            Err(e) => plain_text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }
}

impl Handler for ProxyApiHandler {
    fn handle(&self, _request: RequestContext) -> BoxFuture<'static, Response<Bytes>> {
        let info = Arc::clone(&self.info);
        let client = self.client.clone();
        Box::pin(Self::fetch(info, client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::test_request;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal one-shot HTTP upstream for exercising the passthrough.
    async fn spawn_upstream(status_line: &'static str, body: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "{status_line}\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        addr
    }

    fn handler_for(url: String) -> ProxyApiHandler {
        ProxyApiHandler::new(
            Arc::new(ProxyConfig {
                id: "test".to_string(),
                description: "test proxy".to_string(),
                url,
            }),
            proxy_client().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_passthrough_reports_status_headers_and_body() {
        let addr = spawn_upstream("HTTP/1.1 200 OK", "upstream says hi").await;
        let handler = handler_for(format!("http://{}/data", addr));

        let response = handler.handle(test_request("/api/proxies/test")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(json["id"], "test");
        assert_eq!(json["proxyStatus"], "200 OK");
        assert_eq!(json["proxyOutput"], "upstream says hi");
        assert_eq!(json["proxyRespHeaders"]["content-type"][0], "text/plain");
        assert!(json["proxyDuration"].as_str().unwrap().ends_with(" sec"));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_500() {
        // Reserved port on localhost with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let handler = handler_for(format!("http://{}/", addr));
        let response = handler.handle(test_request("/api/proxies/test")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
