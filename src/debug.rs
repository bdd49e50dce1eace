//! Introspection endpoints: /configuration, /environment, /request_info.

use crate::config::Config;
use crate::environment::Environment;
use crate::pages::{render_debug_page, PrerenderedPage};
use crate::router::{html_response, Handler, RequestContext, MAX_AGE_ZERO};
use futures::future::BoxFuture;
use hyper::body::Bytes;
use hyper::header::HeaderValue;
use hyper::Response;
use std::fmt::Write;

/// The running configuration as a pretty-printed JSON page, rendered
/// once at startup.
pub fn configuration_page(config: &Config) -> anyhow::Result<PrerenderedPage> {
    let json = serde_json::to_string_pretty(config)?;
    PrerenderedPage::new(render_debug_page("Configuration", &json), MAX_AGE_ZERO)
}

/// The startup environment snapshot as a pretty-printed JSON page.
pub fn environment_page(environment: &Environment) -> anyhow::Result<PrerenderedPage> {
    let json = serde_json::to_string_pretty(environment)?;
    PrerenderedPage::new(render_debug_page("Environment", &json), MAX_AGE_ZERO)
}

/// Renders the live request head: the one debug page that cannot be
/// prerendered.
pub struct RequestInfoHandler;

impl RequestInfoHandler {
    fn render(request: &RequestContext) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "Method: {}", request.method);
        let _ = writeln!(text, "Version: {:?}", request.version);
        let _ = writeln!(text, "URI: {}", request.uri);
        let _ = writeln!(text, "RemoteAddr: {}", request.remote_addr);
        let _ = writeln!(text, "TLS: {}", request.tls);
        text.push('\n');
        text.push_str("Request Headers:\n");

        let mut names: Vec<&str> = request.headers.keys().map(|name| name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        for name in names {
            let values: Vec<String> = request
                .headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect();
            let _ = writeln!(text, "{}: {}", name, values.join(", "));
        }

        text
    }
}

impl Handler for RequestInfoHandler {
    fn handle(&self, request: RequestContext) -> BoxFuture<'static, Response<Bytes>> {
        let html = render_debug_page("Request Info", &Self::render(&request));
        Box::pin(async move {
            html_response(&HeaderValue::from_static(MAX_AGE_ZERO), Bytes::from(html))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::test_request;
    use hyper::header::{HeaderValue as TestHeaderValue, CACHE_CONTROL};
    use hyper::StatusCode;

    #[tokio::test]
    async fn test_request_info_reports_headers_sorted() {
        let mut request = test_request("/request_info");
        request
            .headers
            .insert("x-beta", TestHeaderValue::from_static("2"));
        request
            .headers
            .insert("x-alpha", TestHeaderValue::from_static("1"));

        let response = RequestInfoHandler.handle(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CACHE_CONTROL).unwrap(), "max-age=0");

        let body = String::from_utf8(response.body().to_vec()).unwrap();
        let alpha = body.find("x-alpha: 1").unwrap();
        let beta = body.find("x-beta: 2").unwrap();
        assert!(alpha < beta);
        assert!(body.contains("Method: GET"));
    }

    #[tokio::test]
    async fn test_configuration_page_embeds_config_json() {
        let config: Config = toml::from_str(
            r#"
                [[listeners]]
                protocol = "plain"
                address = "127.0.0.1:8080"
            "#,
        )
        .unwrap();

        let page = configuration_page(&config).unwrap();
        let response = page.handle(test_request("/configuration")).await;
        let body = String::from_utf8(response.body().to_vec()).unwrap();

        assert!(body.contains("Configuration"));
        assert!(body.contains("127.0.0.1:8080"));
        assert_eq!(response.headers().get(CACHE_CONTROL).unwrap(), "max-age=0");
    }

    #[tokio::test]
    async fn test_environment_page_renders() {
        let page = environment_page(&Environment::capture()).unwrap();
        let response = page.handle(test_request("/environment")).await;
        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("Environment"));
        assert!(body.contains("packageName"));
    }
}
