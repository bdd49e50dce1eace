//! Prerendered HTML pages.
//!
//! Every template page is rendered exactly once at startup against the
//! immutable configuration and served from an in-memory string
//! thereafter; no template state is consulted at request time.

use crate::config::{CommandInfo, Config, ProxyConfig};
use crate::environment::Environment;
use crate::router::{html_response, Handler, RequestContext};
use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use hyper::body::Bytes;
use hyper::header::HeaderValue;
use hyper::Response;
use std::fmt::Write;

/// Fixed-width local timestamp with nanosecond precision, e.g.
/// `Tue Aug  4 15:04:05.123456789 +0200 2026`.
pub fn format_time(t: DateTime<Local>) -> String {
    t.format("%a %b %e %H:%M:%S%.9f %z %Y").to_string()
}

pub fn html_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// A page rendered once at startup and served from memory.
pub struct PrerenderedPage {
    body: Bytes,
    cache_control: HeaderValue,
}

impl PrerenderedPage {
    pub fn new(html: String, cache_control: &str) -> anyhow::Result<Self> {
        Ok(Self {
            body: Bytes::from(html),
            cache_control: HeaderValue::from_str(cache_control)
                .map_err(|e| anyhow::anyhow!("invalid cache-control value: {}", e))?,
        })
    }

    pub fn response(&self) -> Response<Bytes> {
        html_response(&self.cache_control, self.body.clone())
    }
}

impl Handler for PrerenderedPage {
    fn handle(&self, _request: RequestContext) -> BoxFuture<'static, Response<Bytes>> {
        let response = self.response();
        Box::pin(async move { response })
    }
}

const PAGE_FOOTER: &str = "</body>\n</html>\n";

fn page_header(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; margin: 1em; }}
pre {{ background: #f4f4f4; padding: 0.5em; overflow-x: auto; }}
li {{ margin: 0.2em 0; }}
</style>
</head>
<body>
"#,
        title = html_escape(title)
    )
}

/// The index page: links to every configured command, proxy, and
/// main-page static directory, plus the debug endpoints.
pub fn render_main_page(
    config: &Config,
    environment: &Environment,
    generated_at: DateTime<Local>,
) -> String {
    let mut html = page_header(&config.main_page.title);
    write!(html, "<h1>{}</h1>\n", html_escape(&config.main_page.title)).expect("write to string");

    if !config.command_runner.commands.is_empty() {
        html.push_str("<h2>Commands</h2>\n<ul>\n");
        for command in &config.command_runner.commands {
            write!(
                html,
                "<li><a href=\"/commands/{id}.html\">{description}</a></li>\n",
                id = html_escape(&command.id),
                description = html_escape(&command.description),
            )
            .expect("write to string");
        }
        html.push_str("</ul>\n");
    }

    if !config.proxies.is_empty() {
        html.push_str("<h2>Proxies</h2>\n<ul>\n");
        for proxy in &config.proxies {
            write!(
                html,
                "<li><a href=\"/proxies/{id}.html\">{description}</a></li>\n",
                id = html_escape(&proxy.id),
                description = html_escape(&proxy.description),
            )
            .expect("write to string");
        }
        html.push_str("</ul>\n");
    }

    let listed_directories: Vec<_> = config
        .static_directories
        .iter()
        .filter(|d| d.include_in_main_page)
        .collect();
    if !listed_directories.is_empty() {
        html.push_str("<h2>Directories</h2>\n<ul>\n");
        for directory in listed_directories {
            write!(
                html,
                "<li><a href=\"{path}\">{path_text}</a></li>\n",
                path = html_escape(&directory.http_path),
                path_text = html_escape(&directory.http_path),
            )
            .expect("write to string");
        }
        html.push_str("</ul>\n");
    }

    html.push_str("<h2>Debug</h2>\n<ul>\n");
    html.push_str("<li><a href=\"/configuration\">configuration</a></li>\n");
    html.push_str("<li><a href=\"/environment\">environment</a></li>\n");
    html.push_str("<li><a href=\"/request_info\">request_info</a></li>\n");
    html.push_str("</ul>\n");

    write!(
        html,
        "<hr>\n<small>{name} {version} &middot; generated {time}</small>\n",
        name = html_escape(environment.package_name()),
        version = html_escape(environment.package_version()),
        time = html_escape(&format_time(generated_at)),
    )
    .expect("write to string");

    html.push_str(PAGE_FOOTER);
    html
}

/// Per-command page. The result pane refreshes itself from the JSON API;
/// the page itself never changes after startup.
pub fn render_command_page(command: &CommandInfo) -> String {
    let mut command_text = command.command.clone();
    for arg in &command.args {
        command_text.push(' ');
        command_text.push_str(arg);
    }

    let api_path = format!("/api/commands/{}", command.id);

    let mut html = page_header(&command.description);
    write!(
        html,
        r#"<h1>{description}</h1>
<label><input type="checkbox" id="autoRefresh" checked> auto refresh</label>
<pre id="output"></pre>
<script>
const apiPath = {api_path_js};
const commandText = {command_text_js};

const updatePre = (text) => {{
    document.getElementById('output').innerText = text;
}};

const handleFetchResponse = (jsonObject) => {{
    let preText = `Now: ${{jsonObject.now}}\n\n`;
    preText += `Command Duration: ${{jsonObject.commandDuration || ''}}\n\n`;
    preText += `$ ${{commandText}}\n\n`;
    preText += jsonObject.commandOutput;
    updatePre(preText);
}};

const fetchData = async () => {{
    try {{
        const response = await fetch(apiPath, {{
            method: 'GET',
            headers: {{ 'Accept': 'application/json' }}
        }});
        handleFetchResponse(await response.json());
    }} catch (error) {{
        console.error('fetch error:', error);
    }}
}};

updatePre(`Now:\n\nCommand Duration:\n\n$ ${{commandText}}`);
fetchData();
setInterval(() => {{
    if (document.getElementById('autoRefresh').checked) {{
        fetchData();
    }}
}}, 1000);
</script>
"#,
        description = html_escape(&command.description),
        api_path_js = js_string(&api_path),
        command_text_js = js_string(&command_text),
    )
    .expect("write to string");

    html.push_str(PAGE_FOOTER);
    html
}

/// Per-proxy page, same shape as the command page against the proxy API.
pub fn render_proxy_page(proxy: &ProxyConfig) -> String {
    let api_path = format!("/api/proxies/{}", proxy.id);

    let mut html = page_header(&proxy.description);
    write!(
        html,
        r#"<h1>{description}</h1>
<label><input type="checkbox" id="autoRefresh" checked> auto refresh</label>
<pre id="output"></pre>
<script>
const apiPath = {api_path_js};
const proxyUrl = {proxy_url_js};

const updatePre = (text) => {{
    document.getElementById('output').innerText = text;
}};

const handleFetchResponse = (jsonObject) => {{
    let preText = `Now: ${{jsonObject.now}}\n\n`;
    preText += `Proxy Duration: ${{jsonObject.proxyDuration || ''}}\n\n`;
    preText += `Proxy Status: ${{jsonObject.proxyStatus || ''}}\n\n`;
    preText += `GET ${{proxyUrl}}\n\n`;
    preText += jsonObject.proxyOutput;
    updatePre(preText);
}};

const fetchData = async () => {{
    try {{
        const response = await fetch(apiPath, {{
            method: 'GET',
            headers: {{ 'Accept': 'application/json' }}
        }});
        handleFetchResponse(await response.json());
    }} catch (error) {{
        console.error('fetch error:', error);
    }}
}};

updatePre(`Now:\n\nProxy Duration:\n\nGET ${{proxyUrl}}`);
fetchData();
setInterval(() => {{
    if (document.getElementById('autoRefresh').checked) {{
        fetchData();
    }}
}}, 1000);
</script>
"#,
        description = html_escape(&proxy.description),
        api_path_js = js_string(&api_path),
        proxy_url_js = js_string(&proxy.url),
    )
    .expect("write to string");

    html.push_str(PAGE_FOOTER);
    html
}

/// Debug page: a title over a preformatted text block.
pub fn render_debug_page(title: &str, pre_text: &str) -> String {
    let mut html = page_header(title);
    write!(
        html,
        "<h1>{title}</h1>\n<pre>{pre_text}</pre>\n",
        title = html_escape(title),
        pre_text = html_escape(pre_text),
    )
    .expect("write to string");
    html.push_str(PAGE_FOOTER);
    html
}

/// Serialize a string as a JS string literal for embedding in a page.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).expect("string serializes to JSON")
}
