use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Global configuration for the dashboard server
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Log each request to the access log (default: false)
    #[serde(default)]
    pub log_requests: bool,

    /// Listeners to start; all serve the same routing tree
    pub listeners: Vec<ListenerConfig>,

    /// Main page settings
    #[serde(default)]
    pub main_page: MainPageConfig,

    /// Settings shared by all prerendered template pages
    #[serde(default)]
    pub template_page: TemplatePageConfig,

    /// Individual files served from disk
    #[serde(default)]
    pub static_files: Vec<StaticFileConfig>,

    /// Directories served from disk
    #[serde(default)]
    pub static_directories: Vec<StaticDirectoryConfig>,

    /// Command runner settings and the commands it exposes
    #[serde(default)]
    pub command_runner: CommandRunnerConfig,

    /// Proxy passthrough targets
    #[serde(default)]
    pub proxies: Vec<ProxyConfig>,
}

/// One network listener. All listeners share the routing tree; the
/// `quic` variant binds both a UDP socket (HTTP/3) and a TLS TCP socket
/// (Alt-Svc discovery) on the same address.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ListenerConfig {
    Plain {
        address: SocketAddr,
    },
    Tls {
        address: SocketAddr,
        cert_file: String,
        key_file: String,
        /// Per-read deadline in milliseconds (unset: no deadline)
        read_timeout_ms: Option<u64>,
        /// Per-write deadline in milliseconds (unset: no deadline)
        write_timeout_ms: Option<u64>,
    },
    Quic {
        address: SocketAddr,
        cert_file: String,
        key_file: String,
        /// Port to advertise in Alt-Svc instead of the bound port
        /// (needed when the externally reachable port differs, e.g. NAT)
        alt_svc_port: Option<u16>,
        /// Substring rewrite applied to the outgoing Alt-Svc header value
        alt_svc_rewrite: Option<AltSvcRewriteConfig>,
    },
}

impl ListenerConfig {
    pub fn address(&self) -> SocketAddr {
        match self {
            ListenerConfig::Plain { address } => *address,
            ListenerConfig::Tls { address, .. } => *address,
            ListenerConfig::Quic { address, .. } => *address,
        }
    }
}

/// Exact substring replacement rule for the Alt-Svc header value
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AltSvcRewriteConfig {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MainPageConfig {
    /// Title of the main page (default: "Operator Dashboard")
    #[serde(default = "default_main_page_title")]
    pub title: String,
}

impl Default for MainPageConfig {
    fn default() -> Self {
        Self {
            title: default_main_page_title(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TemplatePageConfig {
    /// Cache-control header value for prerendered pages (default: max-age=60)
    #[serde(default = "default_template_cache_control")]
    pub cache_control_value: String,
}

impl Default for TemplatePageConfig {
    fn default() -> Self {
        Self {
            cache_control_value: default_template_cache_control(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StaticFileConfig {
    /// Exact request path, e.g. "/favicon.ico"
    pub http_path: String,
    /// File to serve
    pub file_path: String,
    #[serde(default = "default_template_cache_control")]
    pub cache_control_value: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StaticDirectoryConfig {
    /// Request path prefix, e.g. "/static/"
    pub http_path: String,
    /// Directory served under the prefix
    pub directory_path: String,
    #[serde(default = "default_template_cache_control")]
    pub cache_control_value: String,
    /// Link the directory from the main page (default: false)
    #[serde(default)]
    pub include_in_main_page: bool,
}

/// Settings for the bounded command runner
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommandRunnerConfig {
    /// Hard ceiling on concurrently running commands, across all ids
    #[serde(default = "default_max_concurrent_commands")]
    pub max_concurrent_commands: usize,

    /// Execution deadline for one command in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How long a request may wait for a command slot in milliseconds
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Commands exposed under /api/commands/{id} and /commands/{id}.html
    #[serde(default)]
    pub commands: Vec<CommandInfo>,
}

impl CommandRunnerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl Default for CommandRunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_commands: default_max_concurrent_commands(),
            request_timeout_ms: default_request_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            commands: Vec::new(),
        }
    }
}

/// One preconfigured command. The command is spawned with the args as a
/// discrete vector; nothing here is ever passed through a shell.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommandInfo {
    pub id: String,
    pub description: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// One proxy passthrough target, exposed under /api/proxies/{id}
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProxyConfig {
    pub id: String,
    pub description: String,
    pub url: String,
}

fn default_main_page_title() -> String {
    "Operator Dashboard".to_string()
}

fn default_template_cache_control() -> String {
    "max-age=60".to_string()
}

fn default_max_concurrent_commands() -> usize {
    2
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_acquire_timeout_ms() -> u64 {
    1_000
}

fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if self.listeners.is_empty() {
            errors.push("at least one listener must be configured".to_string());
        }

        if self.command_runner.max_concurrent_commands < 1 {
            errors.push("command_runner.max_concurrent_commands must be >= 1".to_string());
        }

        let mut command_ids = HashSet::new();
        for command in &self.command_runner.commands {
            if !valid_id(&command.id) {
                errors.push(format!("invalid command id '{}'", command.id));
            }
            if !command_ids.insert(command.id.as_str()) {
                errors.push(format!("duplicate command id '{}'", command.id));
            }
            if command.command.is_empty() {
                errors.push(format!("command id '{}' has an empty command", command.id));
            }
        }

        let mut proxy_ids = HashSet::new();
        for proxy in &self.proxies {
            if !valid_id(&proxy.id) {
                errors.push(format!("invalid proxy id '{}'", proxy.id));
            }
            if !proxy_ids.insert(proxy.id.as_str()) {
                errors.push(format!("duplicate proxy id '{}'", proxy.id));
            }
        }

        for directory in &self.static_directories {
            if !directory.http_path.starts_with('/') {
                errors.push(format!(
                    "static directory http_path '{}' must start with '/'",
                    directory.http_path
                ));
            }
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            [[listeners]]
            protocol = "plain"
            address = "127.0.0.1:8080"
        "#
    }

    #[test]
    fn test_minimal_config_parses() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.listeners.len(), 1);
        assert!(!config.log_requests);
        assert_eq!(config.command_runner.max_concurrent_commands, 2);
        assert_eq!(config.main_page.title, "Operator Dashboard");
    }

    #[test]
    fn test_full_config_parses() {
        let toml_text = r#"
            log_requests = true

            [[listeners]]
            protocol = "plain"
            address = "0.0.0.0:8080"

            [[listeners]]
            protocol = "tls"
            address = "0.0.0.0:8443"
            cert_file = "/etc/ssl/cert.pem"
            key_file = "/etc/ssl/key.pem"
            read_timeout_ms = 5000
            write_timeout_ms = 5000

            [[listeners]]
            protocol = "quic"
            address = "0.0.0.0:443"
            cert_file = "/etc/ssl/cert.pem"
            key_file = "/etc/ssl/key.pem"
            alt_svc_port = 8443

            [listeners.alt_svc_rewrite]
            from = ":443"
            to = ":8443"

            [main_page]
            title = "pi"

            [template_page]
            cache_control_value = "max-age=120"

            [[static_files]]
            http_path = "/favicon.ico"
            file_path = "static/favicon.ico"

            [[static_directories]]
            http_path = "/static/"
            directory_path = "static"
            include_in_main_page = true

            [command_runner]
            max_concurrent_commands = 3
            request_timeout_ms = 2000
            acquire_timeout_ms = 500

            [[command_runner.commands]]
            id = "uptime"
            description = "system uptime"
            command = "/usr/bin/uptime"

            [[command_runner.commands]]
            id = "df"
            description = "disk usage"
            command = "/bin/df"
            args = ["-h"]

            [[proxies]]
            id = "weather"
            description = "local weather"
            url = "http://weather.example/api"
        "#;

        let config: Config = toml::from_str(toml_text).unwrap();
        config.validate().unwrap();

        assert_eq!(config.listeners.len(), 3);
        match &config.listeners[2] {
            ListenerConfig::Quic {
                alt_svc_port,
                alt_svc_rewrite,
                ..
            } => {
                assert_eq!(*alt_svc_port, Some(8443));
                let rewrite = alt_svc_rewrite.as_ref().unwrap();
                assert_eq!(rewrite.from, ":443");
                assert_eq!(rewrite.to, ":8443");
            }
            other => panic!("expected quic listener, got {:?}", other),
        }
        assert_eq!(config.command_runner.commands.len(), 2);
        assert_eq!(config.command_runner.commands[1].args, vec!["-h"]);
        assert_eq!(
            config.command_runner.request_timeout(),
            Duration::from_millis(2000)
        );
        assert_eq!(config.proxies[0].id, "weather");
    }

    #[test]
    fn test_duplicate_command_id_rejected() {
        let toml_text = r#"
            [[listeners]]
            protocol = "plain"
            address = "127.0.0.1:8080"

            [[command_runner.commands]]
            id = "uptime"
            description = "a"
            command = "/usr/bin/uptime"

            [[command_runner.commands]]
            id = "uptime"
            description = "b"
            command = "/usr/bin/uptime"
        "#;

        let config: Config = toml::from_str(toml_text).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate command id 'uptime'"), "{err}");
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let toml_text = r#"
            [[listeners]]
            protocol = "plain"
            address = "127.0.0.1:8080"

            [command_runner]
            max_concurrent_commands = 0
        "#;

        let config: Config = toml::from_str(toml_text).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_concurrent_commands"), "{err}");
    }

    #[test]
    fn test_no_listeners_rejected() {
        let config: Config = toml::from_str("listeners = []").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_command_id_rejected() {
        let toml_text = r#"
            [[listeners]]
            protocol = "plain"
            address = "127.0.0.1:8080"

            [[command_runner.commands]]
            id = "up/time"
            description = "a"
            command = "/usr/bin/uptime"
        "#;

        let config: Config = toml::from_str(toml_text).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid command id"), "{err}");
    }
}
