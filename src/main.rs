use opsboard::config::{Config, ListenerConfig};
use opsboard::environment::{Environment, PKG_NAME, VERSION};
use opsboard::{handlers, server};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("opsboard=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path.display(), error = %e, "Failed to load configuration");
        e
    })?;

    info!(path = %config_path.display(), "Configuration loaded");

    // Snapshot the process environment once; handlers only ever see
    // this immutable copy.
    let environment = Environment::capture();

    print_startup_banner(&config);

    let router = Arc::new(handlers::create_handlers(&config, &environment)?);

    let listener_tasks: Vec<_> = config
        .listeners
        .iter()
        .cloned()
        .map(|listener| server::listener_task(listener, Arc::clone(&router)))
        .collect();

    // Run until the first listener failure or a termination signal.
    // There is no graceful drain: in-flight requests and commands are
    // abandoned when the process exits.
    tokio::select! {
        err = server::supervise(listener_tasks) => {
            error!(error = %err, "Listener failed, stopping");
        }
        signal = shutdown_signal() => {
            error!(signal, "Signal received, stopping");
        }
    }

    std::process::exit(1);
}

async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        "interrupt"
    }
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting dashboard server");

    for listener in &config.listeners {
        let protocol = match listener {
            ListenerConfig::Plain { .. } => "http",
            ListenerConfig::Tls { .. } => "https",
            ListenerConfig::Quic { .. } => "http3",
        };
        info!(protocol, addr = %listener.address(), "Configured listener");
    }

    info!(
        max_concurrent_commands = config.command_runner.max_concurrent_commands,
        request_timeout_ms = config.command_runner.request_timeout_ms,
        acquire_timeout_ms = config.command_runner.acquire_timeout_ms,
        command_count = config.command_runner.commands.len(),
        "Command runner configured"
    );

    info!(
        static_files = config.static_files.len(),
        static_directories = config.static_directories.len(),
        proxies = config.proxies.len(),
        log_requests = config.log_requests,
        "Handlers configured"
    );
}
