//! Builds the routing tree from the validated configuration.

use crate::command::{CommandApiHandler, CommandExecutor};
use crate::config::Config;
use crate::debug;
use crate::environment::Environment;
use crate::gate::AdmissionGate;
use crate::pages::{self, PrerenderedPage};
use crate::proxy::{proxy_client, ProxyApiHandler};
use crate::router::Router;
use crate::staticfiles::{StaticDirectoryHandler, StaticFileHandler};
use chrono::Local;
use std::sync::Arc;

/// Construct every handler and register it on one routing tree. The
/// returned router is immutable; all listeners share it.
pub fn create_handlers(config: &Config, environment: &Environment) -> anyhow::Result<Router> {
    let mut builder = Router::builder().log_requests(config.log_requests);
    let cache_control = config.template_page.cache_control_value.as_str();

    let main_html = pages::render_main_page(config, environment, Local::now());
    builder = builder.route("/", Arc::new(PrerenderedPage::new(main_html, cache_control)?));

    for file in &config.static_files {
        builder = builder.route(
            file.http_path.clone(),
            Arc::new(StaticFileHandler::new(
                &file.file_path,
                &file.cache_control_value,
            )?),
        );
    }

    for directory in &config.static_directories {
        builder = builder.route_prefix(
            directory.http_path.clone(),
            Arc::new(StaticDirectoryHandler::new(
                directory.http_path.clone(),
                &directory.directory_path,
                &directory.cache_control_value,
            )?),
        );
    }

    // One gate for all command ids: the concurrency ceiling is global.
    let runner = &config.command_runner;
    let gate = AdmissionGate::new(runner.max_concurrent_commands, runner.acquire_timeout());
    let executor = CommandExecutor::new(runner.request_timeout());

    for command in &runner.commands {
        builder = builder.route(
            format!("/commands/{}.html", command.id),
            Arc::new(PrerenderedPage::new(
                pages::render_command_page(command),
                cache_control,
            )?),
        );
        builder = builder.route(
            format!("/api/commands/{}", command.id),
            Arc::new(CommandApiHandler::new(
                Arc::new(command.clone()),
                gate.clone(),
                executor.clone(),
            )),
        );
    }

    if !config.proxies.is_empty() {
        let client = proxy_client()?;
        for proxy in &config.proxies {
            builder = builder.route(
                format!("/proxies/{}.html", proxy.id),
                Arc::new(PrerenderedPage::new(
                    pages::render_proxy_page(proxy),
                    cache_control,
                )?),
            );
            builder = builder.route(
                format!("/api/proxies/{}", proxy.id),
                Arc::new(ProxyApiHandler::new(Arc::new(proxy.clone()), client.clone())),
            );
        }
    }

    builder = builder.route("/configuration", Arc::new(debug::configuration_page(config)?));
    builder = builder.route("/environment", Arc::new(debug::environment_page(environment)?));
    builder = builder.route("/request_info", Arc::new(debug::RequestInfoHandler));

    Ok(builder.build())
}
