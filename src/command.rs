//! The bounded command-execution gateway.
//!
//! Every command id shares one [`AdmissionGate`], so the concurrency
//! ceiling is global. Command failures of any kind (slot exhaustion,
//! spawn errors, non-zero exits, deadline overruns) are returned to the
//! client as diagnostic payload in an HTTP 200 response; the only path
//! that produces a transport-level error is JSON serialization.

use crate::config::CommandInfo;
use crate::gate::AdmissionGate;
use crate::pages::format_time;
use crate::router::{json_response, plain_text_response, Handler, RequestContext};
use chrono::Local;
use futures::future::BoxFuture;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Outcome of one process execution. Never an error: failures are data.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub succeeded: bool,
    pub combined_output: String,
}

/// Runs one external process under a deadline and captures its output.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    request_timeout: Duration,
}

impl CommandExecutor {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    /// Spawn `info.command` with `info.args` as a discrete argv vector.
    /// No shell is ever involved, so configured arguments cannot be
    /// reinterpreted as shell syntax.
    pub async fn run(&self, info: &CommandInfo) -> ExecutionOutcome {
        let mut cmd = Command::new(&info.command);
        cmd.args(&info.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(id = %info.id, command = %info.command, error = %e, "Failed to spawn command");
                return ExecutionOutcome {
                    succeeded: false,
                    combined_output: format!("command error: {}", e),
                };
            }
        };

        match tokio::time::timeout(self.request_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if output.status.success() {
                    let mut combined =
                        Vec::with_capacity(output.stdout.len() + output.stderr.len());
                    combined.extend_from_slice(&output.stdout);
                    combined.extend_from_slice(&output.stderr);
                    ExecutionOutcome {
                        succeeded: true,
                        combined_output: String::from_utf8_lossy(&combined).into_owned(),
                    }
                } else {
                    ExecutionOutcome {
                        succeeded: false,
                        combined_output: format!("command error: {}", output.status),
                    }
                }
            }
            Ok(Err(e)) => ExecutionOutcome {
                succeeded: false,
                combined_output: format!("command error: {}", e),
            },
            Err(_) => {
                // The dropped wait future kills the child (kill_on_drop),
                // so nothing outlives the request.
                warn!(id = %info.id, timeout = ?self.request_timeout, "Command deadline exceeded");
                ExecutionOutcome {
                    succeeded: false,
                    combined_output: format!(
                        "command error: deadline exceeded after {:?}",
                        self.request_timeout
                    ),
                }
            }
        }
    }
}

/// JSON payload for one command invocation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommandApiResponse<'a> {
    id: &'a str,
    description: &'a str,
    command: &'a str,
    args: &'a [String],
    now: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    command_duration: Option<String>,
    command_output: String,
}

/// HTTP endpoint for one command id: acquire a slot, execute, respond.
pub struct CommandApiHandler {
    info: Arc<CommandInfo>,
    gate: AdmissionGate,
    executor: CommandExecutor,
}

impl CommandApiHandler {
    pub fn new(info: Arc<CommandInfo>, gate: AdmissionGate, executor: CommandExecutor) -> Self {
        Self {
            info,
            gate,
            executor,
        }
    }

    async fn run_command(
        info: Arc<CommandInfo>,
        gate: AdmissionGate,
        executor: CommandExecutor,
    ) -> Response<Bytes> {
        // The acquire budget is independent of the execution budget: a
        // request that waits the full acquire timeout still gets a full
        // execution timeout afterwards.
        let (duration, output) = match gate.acquire().await {
            Ok(_permit) => {
                let started = Instant::now();
                let outcome = executor.run(&info).await;
                let elapsed = started.elapsed();
                (
                    Some(format!("{:.9} sec", elapsed.as_secs_f64())),
                    outcome.combined_output,
                )
            }
            Err(e) => {
                debug!(id = %info.id, error = %e, "Command slot not acquired");
                (None, e.to_string())
            }
        };

        let payload = CommandApiResponse {
            id: &info.id,
            description: &info.description,
            command: &info.command,
            args: &info.args,
            now: format_time(Local::now()),
            command_duration: duration,
            command_output: output,
        };

        match serde_json::to_vec(&payload) {
            Ok(body) => json_response(Bytes::from(body)),
            Err(e) => {
                // The only command-path failure that escalates to the
                // transport layer.
                plain_text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

impl Handler for CommandApiHandler {
    fn handle(&self, _request: RequestContext) -> BoxFuture<'static, Response<Bytes>> {
        let info = Arc::clone(&self.info);
        let gate = self.gate.clone();
        let executor = self.executor.clone();
        Box::pin(Self::run_command(info, gate, executor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::test_request;
    use hyper::header::{CACHE_CONTROL, CONTENT_TYPE};

    fn info(id: &str, command: &str, args: &[&str]) -> CommandInfo {
        CommandInfo {
            id: id.to_string(),
            description: format!("{id} description"),
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn handler(info: CommandInfo, max_concurrent: usize) -> CommandApiHandler {
        CommandApiHandler::new(
            Arc::new(info),
            AdmissionGate::new(max_concurrent, Duration::from_millis(100)),
            CommandExecutor::new(Duration::from_secs(2)),
        )
    }

    async fn response_json(handler: &CommandApiHandler) -> (StatusCode, serde_json::Value) {
        let response = handler.handle(test_request("/api/commands/x")).await;
        let status = response.status();
        let json = serde_json::from_slice(response.body()).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn test_echo_output_fidelity() {
        let handler = handler(info("echo", "/bin/echo", &["hi"]), 1);
        let (status, json) = response_json(&handler).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], "echo");
        assert_eq!(json["command"], "/bin/echo");
        assert_eq!(json["args"][0], "hi");
        assert_eq!(json["commandOutput"], "hi\n");
        assert!(json["commandDuration"].as_str().unwrap().ends_with(" sec"));
        assert!(!json["now"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_escalated() {
        let handler = handler(info("false", "/bin/false", &[]), 1);
        let (status, json) = response_json(&handler).await;

        assert_eq!(status, StatusCode::OK);
        let output = json["commandOutput"].as_str().unwrap();
        assert!(output.starts_with("command error"), "{output}");
        // Execution happened, so a duration is reported.
        assert!(json["commandDuration"].is_string());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_not_escalated() {
        let handler = handler(info("missing", "/no/such/binary", &[]), 1);
        let (status, json) = response_json(&handler).await;

        assert_eq!(status, StatusCode::OK);
        let output = json["commandOutput"].as_str().unwrap();
        assert!(output.starts_with("command error"), "{output}");
    }

    #[tokio::test]
    async fn test_execution_deadline_kills_command() {
        let handler = CommandApiHandler::new(
            Arc::new(info("sleep", "/bin/sleep", &["10"])),
            AdmissionGate::new(1, Duration::from_millis(100)),
            CommandExecutor::new(Duration::from_millis(200)),
        );

        let started = Instant::now();
        let (status, json) = response_json(&handler).await;
        let elapsed = started.elapsed();

        assert_eq!(status, StatusCode::OK);
        let output = json["commandOutput"].as_str().unwrap();
        assert!(output.contains("deadline exceeded"), "{output}");
        assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_acquire_timeout_reports_without_duration() {
        let gate = AdmissionGate::new(1, Duration::from_millis(100));
        let slow = CommandApiHandler::new(
            Arc::new(info("sleep", "/bin/sleep", &["1"])),
            gate.clone(),
            CommandExecutor::new(Duration::from_secs(5)),
        );
        let fast = CommandApiHandler::new(
            Arc::new(info("echo", "/bin/echo", &["hi"])),
            gate,
            CommandExecutor::new(Duration::from_secs(5)),
        );

        let slow_request = slow.handle(test_request("/api/commands/sleep"));
        let fast_request = async {
            // Let the slow command take the only slot first.
            tokio::time::sleep(Duration::from_millis(50)).await;
            fast.handle(test_request("/api/commands/echo")).await
        };

        let (slow_response, fast_response) = tokio::join!(slow_request, fast_request);

        let rejected: serde_json::Value = serde_json::from_slice(fast_response.body()).unwrap();
        assert_eq!(fast_response.status(), StatusCode::OK);
        assert!(rejected["commandDuration"].is_null());
        let output = rejected["commandOutput"].as_str().unwrap();
        assert!(output.contains("timed out acquiring command slot"), "{output}");

        let completed: serde_json::Value = serde_json::from_slice(slow_response.body()).unwrap();
        assert_eq!(completed["commandOutput"], "");
        assert!(completed["commandDuration"].is_string());
    }

    #[tokio::test]
    async fn test_response_headers() {
        let handler = handler(info("echo", "/bin/echo", &[]), 1);
        let response = handler.handle(test_request("/api/commands/echo")).await;

        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(response.headers().get(CACHE_CONTROL).unwrap(), "max-age=0");
    }
}
