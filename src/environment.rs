//! Process-wide environment snapshot.
//!
//! Captured exactly once at startup and injected where needed; nothing
//! re-reads ambient process state at request time.

use serde::Serialize;

pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    env_vars: Vec<String>,
    git_commit: String,
    available_parallelism: usize,
    package_name: String,
    package_version: String,
}

impl Environment {
    /// Snapshot the current process environment.
    pub fn capture() -> Self {
        let mut env_vars: Vec<String> = std::env::vars()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        env_vars.sort();

        Self {
            env_vars,
            git_commit: option_env!("OPSBOARD_GIT_COMMIT")
                .unwrap_or("unknown")
                .to_string(),
            available_parallelism: std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1),
            package_name: PKG_NAME.to_string(),
            package_version: VERSION.to_string(),
        }
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn package_version(&self) -> &str {
        &self.package_version
    }
}
