//! Control of the container hosting a remote browser.

use std::process::Output;

use tokio::process::Command;

/// Errors from restarting or inspecting a managed process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The control command could not be started.
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The control command exited unsuccessfully.
    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed { command: String, status: String, stderr: String },

    /// The command succeeded but its output did not name the process.
    #[error("restart of {name} not confirmed, output: {output}")]
    Unconfirmed { name: String, output: String },
}

/// A long-running external process the renderer may restart.
#[async_trait::async_trait]
pub trait ManagedProcess: Send + Sync {
    /// Process name as known to its supervisor.
    fn name(&self) -> &str;

    /// Restart the process and confirm the supervisor acted on it.
    async fn restart(&self) -> Result<(), ProcessError>;

    /// Whether the supervisor reports the process as running.
    async fn is_healthy(&self) -> bool;
}

/// A docker container restarted through the docker CLI.
#[derive(Debug, Clone)]
pub struct DockerProcess {
    docker: String,
    container: String,
}

impl DockerProcess {
    pub fn new(docker: impl Into<String>, container: impl Into<String>) -> Self {
        Self { docker: docker.into(), container: container.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<Output, ProcessError> {
        let output = Command::new(&self.docker)
            .args(args)
            .output()
            .await
            .map_err(|source| ProcessError::Spawn { command: self.docker.clone(), source })?;

        if !output.status.success() {
            return Err(ProcessError::CommandFailed {
                command: format!("{} {}", self.docker, args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[async_trait::async_trait]
impl ManagedProcess for DockerProcess {
    fn name(&self) -> &str {
        &self.container
    }

    /// `docker restart <name>` prints the container name on success.
    async fn restart(&self) -> Result<(), ProcessError> {
        let output = self.run(&["restart", &self.container]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        tracing::info!(container = %self.container, output = %stdout.trim(), "docker restart finished");

        if !stdout.contains(&self.container) {
            return Err(ProcessError::Unconfirmed { name: self.container.clone(), output: stdout.trim().to_string() });
        }

        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        let filter = format!("name=^/{}$", self.container);
        match self.run(&["ps", "--filter", &filter, "--format", "{{.Status}}"]).await {
            Ok(output) => String::from_utf8_lossy(&output.stdout).trim_start().starts_with("Up"),
            Err(e) => {
                tracing::warn!(container = %self.container, error = %e, "docker health check failed");
                false
            }
        }
    }
}
