//! Engine backed by an operator-supplied shell command.
//!
//! The command runs under `bash -c`, receives one JSON request on stdin and
//! must print one JSON response on stdout. A non-zero exit is a failure whose
//! message is the command's stderr.

use super::{Description, ProvisionError, ProvisionRequest, ProvisionResponse, Provisioner};
use serde_json::Value;
use std::io::Write;
use std::process::{Command, Stdio};

/// Output from running the engine command once.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `command` via `bash -c`, feeding `input` on stdin.
pub fn exec_command(command: &str, input: &str) -> Result<ExecOutput, ProvisionError> {
    let mut child = Command::new("bash")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProvisionError(format!("failed to spawn engine: {}", e)))?;

    if let Some(ref mut stdin) = child.stdin {
        // An engine that ignores its input may exit before reading it.
        if let Err(e) = stdin.write_all(input.as_bytes()) {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(ProvisionError(format!("stdin write error: {}", e)));
            }
        }
    }

    let output = child
        .wait_with_output()
        .map_err(|e| ProvisionError(format!("wait error: {}", e)))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Provisioner that shells out to an engine command.
#[derive(Debug, Clone)]
pub struct CommandProvisioner {
    command: String,
}

impl CommandProvisioner {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn call(&self, request: &ProvisionRequest) -> Result<String, ProvisionError> {
        let input = serde_json::to_string(request)
            .map_err(|e| ProvisionError(format!("cannot encode request: {}", e)))?;
        tracing::debug!(
            resource = %request.logical_id,
            action = ?request.action,
            "invoking engine"
        );
        let out = exec_command(&self.command, &input)?;
        if !out.success() {
            let stderr = out.stderr.trim_end();
            if stderr.is_empty() {
                return Err(ProvisionError(format!("engine exited with code {}", out.exit_code)));
            }
            return Err(ProvisionError(stderr.to_string()));
        }
        Ok(out.stdout)
    }
}

fn decode<T: serde::de::DeserializeOwned>(stdout: &str) -> Result<T, ProvisionError> {
    serde_json::from_str(stdout.trim())
        .map_err(|e| ProvisionError(format!("invalid engine response: {}", e)))
}

impl Provisioner for CommandProvisioner {
    fn apply(&mut self, request: &ProvisionRequest) -> Result<ProvisionResponse, ProvisionError> {
        decode(&self.call(request)?)
    }

    fn destroy(&mut self, request: &ProvisionRequest) -> Result<(), ProvisionError> {
        self.call(request).map(|_| ())
    }

    fn describe(&mut self, request: &ProvisionRequest) -> Result<Option<Value>, ProvisionError> {
        let stdout = self.call(request)?;
        if stdout.trim().is_empty() {
            return Ok(None);
        }
        let d: Description = decode(&stdout)?;
        Ok(d.properties)
    }
}
