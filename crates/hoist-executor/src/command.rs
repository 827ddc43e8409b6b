//! Child process execution for the `docker` and `tar` wrappers.

use std::ffi::{OsStr, OsString};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ExecResult, ExecutionError};

/// Run `program` with `args` and return its stdout.
///
/// A non-zero exit is an error carrying the trimmed stderr.
pub async fn run_command<I, S>(program: &str, args: I) -> ExecResult<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();
    let command = describe(program, &args);
    debug!(%command, "running command");

    let output = Command::new(program)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ExecutionError::Spawn {
            command: command.clone(),
            source,
        })?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(%command, bytes = stdout.len(), "command succeeded");
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(%command, status = %output.status, %stderr, "command failed");
        Err(ExecutionError::Command {
            command,
            status: output.status.to_string(),
            stderr,
        })
    }
}

fn describe(program: &str, args: &[OsString]) -> String {
    let mut out = program.to_string();
    for arg in args {
        out.push(' ');
        out.push_str(&arg.to_string_lossy());
    }
    out
}
