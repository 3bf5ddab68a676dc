//! Subprocess execution for the CLI under test. Failures to even start
//! or finish the process are folded into shell-style exit codes (127 for
//! a missing binary, 124 for a timeout, 128+N for signal N) so scripts
//! see one uniform `status` field.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

pub async fn run_command(program: &str, args: &[String], limit: Duration) -> CommandOutput {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            debug!(program, error = %e, "failed to spawn command");
            return CommandOutput {
                status: 127,
                stdout: String::new(),
                stderr: format!("{program}: {e}"),
                timed_out: false,
            };
        }
    };

    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => CommandOutput {
            status: exit_code(&output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        },
        Ok(Err(e)) => CommandOutput {
            status: 1,
            stdout: String::new(),
            stderr: format!("{program}: {e}"),
            timed_out: false,
        },
        Err(_) => CommandOutput {
            status: 124,
            stdout: String::new(),
            stderr: format!("timed out after {}s", limit.as_secs_f64()),
            timed_out: true,
        },
    }
}

fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let out = run_command(
            "sh",
            &["-c".to_string(), "echo hello; exit 3".to_string()],
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(out.status, 3);
        assert_eq!(out.stdout.trim(), "hello");
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn test_missing_binary_maps_to_127() {
        let out = run_command(
            "definitely-not-a-real-binary-gauntlet",
            &[],
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(out.status, 127);
        assert!(out.stderr.contains("definitely-not-a-real-binary-gauntlet"));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_124() {
        let out = run_command(
            "sh",
            &["-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(out.status, 124);
        assert!(out.timed_out);
        assert!(out.stderr.contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_death_maps_to_128_plus_signal() {
        let out = run_command(
            "sh",
            &["-c".to_string(), "kill -TERM $$".to_string()],
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(out.status, 128 + 15);
    }
}
