use crate::errors::{RebaseStackError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of a validation run inside a sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_seconds: f64,
    pub command: String,
}

/// Auto-detect the project test command for a sandbox.
///
/// Ordered probe list, first match wins; no match yields `None`, not an
/// error.
pub fn detect_test_command(sandbox_path: &Path) -> Option<String> {
    if sandbox_path.join("Cargo.toml").exists() {
        return Some("cargo test".to_string());
    }

    if sandbox_path.join("package.json").exists() {
        return Some("npm test".to_string());
    }

    if let Ok(makefile) = std::fs::read_to_string(sandbox_path.join("Makefile")) {
        if makefile.lines().any(|line| line.starts_with("test:")) {
            return Some("make test".to_string());
        }
    }

    if sandbox_path.join("pytest.ini").exists() || sandbox_path.join("setup.py").exists() {
        return Some("pytest".to_string());
    }
    if let Ok(pyproject) = std::fs::read_to_string(sandbox_path.join("pyproject.toml")) {
        if pyproject.contains("[tool.pytest") {
            return Some("pytest".to_string());
        }
    }

    if sandbox_path.join("go.mod").exists() {
        return Some("go test ./...".to_string());
    }

    None
}

/// Executes a project test command inside a sandbox with a wall-clock
/// ceiling
pub struct TestRunner {
    timeout: Duration,
}

impl TestRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run tests in the sandbox. When no command is supplied detection is
    /// attempted; if that also fails a synthetic failed result is returned
    /// instead of an error.
    pub fn run_tests(&self, sandbox_path: &Path, command: Option<String>) -> Result<TestResult> {
        let command = match command.or_else(|| detect_test_command(sandbox_path)) {
            Some(cmd) => cmd,
            None => {
                return Ok(TestResult {
                    success: false,
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: "No test command detected (looked for Cargo.toml, package.json, \
                             Makefile test target, pytest config, go.mod). Pass one explicitly \
                             with --command."
                        .to_string(),
                    duration_seconds: 0.0,
                    command: String::new(),
                })
            }
        };

        info!("Running tests in {}: {}", sandbox_path.display(), command);
        let start = Instant::now();

        let mut shell = shell_command(&command);
        shell
            .current_dir(sandbox_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a timeout can take down the whole tree.
            // Killing only the shell leaves forked test processes holding the
            // pipe write-ends and the output read would block until they exit.
            shell.process_group(0);
        }

        let mut child = shell.spawn().map_err(|e| {
            RebaseStackError::validation(format!("Failed to spawn '{command}': {e}"))
        })?;

        let deadline = start + self.timeout;
        let mut timed_out = false;
        loop {
            match child.try_wait().map_err(RebaseStackError::Io)? {
                Some(_) => break,
                None if Instant::now() >= deadline => {
                    warn!("Test command exceeded {:?}, killing", self.timeout);
                    kill_process_tree(&mut child);
                    timed_out = true;
                    break;
                }
                None => std::thread::sleep(Duration::from_millis(100)),
            }
        }

        let output = child.wait_with_output().map_err(RebaseStackError::Io)?;
        let duration_seconds = start.elapsed().as_secs_f64();

        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let (success, exit_code) = if timed_out {
            stderr.push_str(&format!(
                "\nTest command killed after exceeding the {}s timeout",
                self.timeout.as_secs()
            ));
            (false, -1)
        } else {
            let code = output.status.code().unwrap_or(-1);
            (output.status.success(), code)
        };

        debug!(
            "Test run finished: success={} exit_code={} duration={:.1}s",
            success, exit_code, duration_seconds
        );

        Ok(TestResult {
            success,
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
            duration_seconds,
            command,
        })
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(unix)]
fn kill_process_tree(child: &mut std::process::Child) {
    // A negative pid addresses the whole process group
    let _ = Command::new("kill")
        .args(["-9", &format!("-{}", child.id())])
        .status();
    let _ = child.kill();
}

#[cfg(windows)]
fn kill_process_tree(child: &mut std::process::Child) {
    let _ = child.kill();
}
