use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, trace};

use crate::error::VBoxCliError;

static RE_ERROR_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)VBoxManage(?:\.exe)?: error: (.*?)\r?$").unwrap());

pub const DEFAULT_VBOXMANAGE: &str = "VBoxManage";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// path to (or name of) the VBoxManage binary
    pub vboxmanage: PathBuf,
    /// kill the child and fail with [`VBoxCliError::Timeout`] after this long
    pub timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> RunnerConfig {
        RunnerConfig {
            vboxmanage: PathBuf::from(DEFAULT_VBOXMANAGE),
            timeout: None,
        }
    }
}

impl RunnerConfig {
    /// `VBoxManage` from `PATH`, or `%VBOX_INSTALL_PATH%\VBoxManage.exe` on windows
    pub fn from_env() -> RunnerConfig {
        let mut config = RunnerConfig::default();
        if cfg!(windows) {
            if let Some(dir) = std::env::var_os("VBOX_INSTALL_PATH").filter(|p| !p.is_empty()) {
                config.vboxmanage = PathBuf::from(dir).join("VBoxManage.exe");
            }
        }
        config
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Why an invocation did not succeed, before classification.
#[derive(Debug)]
pub enum ExecutionError {
    /// the process could not be started
    Spawn(std::io::Error),
    /// the process started but collecting its output failed
    Io(std::io::Error),
    /// the process ran and exited unsuccessfully; `None` when killed by a signal
    Exit { code: Option<i32> },
    /// the deadline elapsed and the process was killed
    TimedOut(Duration),
}

/// Everything captured from one invocation.
#[derive(Debug, Default)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    pub error: Option<ExecutionError>,
}

/// Result of one invocation: the captured streams plus the classified outcome.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: Result<(), VBoxCliError>,
}

impl CommandOutput {
    pub fn into_result(self) -> Result<String, VBoxCliError> {
        self.status.map(|_| self.stdout)
    }
}

/// Maps a failed invocation to a typed error.
///
/// A missing binary becomes [`VBoxCliError::ToolNotFound`]. A non-zero exit
/// with a `VBoxManage: error: <message>` line in stderr becomes
/// [`VBoxCliError::ToolReported`] carrying the first such message. Anything
/// else is passed through with its raw detail.
pub fn classify(error: ExecutionError, stderr: &str, tool: &str) -> VBoxCliError {
    match error {
        ExecutionError::Spawn(e) if e.kind() == std::io::ErrorKind::NotFound => {
            VBoxCliError::ToolNotFound(tool.to_string())
        }
        ExecutionError::Spawn(e) | ExecutionError::Io(e) => VBoxCliError::CommandExecutionError(e),
        ExecutionError::Exit { code } => match RE_ERROR_MESSAGE.captures(stderr) {
            Some(caps) => VBoxCliError::ToolReported(caps[1].trim().to_string()),
            None => VBoxCliError::CommandFailed {
                code,
                stderr: stderr.trim().to_string(),
            },
        },
        ExecutionError::TimedOut(timeout) => VBoxCliError::Timeout(timeout),
    }
}

/// Runs VBoxManage with the given arguments.
///
/// Implementations only capture; classification and logging happen in
/// [`CommandRunner::run`].
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// name of the binary, used in logs and errors
    fn tool(&self) -> String;

    async fn execute(&self, args: &[String]) -> RawOutput;

    async fn run(&self, args: &[String]) -> CommandOutput {
        let tool = self.tool();
        debug!("executing: {} {}", tool, args.join(" "));

        let raw = self.execute(args).await;
        if let Some(error) = &raw.error {
            debug!("Error: {:?}", error);
        }
        if !raw.stdout.is_empty() {
            trace!("StdOut: {}", raw.stdout);
        }
        if !raw.stderr.is_empty() {
            trace!("StdErr: {}", raw.stderr);
        }

        let status = match raw.error {
            None => Ok(()),
            Some(error) => Err(classify(error, &raw.stderr, &tool)),
        };

        CommandOutput {
            stdout: raw.stdout,
            stderr: raw.stderr,
            status,
        }
    }
}

/// Spawns the real VBoxManage binary. Each call blocks the calling task until
/// the child exits, or until the configured deadline.
#[derive(Debug, Clone, Default)]
pub struct VBoxManageRunner {
    config: RunnerConfig,
}

impl VBoxManageRunner {
    pub fn new(config: RunnerConfig) -> Self {
        VBoxManageRunner { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl CommandRunner for VBoxManageRunner {
    fn tool(&self) -> String {
        self.config.vboxmanage.display().to_string()
    }

    async fn execute(&self, args: &[String]) -> RawOutput {
        let child = AsyncCommand::new(&self.config.vboxmanage)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return RawOutput {
                    error: Some(ExecutionError::Spawn(e)),
                    ..RawOutput::default()
                }
            }
        };

        // dropping the wait future on timeout kills the child
        let output = match self.config.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    return RawOutput {
                        error: Some(ExecutionError::TimedOut(timeout)),
                        ..RawOutput::default()
                    }
                }
            },
            None => child.wait_with_output().await,
        };

        match output {
            Ok(output) => RawOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into(),
                stderr: String::from_utf8_lossy(&output.stderr).into(),
                error: match output.status.success() {
                    true => None,
                    false => Some(ExecutionError::Exit {
                        code: output.status.code(),
                    }),
                },
            },
            Err(e) => RawOutput {
                error: Some(ExecutionError::Io(e)),
                ..RawOutput::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str, &'static str, Option<i32>);

    #[async_trait::async_trait]
    impl CommandRunner for Canned {
        fn tool(&self) -> String {
            "VBoxManage".to_string()
        }

        async fn execute(&self, _args: &[String]) -> RawOutput {
            RawOutput {
                stdout: self.0.to_string(),
                stderr: self.1.to_string(),
                error: self.2.map(|code| ExecutionError::Exit { code: Some(code) }),
            }
        }
    }

    #[test]
    fn tool_reported_error_drops_marker_and_other_stderr() {
        let stderr = "VBoxManage: error: machine already exists\nVBoxManage: error: Details: code VBOX_E_FILE_ERROR\n";
        let err = classify(ExecutionError::Exit { code: Some(1) }, stderr, "VBoxManage");
        match err {
            VBoxCliError::ToolReported(message) => assert_eq!(message, "machine already exists"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn marker_may_follow_other_lines() {
        let stderr = "Progress 10%\r\nVBoxManage.exe: error: Could not find a registered machine named 'devbox'\r\n";
        let err = classify(ExecutionError::Exit { code: Some(1) }, stderr, "VBoxManage");
        assert_eq!(err.missing_machine(), Some("devbox"));
    }

    #[test]
    fn exit_without_marker_is_unclassified() {
        let err = classify(ExecutionError::Exit { code: Some(2) }, "Segmentation fault\n", "VBoxManage");
        match err {
            VBoxCliError::CommandFailed { code, stderr } => {
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "Segmentation fault");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = classify(ExecutionError::Exit { code: None }, "", "VBoxManage");
        assert!(err.is_unclassified());
    }

    #[test]
    fn missing_binary_is_tool_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = classify(ExecutionError::Spawn(io), "", "/opt/vbox/VBoxManage");
        match err {
            VBoxCliError::ToolNotFound(tool) => assert_eq!(tool, "/opt/vbox/VBoxManage"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn other_spawn_errors_pass_through() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = classify(ExecutionError::Spawn(io), "", "VBoxManage");
        assert!(matches!(err, VBoxCliError::CommandExecutionError(ref e) if e.kind() == std::io::ErrorKind::PermissionDenied));
    }

    #[test]
    fn io_errors_after_start_are_unclassified() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = classify(ExecutionError::Io(io), "", "VBoxManage");
        assert!(err.is_unclassified());
        assert!(matches!(err, VBoxCliError::CommandExecutionError(ref e) if e.kind() == std::io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn timeout_is_reported() {
        let err = classify(ExecutionError::TimedOut(Duration::from_secs(5)), "", "VBoxManage");
        assert!(matches!(err, VBoxCliError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn run_keeps_streams_on_failure() {
        let output = Canned("partial", "VBoxManage: error: nope\n", Some(1))
            .run(&["showvminfo".to_string()])
            .await;
        assert_eq!(output.stdout, "partial");
        assert_eq!(output.stderr, "VBoxManage: error: nope\n");
        assert!(matches!(output.status, Err(VBoxCliError::ToolReported(ref m)) if m == "nope"));
    }

    #[tokio::test]
    async fn run_succeeds_without_error() {
        let output = Canned("ok\n", "", None).run(&[]).await;
        assert_eq!(output.into_result().unwrap(), "ok\n");
    }

    #[tokio::test]
    async fn missing_binary_is_detected_by_real_runner() {
        let runner = VBoxManageRunner::new(RunnerConfig {
            vboxmanage: PathBuf::from("/nonexistent/dir/VBoxManage"),
            timeout: None,
        });
        let output = runner.run(&["--version".to_string()]).await;
        assert!(matches!(output.status, Err(VBoxCliError::ToolNotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn real_runner_kills_child_after_deadline() {
        let runner = VBoxManageRunner::new(RunnerConfig {
            vboxmanage: PathBuf::from("/bin/sleep"),
            timeout: Some(Duration::from_millis(200)),
        });
        let started = std::time::Instant::now();
        let output = runner.run(&["5".to_string()]).await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(
            matches!(output.status, Err(VBoxCliError::Timeout(d)) if d == Duration::from_millis(200))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn real_runner_captures_streams_and_classifies_exit() {
        let runner = VBoxManageRunner::new(RunnerConfig {
            vboxmanage: PathBuf::from("/bin/sh"),
            timeout: Some(Duration::from_secs(10)),
        });
        let script = "echo out; echo noise >&2; echo 'VBoxManage: error: machine already exists' >&2; exit 3";
        let output = runner.run(&["-c".to_string(), script.to_string()]).await;
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "noise\nVBoxManage: error: machine already exists\n");
        assert!(
            matches!(output.status, Err(VBoxCliError::ToolReported(ref m)) if m == "machine already exists")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn real_runner_reports_signal_death_as_unclassified() {
        let runner = VBoxManageRunner::new(RunnerConfig {
            vboxmanage: PathBuf::from("/bin/sh"),
            timeout: Some(Duration::from_secs(10)),
        });
        let output = runner.run(&["-c".to_string(), "kill -9 $$".to_string()]).await;
        match output.status {
            Err(VBoxCliError::CommandFailed { code, stderr }) => {
                assert_eq!(code, None);
                assert_eq!(stderr, "");
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[test]
    fn default_config_uses_plain_binary_name() {
        let config = RunnerConfig::default().with_timeout(Some(Duration::from_secs(1)));
        assert_eq!(config.vboxmanage, PathBuf::from("VBoxManage"));
        assert_eq!(config.timeout, Some(Duration::from_secs(1)));
    }
}
