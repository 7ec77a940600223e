//! External command execution
//!
//! Every shell-out goes through [`CommandRunner`] so that each invocation
//! has a timeout, is killed when abandoned, and never leaks a credential into
//! logs or error text.

use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::CommandError;
use crate::tools::get_tool_path;

/// Replacement for masked secrets
pub const MASK: &str = "******";

/// Default per-command timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

fn masking_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // --password X / --password=X (but not --password-stdin)
            r"(--password(?:=|\s+))\S+",
            // -p X
            r"((?:^|\s)-p\s+)\S+",
            // --creds user:secret / --dest-creds=user:secret
            r"(--[\w-]*creds(?:=|\s+)[^:\s]*:)\S+",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("Invalid masking pattern"))
        .collect()
    })
}

/// Replace credential arguments in a rendered command line (or its output)
pub fn mask_sensitive(text: &str) -> String {
    masking_patterns()
        .iter()
        .fold(text.to_string(), |masked, pattern| {
            pattern
                .replace_all(&masked, format!("${{1}}{}", MASK).as_str())
                .into_owned()
        })
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external tools with a timeout and masked diagnostics
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    env: Vec<(String, String)>,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            env: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set an environment variable for every command run
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub async fn run(&self, tool: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.execute(tool, args, None, None).await
    }

    /// Run with `dir` as the working directory
    pub async fn run_in(
        &self,
        tool: &str,
        args: &[&str],
        dir: &Path,
    ) -> Result<CommandOutput, CommandError> {
        self.execute(tool, args, Some(dir), None).await
    }

    /// Run with `input` written to stdin (e.g. `--password-stdin`)
    pub async fn run_with_input(
        &self,
        tool: &str,
        args: &[&str],
        input: &str,
    ) -> Result<CommandOutput, CommandError> {
        self.execute(tool, args, None, Some(input)).await
    }

    async fn execute(
        &self,
        tool: &str,
        args: &[&str],
        dir: Option<&Path>,
        input: Option<&str>,
    ) -> Result<CommandOutput, CommandError> {
        let program = get_tool_path(tool);
        let command = mask_sensitive(&render(&program, args));
        debug!("Running: {}", command);

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| CommandError::Io {
            command: command.clone(),
            source,
        })?;

        let finished = async move {
            if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
                // A child that exits without reading reports through its status
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(e);
                    }
                }
                // Dropping stdin closes the pipe
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(self.timeout, finished).await {
            Ok(result) => result.map_err(|source| CommandError::Io {
                command: command.clone(),
                source,
            })?,
            Err(_) => {
                return Err(CommandError::TimedOut {
                    command,
                    timeout: self.timeout,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(CommandError::Failed {
                command,
                code: output.status.code(),
                stderr: mask_sensitive(stderr.trim()),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
