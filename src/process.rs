//! External command execution
//!
//! Every interaction with a version-control tool or with `diff` goes through
//! the [`CommandRunner`] trait. The working tree receives a runner at
//! construction time, so tests can substitute a scripted runner and never
//! touch a real VCS binary.
//!
//! [`SystemRunner`] is the `std::process` implementation. It captures
//! standard output and standard error separately and reports the exit code,
//! or `None` when the process was terminated by a signal. An optional
//! timeout kills commands that hang.

use crate::error::{Result, UpstreamError};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Interval between exit polls while a timeout is armed
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A single command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name, resolved through `PATH`
    pub program: String,
    /// Arguments passed verbatim
    pub args: Vec<String>,
    /// Working directory, or the caller's when `None`
    pub dir: Option<PathBuf>,
}

impl Invocation {
    /// Create an invocation of `program` with `args`
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
        }
    }

    /// Run the command inside `dir`
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// Arguments joined with spaces, for messages
    pub fn display_args(&self) -> String {
        self.args.join(" ")
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output
    pub stdout: Vec<u8>,
    /// Captured standard error
    pub stderr: Vec<u8>,
    /// Exit code; `None` if the process did not exit normally
    pub status: Option<i32>,
}

impl CommandOutput {
    /// Whether the command exited normally with status 0
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Standard output decoded lossily as UTF-8
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily and trimmed
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// [`UpstreamError::Command`] describing this output's failure
    pub fn command_error(&self, invocation: &Invocation) -> UpstreamError {
        UpstreamError::Command {
            program: invocation.program.clone(),
            args: invocation.display_args(),
            stderr: self.stderr_str(),
        }
    }

    /// Turn a non-zero exit into [`UpstreamError::Command`]
    pub fn into_success(self, invocation: &Invocation) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(self.command_error(invocation))
        }
    }
}

/// Capability to run an external command and wait for it
///
/// Implementations must not treat a non-zero exit as an error: callers
/// interpret the status themselves (e.g. `diff` exits 1 on differences).
/// Only failure to start or wait for the process is an `Err`.
pub trait CommandRunner: Send + Sync {
    /// Run `invocation` to completion and capture its output
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runs commands as child processes of the current process
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    /// Create a runner that waits indefinitely
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner that kills commands running longer than `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    fn command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn run_with_timeout(&self, invocation: &Invocation, timeout: Duration) -> Result<CommandOutput> {
        let mut child = Self::command(invocation)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| UpstreamError::io(format!("running {}", invocation.program), e))?;

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf);
            }
            buf
        });
        let stderr_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf);
            }
            buf
        });

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                warn!("Killing {} after {:?}", invocation.program, timeout);
                let _ = child.kill();
                let _ = child.wait();
                return Err(UpstreamError::CommandTimeout {
                    program: invocation.program.clone(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout_reader
            .join()
            .map_err(|_| UpstreamError::internal("stdout reader panicked"))?;
        let stderr = stderr_reader
            .join()
            .map_err(|_| UpstreamError::internal("stderr reader panicked"))?;

        Ok(CommandOutput {
            stdout,
            stderr,
            status: status.code(),
        })
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(
            "Running {} {} in {:?}",
            invocation.program,
            invocation.display_args(),
            invocation.dir
        );

        let output = match self.timeout {
            Some(timeout) => self.run_with_timeout(invocation, timeout)?,
            None => {
                let output = Self::command(invocation)
                    .stdin(Stdio::null())
                    .output()
                    .map_err(|e| UpstreamError::io(format!("running {}", invocation.program), e))?;
                CommandOutput {
                    stdout: output.stdout,
                    stderr: output.stderr,
                    status: output.status.code(),
                }
            }
        };

        trace!(
            "{} exited with {:?} ({} bytes stdout, {} bytes stderr)",
            invocation.program,
            output.status,
            output.stdout.len(),
            output.stderr.len()
        );
        Ok(output)
    }
}
