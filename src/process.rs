//! External process execution.
//!
//! Commands are described with [`Cmd`] and executed through a [`Runner`].
//! [`SystemRunner`] is the real implementation; it picks one [`ExecStrategy`]
//! at startup:
//!
//! - **Native**: the argument vector is spawned directly.
//! - **Emulated**: on Windows hosts with a POSIX layer (Cygwin/MSYS2, detected
//!   by `cygpath` on the search path) the rendered command line is handed to
//!   `bash --login -c` so shell builtins and POSIX paths behave.
//!
//! The working directory is passed to the spawn call and never changes the
//! caller's own working directory. A non-zero exit is returned as a value;
//! callers decide whether it is fatal.

use anyhow::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::error::ReleaseError;

/// A command line plus the environment it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    capture: bool,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            capture: false,
        }
    }

    /// Command whose program is a filesystem path.
    pub fn from_path(program: &Path) -> Self {
        Self::new(program.to_string_lossy().into_owned())
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Capture stdout/stderr instead of streaming them to the console.
    pub fn capture_output(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture
    }

    /// The command line as a POSIX shell would read it.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of one process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Human readable exit status for diagnostics.
    pub fn exit_description(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "termination by signal".to_string(),
        }
    }
}

/// Executes commands and looks up executables on the host.
pub trait Runner: Send + Sync {
    /// Run `cmd` to completion. Errors only when the process cannot be spawned.
    fn run(&self, cmd: &Cmd) -> Result<CommandResult>;

    /// Resolve `program` on the host search path.
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// How commands are handed to the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecStrategy {
    Native,
    Emulated { shell: PathBuf },
}

impl ExecStrategy {
    /// Probe the host once for a POSIX emulation layer.
    pub fn detect() -> Result<Self> {
        if which::which("cygpath").is_err() {
            debug!("no POSIX emulation layer detected, using native execution");
            return Ok(ExecStrategy::Native);
        }

        let shell = which::which("bash").map_err(|_| {
            ReleaseError::missing_tool(
                "bash",
                "a POSIX emulation layer was detected but its login shell is not on PATH",
            )
        })?;
        debug!(shell = %shell.display(), "POSIX emulation layer detected");
        Ok(ExecStrategy::Emulated { shell })
    }
}

/// Runs commands on the real host.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    strategy: ExecStrategy,
}

impl SystemRunner {
    pub fn new(strategy: ExecStrategy) -> Self {
        Self { strategy }
    }

    /// Runner using the strategy detected on this host.
    pub fn detect() -> Result<Self> {
        Ok(Self::new(ExecStrategy::detect()?))
    }

    fn command_for(&self, cmd: &Cmd) -> Command {
        let mut command = match &self.strategy {
            ExecStrategy::Native => {
                let mut command = Command::new(&cmd.program);
                command.args(&cmd.args);
                command
            }
            ExecStrategy::Emulated { shell } => {
                let mut command = Command::new(shell);
                command.arg("--login").arg("-c").arg(cmd.display());
                // Stops the MSYS/Cygwin profile from switching to $HOME.
                command.env("CHERE_INVOKING", "1");
                command
            }
        };
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &cmd.envs {
            command.env(key, value);
        }
        command
    }
}

impl Runner for SystemRunner {
    fn run(&self, cmd: &Cmd) -> Result<CommandResult> {
        let line = cmd.display();
        println!("{line}");

        let mut command = self.command_for(cmd);
        let spawn_error = |err: std::io::Error| -> anyhow::Error {
            if err.kind() == ErrorKind::NotFound {
                ReleaseError::missing_tool(cmd.program.clone(), format!("cannot execute `{line}`"))
                    .into()
            } else {
                anyhow::Error::new(err).context(format!("spawning `{line}`"))
            }
        };

        let result = if cmd.capture {
            let output = command
                .stdin(Stdio::null())
                .output()
                .map_err(spawn_error)?;
            CommandResult {
                code: output.status.code(),
                stdout: Some(String::from_utf8_lossy(&output.stdout).into_owned()),
                stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            }
        } else {
            let status = command
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(spawn_error)?;
            CommandResult {
                code: status.code(),
                stdout: None,
                stderr: None,
            }
        };

        if !result.success() {
            warn!(command = %line, status = %result.exit_description(), "command failed");
        }
        Ok(result)
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        match &self.strategy {
            ExecStrategy::Native => which::which(program).ok(),
            ExecStrategy::Emulated { .. } => {
                // Spawned directly: no echo, and a miss is not a failure.
                let output = self
                    .command_for(&Cmd::new("which").arg(program))
                    .stdin(Stdio::null())
                    .output()
                    .ok()?;
                if !output.status.success() {
                    debug!(program, "not found through the emulated shell");
                    return None;
                }
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!path.is_empty()).then(|| PathBuf::from(path))
            }
        }
    }
}

/// Quote `word` for a POSIX shell if it contains anything special.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
