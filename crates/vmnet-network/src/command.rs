//! External command model.
//!
//! Every host mutation is expressed as a [`HostAction`]: either a program
//! with an argument vector, or a write to a procfs file. Nothing is ever
//! passed through a shell.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::process::Command;

use vmnet_common::{VmnetError, VmnetResult};

/// A program invocation with an explicit argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostCommand {
    /// Program name or path.
    pub program: PathBuf,
    /// Arguments, one element per argv slot.
    pub args: Vec<String>,
}

impl HostCommand {
    /// Create a command from a program and its arguments.
    pub fn new<I, S>(program: impl AsRef<Path>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.as_ref().to_path_buf(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Run the command to completion, capturing its output.
    ///
    /// A non-zero exit is not an error here; see [`CommandOutput::check`].
    pub async fn output(&self) -> VmnetResult<CommandOutput> {
        tracing::debug!(command = %self, "Running command");

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|source| VmnetError::CommandSpawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let result = CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };

        if !result.success {
            tracing::debug!(command = %self, status = %result.status, stderr = %result.stderr, "Command exited unsuccessfully");
        }

        Ok(result)
    }

    /// Run the command and fail unless it exits successfully.
    pub async fn run(&self) -> VmnetResult<CommandOutput> {
        self.output().await?.check(self)
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the exit status was zero.
    pub success: bool,
    /// Exit status as reported by the OS.
    pub status: String,
    /// Standard output.
    pub stdout: String,
    /// Standard error, trimmed.
    pub stderr: String,
}

impl CommandOutput {
    /// Turn an unsuccessful exit into an error.
    pub fn check(self, command: &HostCommand) -> VmnetResult<Self> {
        if self.success {
            return Ok(self);
        }

        if is_permission_error(&self.stderr) {
            return Err(VmnetError::PermissionDenied {
                operation: command.to_string(),
            });
        }

        Err(VmnetError::CommandFailed {
            command: command.to_string(),
            status: self.status,
            stderr: self.stderr,
        })
    }
}

fn is_permission_error(stderr: &str) -> bool {
    stderr.contains("Operation not permitted")
        || stderr.contains("Permission denied")
        || stderr.contains("you must be root")
}

/// A single host mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum HostAction {
    /// Run a program.
    Run(HostCommand),
    /// Write a value to a file.
    WriteFile {
        /// Target file.
        path: PathBuf,
        /// Bytes written, as text.
        contents: String,
    },
}

impl fmt::Display for HostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(cmd) => write!(f, "{cmd}"),
            Self::WriteFile { path, contents } => {
                write!(f, "write {contents:?} > {}", path.display())
            }
        }
    }
}

/// Builders for the `ip` invocations vmnet issues.
pub mod ip {
    use std::path::Path;

    use super::HostCommand;

    /// `ip tuntap add <name> mode tap`
    pub fn tuntap_add(bin: &Path, name: &str) -> HostCommand {
        HostCommand::new(bin, ["tuntap", "add", name, "mode", "tap"])
    }

    /// `ip addr add <cidr> dev <name>`
    pub fn addr_add(bin: &Path, cidr: &str, name: &str) -> HostCommand {
        HostCommand::new(bin, ["addr", "add", cidr, "dev", name])
    }

    /// `ip link set <name> up`
    pub fn link_up(bin: &Path, name: &str) -> HostCommand {
        HostCommand::new(bin, ["link", "set", name, "up"])
    }

    /// `ip link show <name>`
    pub fn link_show(bin: &Path, name: &str) -> HostCommand {
        HostCommand::new(bin, ["link", "show", name])
    }

    /// `ip -details link show <name>`
    pub fn link_show_details(bin: &Path, name: &str) -> HostCommand {
        HostCommand::new(bin, ["-details", "link", "show", name])
    }

    /// `ip link delete <name>`
    pub fn link_delete(bin: &Path, name: &str) -> HostCommand {
        HostCommand::new(bin, ["link", "delete", name])
    }

    /// `ip route show default`
    pub fn route_default(bin: &Path) -> HostCommand {
        HostCommand::new(bin, ["route", "show", "default"])
    }
}
