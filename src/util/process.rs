//! Subprocess execution utilities.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use thiserror::Error;

/// Failure to run an external tool.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The tool ran and exited unsuccessfully. `status` is `None` when the
    /// process was killed by a signal.
    #[error("`{command}` failed with exit status {}{}", display_status(.status), display_stderr(.stderr))]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

fn display_status(status: &Option<i32>) -> String {
    status.map_or_else(|| "<signal>".to_string(), |code| code.to_string())
}

fn display_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{}", trimmed)
    }
}

impl ProcessError {
    /// Exit status of a failed command, if it exited normally.
    pub fn status(&self) -> Option<i32> {
        match self {
            ProcessError::Failed { status, .. } => *status,
            ProcessError::Spawn { .. } => None,
        }
    }
}

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    /// Run to completion, capturing stdout and stderr.
    pub fn exec(&self) -> Result<Output, ProcessError> {
        self.build_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ProcessError::Spawn {
                command: self.display_command(),
                source,
            })
    }

    /// Run and require a zero exit status.
    pub fn exec_and_check(&self) -> Result<Output, ProcessError> {
        let output = self.exec()?;
        if !output.status.success() {
            return Err(ProcessError::Failed {
                command: self.display_command(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output)
    }

    /// The command line as it would be typed in a shell, for logs and errors.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("xtensa-lx106-elf-objcopy")
            .args(["--only-keep-debug", "firmware.elf", "firmware.elf.debug"]);

        assert_eq!(
            pb.display_command(),
            "xtensa-lx106-elf-objcopy --only-keep-debug firmware.elf firmware.elf.debug"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_and_check_reports_status() {
        let err = ProcessBuilder::new("sh")
            .args(["-c", "echo broken >&2; exit 3"])
            .exec_and_check()
            .unwrap_err();

        assert_eq!(err.status(), Some(3));
        let message = err.to_string();
        assert!(message.contains("exit status 3"), "{message}");
        assert!(message.contains("broken"), "{message}");
    }

    #[test]
    fn test_spawn_failure() {
        let err = ProcessBuilder::new("definitely-not-a-real-tool-4242")
            .exec()
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert_eq!(err.status(), None);
    }
}
