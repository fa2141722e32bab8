//! External command execution.
//!
//! Every tool is started from an argument vector. Nothing is ever handed to
//! `sh -c`: blob names come from an untrusted manifest and must reach the
//! tool as a single argument, whatever characters they contain.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use tracing::debug;

use crate::error::CommandError;

/// Builder for one external command.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
}

impl Cmd {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a path as an argument, without lossy conversion.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_owned());
        self
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        cmd
    }

    fn io_error(&self, source: io::Error) -> CommandError {
        CommandError::Io {
            program: self.program_name(),
            source,
        }
    }

    fn check_status(&self, status: ExitStatus, stderr: &[u8]) -> Result<(), CommandError> {
        if status.success() {
            return Ok(());
        }
        Err(CommandError::Failed {
            program: self.program_name(),
            code: status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        })
    }

    /// Run to completion and return captured stdout.
    pub fn run(self) -> Result<String, CommandError> {
        debug!(program = %self.program_name(), args = ?self.args, "running command");

        let output = self.command().output().map_err(|source| CommandError::Spawn {
            program: self.program_name(),
            source,
        })?;

        self.check_status(output.status, &output.stderr)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run, copying stdout into `sink` as it is produced.
    ///
    /// Returns the number of bytes copied. Stderr is drained on its own
    /// thread so a chatty child cannot stall on a full pipe. The sink may
    /// hold partial output when this fails.
    pub fn stream_stdout(self, sink: &mut dyn Write) -> Result<u64, CommandError> {
        debug!(program = %self.program_name(), args = ?self.args, "streaming command output");

        let mut child = self
            .command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: self.program_name(),
                source,
            })?;

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                buf
            })
        });

        let copied = match child.stdout.take() {
            Some(mut stdout) => io::copy(&mut stdout, sink),
            None => Ok(0),
        };
        if copied.is_err() {
            // The child may block writing to a pipe nobody reads any more.
            let _ = child.kill();
        }

        // Reap the child even when the copy failed.
        let status = child.wait().map_err(|e| self.io_error(e))?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        let copied = copied.map_err(|e| self.io_error(e))?;
        self.check_status(status, &stderr)?;
        Ok(copied)
    }
}

/// Full path of `program` if it is in PATH.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout() {
        let out = Cmd::new("echo").arg("hello").run().unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn test_run_failure_includes_stderr() {
        let err = Cmd::new("ls")
            .arg("/nonexistent_path_12345")
            .run()
            .unwrap_err();
        let msg = err.to_string();

        assert!(matches!(err, CommandError::Failed { .. }));
        assert!(msg.contains("No such file") || msg.contains("cannot access"));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = Cmd::new("nonexistent_program_12345").arg("x").run().unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[test]
    fn test_arguments_are_not_shell_parsed() {
        let hostile = "kernel.img; touch /tmp/pwned-12345 $(id)";
        let out = Cmd::new("echo").arg(hostile).run().unwrap();
        assert_eq!(out.trim(), hostile);
    }

    #[test]
    fn test_stream_stdout_into_writer() {
        let mut sink = Vec::new();
        let n = Cmd::new("printf")
            .arg("abc")
            .stream_stdout(&mut sink)
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(sink, b"abc");
    }

    #[test]
    fn test_stream_stdout_reports_failure() {
        let mut sink = Vec::new();
        let err = Cmd::new("ls")
            .arg("/nonexistent_path_12345")
            .stream_stdout(&mut sink)
            .unwrap_err();
        assert!(matches!(err, CommandError::Failed { .. }));
    }

    #[test]
    fn test_stream_stdout_with_large_stderr() {
        // 256 KiB of stderr before any stdout, more than a pipe buffer holds.
        let script = "head -c 262144 /dev/zero >&2; printf done";
        let mut sink = Vec::new();
        let n = Cmd::new("sh")
            .args(["-c", script])
            .stream_stdout(&mut sink)
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(sink, b"done");
    }

    #[test]
    fn test_which() {
        assert!(which("sh").is_some());
        assert!(which("nonexistent_program_12345").is_none());
    }
}
