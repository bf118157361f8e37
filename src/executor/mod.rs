//! Code execution.
//!
//! The consumer never interprets generated code itself; it hands the
//! program to a [`CodeExecutor`] and looks only at the exit status.
//! [`ProcessExecutor`] runs the program with an external interpreter.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tempfile::TempPath;
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::snapshot::GeneratedCode;

/// What running a program produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Process exit status; 0 is success.
    pub exit_code: i32,

    /// Captured stdout, followed by stderr when non-empty.
    pub output: String,
}

impl ExecutionReport {
    /// Returns true when the exit status is 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs generated programs.
pub trait CodeExecutor: Send + Sync {
    /// Runs `code` to completion.
    ///
    /// A program that runs and fails is an `Ok` report with a non-zero
    /// exit code. `Err` means the program could not be started at all.
    fn run(&self, code: &GeneratedCode) -> Result<ExecutionReport>;
}

/// Executes programs by writing them to a script file and invoking an
/// interpreter on it.
#[derive(Clone, Debug)]
pub struct ProcessExecutor {
    interpreter: String,
    args: Vec<String>,
    extension: String,
    work_dir: Option<PathBuf>,
}

impl Default for ProcessExecutor {
    /// `python3 <script>.py`
    fn default() -> Self {
        Self::new("python3", "py")
    }
}

impl ProcessExecutor {
    /// Creates an executor for `interpreter`, writing scripts with
    /// `extension`.
    pub fn new(interpreter: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            args: Vec::new(),
            extension: extension.into(),
            work_dir: None,
        }
    }

    /// Adds arguments passed to the interpreter before the script path.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs programs from `dir` instead of the current directory.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Writes `code` to a fresh script file, removed when the returned
    /// path is dropped.
    fn write_script(&self, code: &GeneratedCode) -> Result<TempPath> {
        let suffix = format!(".{}", self.extension);
        let mut file = tempfile::Builder::new()
            .prefix("solvecache-")
            .suffix(&suffix)
            .tempfile()?;
        writeln!(file, "{}", code.source())?;
        file.flush()?;
        Ok(file.into_temp_path())
    }
}

impl CodeExecutor for ProcessExecutor {
    #[instrument(skip(self, code), fields(interpreter = %self.interpreter))]
    fn run(&self, code: &GeneratedCode) -> Result<ExecutionReport> {
        let script = self.write_script(code)?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.args)
            .arg(&*script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.work_dir {
            cmd.current_dir(dir);
        }
        let result = cmd.output();

        let path = script.to_path_buf();
        if let Err(e) = script.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove script file");
        }
        let output = result?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        // Killed by a signal: no exit code
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(exit_code = exit_code, output_len = text.len(), "Program finished");

        Ok(ExecutionReport {
            exit_code,
            output: text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_success() {
        let ok = ExecutionReport {
            exit_code: 0,
            output: String::new(),
        };
        let failed = ExecutionReport {
            exit_code: 2,
            output: String::new(),
        };
        assert!(ok.is_success());
        assert!(!failed.is_success());
    }

    #[cfg(unix)]
    #[test]
    fn test_process_executor_runs_shell() {
        let executor = ProcessExecutor::new("sh", "sh");
        let code = GeneratedCode::new(vec!["x=21".into()], "echo $((x * 2))", "int");
        let report = executor.run(&code).unwrap();
        assert!(report.is_success());
        assert_eq!(report.output.trim(), "42");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_executor_reports_failure() {
        let executor = ProcessExecutor::new("sh", "sh");
        let code = GeneratedCode::new(vec!["echo boom >&2".into()], "exit 3", "None");
        let report = executor.run(&code).unwrap();
        assert_eq!(report.exit_code, 3);
        assert!(report.output.contains("boom"));
    }

    #[test]
    fn test_missing_interpreter_is_an_error() {
        let executor = ProcessExecutor::new("definitely-not-an-interpreter-xyz", "txt");
        let code = GeneratedCode::new(vec!["noop".into()], "", "None");
        assert!(executor.run(&code).is_err());
    }
}
