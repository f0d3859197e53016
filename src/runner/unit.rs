//! Executable step units.
//!
//! A unit is anything that can be invoked and report an exit status plus
//! captured output. The step runner only sees the [`Runnable`] trait; how a
//! unit is realized (a script launch, an in-process function) is up to the
//! implementation.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::UnitError;

/// Captured outcome of one unit invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutput {
    /// Exit code; 0 means success.
    pub exit_code: i32,
    /// Standard output captured.
    pub stdout: String,
    /// Standard error captured.
    pub stderr: String,
}

impl UnitOutput {
    /// Creates a new unit output.
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// A successful invocation with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self::new(0, stdout, "")
    }

    /// A failed invocation with the given exit code and stderr.
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::new(exit_code, "", stderr)
    }

    /// Checks if the unit completed successfully (exit code 0).
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Capability interface for a unit of pipeline work.
#[async_trait]
pub trait Runnable: Send + Sync {
    /// Short description used in logs.
    fn describe(&self) -> String;

    /// Checks that the unit can be located before the first attempt.
    ///
    /// A resolution failure is a configuration error and is never retried.
    fn resolve(&self) -> Result<(), UnitError> {
        Ok(())
    }

    /// Runs the unit to completion and captures its outcome.
    async fn invoke(&self) -> Result<UnitOutput, UnitError>;
}

/// Launches a script through an interpreter, e.g. `python3 scripts/load.py`.
#[derive(Debug, Clone)]
pub struct ScriptUnit {
    /// Interpreter program.
    interpreter: String,
    /// Script path passed as first argument.
    script: PathBuf,
    /// Additional arguments after the script.
    args: Vec<String>,
    /// Working directory for the process.
    working_dir: Option<PathBuf>,
    /// Environment variables.
    env_vars: Vec<(String, String)>,
}

impl ScriptUnit {
    /// Creates a new script unit.
    pub fn new(interpreter: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
            args: Vec::new(),
            working_dir: None,
            env_vars: Vec::new(),
        }
    }

    /// Sets extra arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }
}

#[async_trait]
impl Runnable for ScriptUnit {
    fn describe(&self) -> String {
        format!("{} {}", self.interpreter, self.script.display())
    }

    fn resolve(&self) -> Result<(), UnitError> {
        if self.interpreter.trim().is_empty() {
            return Err(UnitError::Invalid("interpreter cannot be empty".to_string()));
        }
        if !self.script.is_file() {
            return Err(UnitError::NotFound(self.script.clone()));
        }
        Ok(())
    }

    async fn invoke(&self) -> Result<UnitOutput, UnitError> {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&self.script);

        for arg in &self.args {
            cmd.arg(arg);
        }

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!("Launching {}", self.describe());

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                UnitError::Invalid(format!("interpreter '{}' not found", self.interpreter))
            } else {
                UnitError::Launch {
                    program: self.interpreter.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        // A process killed by a signal has no exit code
        let exit_code = output.status.code().unwrap_or(-1);
        Ok(UnitOutput::new(
            exit_code,
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        ))
    }
}

type UnitFuture = Pin<Box<dyn Future<Output = Result<UnitOutput, UnitError>> + Send>>;

/// Runs an in-process async function as a unit.
#[derive(Clone)]
pub struct FnUnit {
    name: String,
    func: Arc<dyn Fn() -> UnitFuture + Send + Sync>,
}

impl FnUnit {
    /// Wraps an async function.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<UnitOutput, UnitError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move || -> UnitFuture { Box::pin(func()) }),
        }
    }
}

impl std::fmt::Debug for FnUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnUnit").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Runnable for FnUnit {
    fn describe(&self) -> String {
        format!("fn {}", self.name)
    }

    async fn invoke(&self) -> Result<UnitOutput, UnitError> {
        (self.func)().await
    }
}
