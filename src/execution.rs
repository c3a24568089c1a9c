//! External kernel execution
//!
//! Stages describe a kernel call as an [`Invocation`] and hand it to the
//! run's [`ExecutionContext`]. The context is built once per run and passed
//! explicitly; there is no process-wide runner.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{PipelineError, Result};

/// A single external program call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Invocation { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, value: impl AsRef<OsStr>) -> Self {
        self.args.push(value.as_ref().to_os_string());
        self
    }

    /// `-name value`
    pub fn option(self, name: &str, value: impl AsRef<OsStr>) -> Self {
        self.arg(name).arg(value)
    }

    /// `-name value` only when `value` is set.
    pub fn option_if<V: AsRef<OsStr>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.option(name, v),
            None => self,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// True if `value` appears as an argument.
    pub fn has_arg(&self, value: impl AsRef<OsStr>) -> bool {
        self.args.iter().any(|a| a.as_os_str() == value.as_ref())
    }

    /// The argument following `name`, if any.
    pub fn option_value(&self, name: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|a| a == name)
            .and_then(|i| self.args.get(i + 1))
            .map(|a| a.as_os_str())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs kernels to completion or fails.
pub trait KernelRunner {
    fn run(&self, invocation: &Invocation) -> Result<()>;
}

/// Spawns kernels as local processes.
#[derive(Clone, Debug, Default)]
pub struct LocalRunner;

impl KernelRunner for LocalRunner {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        debug!(command = %invocation, "running kernel");
        let status = Command::new(invocation.program())
            .args(invocation.args())
            .status()
            .map_err(|e| PipelineError::io(Path::new(invocation.program()), e))?;

        if status.success() {
            Ok(())
        } else {
            Err(PipelineError::KernelFailed {
                program: invocation.program().to_string(),
                status: status.to_string(),
            })
        }
    }
}

/// Per-run execution state: thread budget and the runner.
pub struct ExecutionContext {
    threads: usize,
    runner: Box<dyn KernelRunner>,
}

impl ExecutionContext {
    pub fn new(threads: usize, runner: Box<dyn KernelRunner>) -> Self {
        ExecutionContext { threads: threads.max(1), runner }
    }

    pub fn local(threads: usize) -> Self {
        Self::new(threads, Box::new(LocalRunner))
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn run(&self, invocation: &Invocation) -> Result<()> {
        self.runner.run(invocation)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext").field("threads", &self.threads).finish_non_exhaustive()
    }
}
