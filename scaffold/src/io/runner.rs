//! Runner: execute the entry file and recover from missing-module failures.
//!
//! [`InterpreterRunner`] owns the recovery state machine (diagnose, act, retry,
//! report). Launching and installing go through the [`Host`] trait so tests can
//! script child behavior without an interpreter.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelledError;
use crate::core::diagnose::{classify, distribution_name};
use crate::core::types::{DiagnosedCause, Recovery, RunOutcome};
use crate::io::config::ExecutionConfig;
use crate::io::process::run_command;

/// Parameters for one launch of the entry file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub entry: PathBuf,
    /// Working directory of the child (the entry file's directory).
    pub workdir: PathBuf,
    /// Module search path handed to the child: project root first, recovery
    /// extensions right behind it, all ahead of the inherited `PYTHONPATH`.
    pub search_path: Vec<PathBuf>,
}

/// Decoded result of one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Capabilities the runner needs from the host system.
pub trait Host {
    /// Run the entry file to completion and capture its output.
    fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutput>;
    /// Install `package` into the interpreter's environment. `Ok(false)` if the installer failed.
    fn install(&self, package: &str) -> Result<bool>;
}

/// Executes an entry file and reports the outcome.
pub trait ProgramRunner {
    fn run(&self, root: &Path, entry: &Path) -> Result<RunOutcome>;
}

/// Runner that launches through a [`Host`] and applies bounded recoveries.
#[derive(Debug, Clone)]
pub struct InterpreterRunner<H> {
    host: H,
}

impl<H: Host> InterpreterRunner<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

impl<H: Host> ProgramRunner for InterpreterRunner<H> {
    /// Launch `entry` with `root` on the search path.
    ///
    /// A missing local package prepends the entry's directory to the search path,
    /// directly after the root; a missing external package is installed. Each category is tried at most once,
    /// followed by one relaunch; anything else is reported as-is.
    #[instrument(skip_all, fields(entry = %entry.display()))]
    fn run(&self, root: &Path, entry: &Path) -> Result<RunOutcome> {
        let entry_dir = entry
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("entry {} has no parent directory", entry.display()))?;
        let mut request = LaunchRequest {
            entry: entry.to_path_buf(),
            workdir: entry_dir.clone(),
            search_path: vec![root.to_path_buf()],
        };
        let mut recoveries = Vec::new();
        let mut extended_path = false;
        let mut installed_package = false;

        loop {
            let output = self.host.launch(&request)?;
            if output.success {
                info!(recoveries = recoveries.len(), "entry ran successfully");
                return Ok(outcome(output, DiagnosedCause::None, recoveries));
            }

            let cause = classify(&output.stderr, |module| entry_dir.join(module).is_dir());
            debug!(exit_code = ?output.exit_code, cause = ?cause, "entry failed");
            match &cause {
                DiagnosedCause::MissingLocalPackage(module) if !extended_path => {
                    extended_path = true;
                    info!(module = %module, dir = %entry_dir.display(), "extending search path");
                    if !request.search_path.contains(&entry_dir) {
                        request.search_path.insert(1, entry_dir.clone());
                    }
                    recoveries.push(Recovery::ExtendSearchPath {
                        module: module.clone(),
                        dir: entry_dir.clone(),
                    });
                }
                DiagnosedCause::MissingExternalPackage(module) if !installed_package => {
                    installed_package = true;
                    let package = distribution_name(module);
                    info!(module = %module, package = %package, "installing missing package");
                    let installed = self.host.install(&package)?;
                    recoveries.push(Recovery::InstallPackage {
                        module: module.clone(),
                        package: package.clone(),
                        installed,
                    });
                    if !installed {
                        warn!(package = %package, "package installation failed");
                        return Ok(outcome(output, cause, recoveries));
                    }
                }
                _ => return Ok(outcome(output, cause, recoveries)),
            }
        }
    }
}

fn outcome(output: LaunchOutput, cause: DiagnosedCause, recoveries: Vec<Recovery>) -> RunOutcome {
    RunOutcome {
        exit_code: output.exit_code,
        success: output.success,
        stdout: output.stdout,
        stderr: output.stderr,
        diagnosed_cause: cause,
        recoveries,
    }
}

/// Host backed by real child processes of the configured interpreter.
#[derive(Debug, Clone)]
pub struct SystemHost {
    interpreter: String,
    install_args: Vec<String>,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

impl SystemHost {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            install_args: config.install_args.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl Host for SystemHost {
    #[instrument(skip_all, fields(interpreter = %self.interpreter))]
    fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutput> {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&request.entry)
            .current_dir(&request.workdir)
            .env("PYTHONPATH", python_path(&request.search_path)?)
            .env("PYTHONIOENCODING", "utf-8");

        let output = run_command(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("launch {}", request.entry.display()))?;
        if output.cancelled {
            return Err(CancelledError.into());
        }
        Ok(LaunchOutput {
            exit_code: output.status.code(),
            success: output.status.success() && !output.timed_out,
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
        })
    }

    #[instrument(skip_all, fields(package = %package))]
    fn install(&self, package: &str) -> Result<bool> {
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.install_args).arg(package);
        let output = run_command(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("install {package}"))?;
        if output.cancelled {
            return Err(CancelledError.into());
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), stderr = %output.stderr_text(), "installer failed");
        }
        Ok(output.status.success() && !output.timed_out)
    }
}

/// `PYTHONPATH` value: `search_path` first, then whatever the parent inherited.
fn python_path(search_path: &[PathBuf]) -> Result<OsString> {
    let mut dirs: Vec<PathBuf> = search_path.to_vec();
    if let Some(inherited) = env::var_os("PYTHONPATH") {
        dirs.extend(env::split_paths(&inherited));
    }
    env::join_paths(dirs).context("join PYTHONPATH")
}
