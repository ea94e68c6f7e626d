use netsim_lab_abstract::ParameterSet;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// How to launch the simulator. The argument vector is
/// `program args... [separator] --flag=value...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Token between the leading args and the parameter flags, e.g. `--`.
    #[serde(default)]
    pub separator: Option<String>,
    /// Simulator root; the process runs here.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Seconds before a run is killed. 0 disables the limit.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl SimulatorCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            separator: None,
            working_dir: default_working_dir(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Arguments passed after the program for one parameter set.
    pub fn argv(&self, params: &ParameterSet) -> Vec<String> {
        let mut argv = self.args.clone();
        if let Some(separator) = &self.separator {
            argv.push(separator.clone());
        }
        argv.extend(params.to_flags());
        argv
    }

    /// The full command line, for logs.
    pub fn display(&self, params: &ParameterSet) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.argv(params));
        parts.join(" ")
    }
}

/// Captured result of one finished simulator process.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub params: ParameterSet,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("failed to launch `{program}`")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("simulator did not finish within {0:?} and was killed")]
    Timeout(Duration),
    #[error("failed to collect simulator output")]
    Io(#[source] std::io::Error),
}

/// Runs the simulator once per parameter set.
pub trait Invoker {
    fn invoke(
        &self,
        params: &ParameterSet,
    ) -> impl Future<Output = Result<RunOutcome, InvokeError>>;
}

/// Launches the configured command as a child process.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    command: SimulatorCommand,
}

impl ProcessInvoker {
    pub fn new(command: SimulatorCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &SimulatorCommand {
        &self.command
    }
}

impl Invoker for ProcessInvoker {
    async fn invoke(&self, params: &ParameterSet) -> Result<RunOutcome, InvokeError> {
        debug!("Launching: {}", self.command.display(params));
        let started = Instant::now();

        let mut command = Command::new(&self.command.program);
        command
            .args(self.command.argv(params))
            .current_dir(&self.command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // `./ns3 run` forks the real simulation; give it a group we can kill whole.
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| InvokeError::Launch {
            program: self.command.program.display().to_string(),
            source,
        })?;
        let pid = child.id();

        let output = match self.command.timeout() {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    kill_process_group(pid);
                    return Err(InvokeError::Timeout(limit));
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(InvokeError::Io)?;

        Ok(RunOutcome {
            params: params.clone(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed: started.elapsed(),
        })
    }
}

/// SIGKILL every process in the child's group, grandchildren included.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => debug!("Killed simulator process group {pid}"),
        Err(err) => debug!("Process group {pid} already gone: {err}"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_: Option<u32>) {}
