//! Handles to running worker processes.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::process::Command;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use tracing::warn;

use crate::errors::SupervisorError;
use crate::reporter::SUPERVISOR_TARGET;
use crate::service::{EntryPoint, ServiceArgs, ServiceFn, ServiceSpec};

/// Exit code of a function worker whose entry point panicked.
pub const PANIC_EXIT_CODE: i32 = 101;

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// The process exited with a status code.
    Exited(i32),
    /// The process was terminated by a signal.
    Signaled(Signal),
    /// The process was reaped elsewhere and its status is unknown.
    Vanished,
}

impl fmt::Display for ExitState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(formatter, "exited with status {code}"),
            Self::Signaled(signal) => write!(formatter, "terminated by {signal}"),
            Self::Vanished => formatter.write_str("vanished"),
        }
    }
}

/// A single OS process spawned from one service descriptor.
///
/// The exit status is recorded the first time the process is reaped; later
/// queries answer from that record, and signals are never sent once it is
/// set, so a recycled pid cannot be hit.
#[derive(Debug)]
pub struct Worker {
    name: String,
    pid: Pid,
    exit: Mutex<Option<ExitState>>,
}

impl Worker {
    /// Starts a process for `spec`.
    pub(crate) fn spawn(spec: &ServiceSpec) -> Result<Self, SupervisorError> {
        let pid = match spec.entry() {
            EntryPoint::Command(program) => {
                spawn_command(spec.name(), program, spec.service_args())?
            }
            EntryPoint::Function(function) => {
                fork_function(spec.name(), function.as_ref(), spec.service_args())?
            }
        };
        Ok(Self {
            name: spec.name().to_owned(),
            pid,
            exit: Mutex::new(None),
        })
    }

    /// Service name the worker was started for.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process identifier.
    #[must_use]
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// Exit state, if the process has been reaped.
    #[must_use]
    pub fn exit_state(&self) -> Option<ExitState> {
        *self.lock_exit()
    }

    /// Returns `true` while the process has not exited.
    ///
    /// Reaps the process without blocking when it has.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        let mut exit = self.lock_exit();
        if exit.is_some() {
            return false;
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => *exit = Some(ExitState::Exited(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => *exit = Some(ExitState::Signaled(signal)),
            Ok(_) | Err(Errno::EINTR) => {}
            Err(Errno::ECHILD) => *exit = Some(ExitState::Vanished),
            Err(error) => {
                warn!(
                    target: SUPERVISOR_TARGET,
                    service = %self.name,
                    pid = self.pid(),
                    error = %error,
                    "failed to query worker status; treating as exited"
                );
                *exit = Some(ExitState::Vanished);
            }
        }
        exit.is_none()
    }

    /// Sends a catchable termination request.
    pub fn terminate(&self) -> Result<(), SupervisorError> {
        self.signal(Signal::SIGTERM)
    }

    /// Sends a non-catchable kill.
    pub fn kill(&self) -> Result<(), SupervisorError> {
        self.signal(Signal::SIGKILL)
    }

    /// Blocks until the process has exited.
    pub fn join(&self) -> ExitState {
        loop {
            if let Some(state) = self.reaped() {
                return state;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }
    }

    /// Reaps the process if it has exited, returning its exit state.
    pub(crate) fn reaped(&self) -> Option<ExitState> {
        if self.is_alive() {
            None
        } else {
            self.exit_state()
        }
    }

    fn signal(&self, signal: Signal) -> Result<(), SupervisorError> {
        let exit = self.lock_exit();
        if exit.is_some() {
            return Ok(());
        }
        match signal::kill(self.pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(SupervisorError::Signal {
                name: self.name.clone(),
                pid: self.pid(),
                source,
            }),
        }
    }

    fn lock_exit(&self) -> std::sync::MutexGuard<'_, Option<ExitState>> {
        self.exit.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

fn spawn_command(name: &str, program: &str, args: &ServiceArgs) -> Result<Pid, SupervisorError> {
    let child = Command::new(program)
        .args(args.positional())
        .envs(args.keyword())
        .spawn()
        .map_err(|source| SupervisorError::Spawn {
            name: name.to_owned(),
            source,
        })?;
    let raw = i32::try_from(child.id()).map_err(|_| SupervisorError::Spawn {
        name: name.to_owned(),
        source: std::io::Error::other("pid out of range"),
    })?;
    // The child is reaped through its pid; dropping the handle neither waits
    // nor kills.
    drop(child);
    Ok(Pid::from_raw(raw))
}

fn fork_function(
    name: &str,
    function: &ServiceFn,
    args: &ServiceArgs,
) -> Result<Pid, SupervisorError> {
    // SAFETY: the child never returns into the caller; it restores default
    // signal dispositions, runs the entry point, and leaves through `_exit`.
    // Locks held by other parent threads are the entry point's concern; see
    // `ServiceSpec::function`.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => Ok(child),
        Ok(ForkResult::Child) => run_child(function, args),
        Err(source) => Err(SupervisorError::Fork {
            name: name.to_owned(),
            source,
        }),
    }
}

fn run_child(function: &ServiceFn, args: &ServiceArgs) -> ! {
    for inherited in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: installing the default disposition registers no handler code.
        unsafe { signal::signal(inherited, SigHandler::SigDfl) }.ok();
    }
    let code =
        panic::catch_unwind(AssertUnwindSafe(|| function(args))).unwrap_or(PANIC_EXIT_CODE);
    // SAFETY: `_exit` skips destructors and atexit hooks inherited from the
    // parent, which must only run there.
    unsafe { libc::_exit(code) }
}
