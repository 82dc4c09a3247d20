//! Process supervision for kindle services.
//!
//! A [`ProcessSupervisor`] owns named [`ServiceSpec`]s, starts each one as an
//! OS process, and stops them either immediately ([`ProcessSupervisor::kill`])
//! or cooperatively within a grace period
//! ([`ProcessSupervisor::shutdown`]), killing any worker that does not comply
//! in time.

mod errors;
mod grace;
mod reporter;
mod service;
mod supervisor;
mod worker;

pub use errors::SupervisorError;
pub use grace::GRACE_POLL_INTERVAL;
pub use reporter::{StructuredSupervisorReporter, SupervisorReporter};
pub use service::{EntryPoint, ServiceArgs, ServiceFn, ServiceSpec};
pub use supervisor::{ProcessSupervisor, ServiceStatus};
pub use worker::{ExitState, PANIC_EXIT_CODE, Worker};

/// Signal type carried by [`ExitState::Signaled`].
pub use nix::sys::signal::Signal;
