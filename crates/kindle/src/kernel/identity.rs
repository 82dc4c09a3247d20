use std::process;

/// Identity of the process that booted a kernel.
///
/// Forked workers inherit the kernel but not its identity, which lets
/// [`Kernel::shutdown`](crate::Kernel::shutdown) leave the worker list to the
/// process that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    origin: u32,
}

impl ProcessIdentity {
    /// Captures the calling process as the origin.
    #[must_use]
    pub fn current() -> Self {
        Self::with_origin(process::id())
    }

    /// Uses `pid` as the origin.
    #[must_use]
    pub const fn with_origin(pid: u32) -> Self {
        Self { origin: pid }
    }

    /// Process id captured as the origin.
    #[must_use]
    pub const fn origin(&self) -> u32 {
        self.origin
    }

    /// Returns `true` when called from the origin process.
    #[must_use]
    pub fn is_origin(&self) -> bool {
        process::id() == self.origin
    }
}
