//! Service descriptors handed to the supervisor before it starts workers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Entry point run inside a forked worker; the return value is the exit code.
pub type ServiceFn = dyn Fn(&ServiceArgs) -> i32 + Send + Sync;

/// Positional and keyword arguments passed to a worker entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceArgs {
    positional: Vec<String>,
    keyword: BTreeMap<String, String>,
}

impl ServiceArgs {
    /// Positional arguments in declaration order.
    #[must_use]
    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    /// Keyword arguments sorted by name.
    #[must_use]
    pub fn keyword(&self) -> &BTreeMap<String, String> {
        &self.keyword
    }

    /// Looks up a keyword argument.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.keyword.get(key).map(String::as_str)
    }
}

/// How a worker process is brought into existence.
#[derive(Clone)]
pub enum EntryPoint {
    /// Executes an external program. Keyword arguments become environment
    /// variables of the child.
    Command(String),
    /// Runs a closure in a forked copy of the current process.
    Function(Arc<ServiceFn>),
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(program) => formatter.debug_tuple("Command").field(program).finish(),
            Self::Function(_) => formatter.write_str("Function(..)"),
        }
    }
}

/// A named, not-yet-started worker.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    name: String,
    entry: EntryPoint,
    args: ServiceArgs,
}

impl ServiceSpec {
    /// Describes a worker running `function` in a forked child.
    ///
    /// The child is forked from a multithreaded parent and holds only the
    /// forking thread. A lock another parent thread held at fork time stays
    /// locked in the child forever, including the stderr lock used by
    /// logging and any allocator lock. Keep `function` to work that does not
    /// contend with the parent's threads, or use [`ServiceSpec::command`]
    /// for workers that must run arbitrary code.
    pub fn function<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&ServiceArgs) -> i32 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            entry: EntryPoint::Function(Arc::new(function)),
            args: ServiceArgs::default(),
        }
    }

    /// Describes a worker executing `program`.
    pub fn command(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: EntryPoint::Command(program.into()),
            args: ServiceArgs::default(),
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.positional.push(value.into());
        self
    }

    /// Appends every positional argument in `values`.
    #[must_use]
    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .positional
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Sets a keyword argument, replacing any earlier value for `key`.
    #[must_use]
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.keyword.insert(key.into(), value.into());
        self
    }

    /// Human-facing service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry point of the worker.
    #[must_use]
    pub fn entry(&self) -> &EntryPoint {
        &self.entry
    }

    /// Arguments passed to the entry point.
    #[must_use]
    pub fn service_args(&self) -> &ServiceArgs {
        &self.args
    }
}
