//! Key to provider registry shared by every bundle.
//!
//! The container starts unconfigured and becomes usable with its first
//! [`Container::install`]. Providers decide how an instance is produced: a
//! shared value, a fresh value per resolve, a lazily built singleton, an alias
//! for another key, a key of another container, or a resource released at
//! shutdown.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use thiserror::Error;
use tracing::{debug, warn};

/// Key under which the kernel installs a [`KernelHandle`](crate::KernelHandle).
pub const KERNEL_KEY: &str = "kernel";
/// Key under which the kernel installs its `Arc<EventBus>`.
pub const EVENT_BUS_KEY: &str = "event_bus";
/// Key under which the kernel installs the validated `Configuration`.
pub const CONFIGURATION_KEY: &str = "configuration";

const CONTAINER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::container");
const MAX_ALIAS_DEPTH: usize = 32;

/// A type-erased instance held or produced by a provider.
pub type Instance = Arc<dyn Any + Send + Sync>;

type Build = dyn Fn(&Container) -> Result<Instance, ProviderError> + Send + Sync;
type Release = dyn Fn(&Instance) + Send + Sync;

/// Failure raised while a provider builds an instance.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    /// Creates an error carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ContainerError> for ProviderError {
    fn from(error: ContainerError) -> Self {
        Self::new(error.to_string())
    }
}

/// Errors returned by [`Container::resolve`].
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Nothing has been installed yet.
    #[error("container is not configured; cannot resolve '{key}'")]
    NotConfigured {
        /// Requested key.
        key: String,
    },
    /// The key was never installed.
    #[error("no provider installed for '{key}'")]
    MissingKey {
        /// Requested key.
        key: String,
    },
    /// The instance is not of the requested type.
    #[error("'{key}' does not hold a {expected}")]
    TypeMismatch {
        /// Requested key.
        key: String,
        /// Name of the requested type.
        expected: &'static str,
    },
    /// The provider failed to build the instance.
    #[error("provider for '{key}' failed: {source}")]
    Provider {
        /// Requested key.
        key: String,
        /// Underlying provider failure.
        #[source]
        source: ProviderError,
    },
    /// Aliases for the key refer back to themselves.
    #[error("alias chain starting at '{key}' does not terminate")]
    AliasCycle {
        /// Requested key.
        key: String,
    },
}

enum Kind {
    Value(Instance),
    Factory(Arc<Build>),
    Singleton {
        build: Arc<Build>,
        cache: Cache,
    },
    Alias(String),
    Delegate {
        container: Arc<Container>,
        key: String,
    },
    Resource {
        build: Arc<Build>,
        release: Arc<Release>,
        cache: Cache,
    },
}

/// Recipe for the instance behind one key.
pub struct Provider {
    kind: Kind,
}

impl fmt::Debug for Provider {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            Kind::Value(_) => "value",
            Kind::Factory(_) => "factory",
            Kind::Singleton { .. } => "singleton",
            Kind::Alias(_) => "alias",
            Kind::Delegate { .. } => "delegate",
            Kind::Resource { .. } => "resource",
        };
        formatter.debug_struct("Provider").field("kind", &kind).finish()
    }
}

impl Provider {
    /// Shares `value` with every resolver.
    pub fn value<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self::shared(Arc::new(value))
    }

    /// Shares an existing `Arc` with every resolver.
    pub fn shared<T>(value: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            kind: Kind::Value(value),
        }
    }

    /// Builds a fresh instance on every resolve.
    pub fn factory<T, F>(build: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T, ProviderError> + Send + Sync + 'static,
    {
        Self {
            kind: Kind::Factory(erase(build)),
        }
    }

    /// Builds the instance on first resolve and shares it afterwards.
    pub fn singleton<T, F>(build: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T, ProviderError> + Send + Sync + 'static,
    {
        Self {
            kind: Kind::Singleton {
                build: erase(build),
                cache: Cache::default(),
            },
        }
    }

    /// Resolves `target` in the same container instead.
    pub fn alias(target: impl Into<String>) -> Self {
        Self {
            kind: Kind::Alias(target.into()),
        }
    }

    /// Resolves `key` in another container, sharing its instances.
    pub fn delegate(container: Arc<Container>, key: impl Into<String>) -> Self {
        Self {
            kind: Kind::Delegate {
                container,
                key: key.into(),
            },
        }
    }

    /// Builds a shared instance on first resolve and hands it to `release`
    /// when the container shuts its resources down.
    pub fn resource<T, F, R>(build: F, release: R) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T, ProviderError> + Send + Sync + 'static,
        R: Fn(&T) + Send + Sync + 'static,
    {
        let release: Arc<Release> = Arc::new(move |instance: &Instance| {
            if let Some(value) = instance.downcast_ref::<T>() {
                release(value);
            }
        });
        Self {
            kind: Kind::Resource {
                build: erase(build),
                release,
                cache: Cache::default(),
            },
        }
    }

    fn release(&self) -> bool {
        let Kind::Resource { release, cache, .. } = &self.kind else {
            return false;
        };
        let Some(value) = cache.take() else {
            return false;
        };
        release(&value);
        true
    }
}

fn erase<T, F>(build: F) -> Arc<Build>
where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T, ProviderError> + Send + Sync + 'static,
{
    Arc::new(move |container: &Container| {
        build(container).map(|value| Arc::new(value) as Instance)
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
enum Slot {
    #[default]
    Empty,
    Building(ThreadId),
    Ready(Instance),
}

/// Lazily built instance shared by singleton and resource providers.
///
/// The lock is never held while building, so a builder may resolve other
/// keys freely. Concurrent resolvers wait for the first build; a builder
/// that needs its own key gets an error instead.
#[derive(Default)]
struct Cache {
    slot: Mutex<Slot>,
    settled: Condvar,
}

impl Cache {
    fn get_or_build(&self, build: &Build, container: &Container) -> Result<Instance, ProviderError> {
        let current = thread::current().id();
        let mut slot = lock(&self.slot);
        loop {
            let waiting = match &*slot {
                Slot::Ready(existing) => return Ok(Arc::clone(existing)),
                Slot::Building(builder) if *builder == current => {
                    return Err(ProviderError::new(
                        "instance is still being built; its provider depends on itself",
                    ));
                }
                Slot::Building(_) => true,
                Slot::Empty => false,
            };
            if !waiting {
                break;
            }
            slot = self
                .settled
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *slot = Slot::Building(current);
        drop(slot);

        let mut pending = PendingBuild {
            cache: self,
            settled: false,
        };
        let built = build(container)?;
        pending.settle(Slot::Ready(Arc::clone(&built)));
        Ok(built)
    }

    fn take(&self) -> Option<Instance> {
        let mut slot = lock(&self.slot);
        match std::mem::take(&mut *slot) {
            Slot::Ready(instance) => Some(instance),
            other => {
                *slot = other;
                None
            }
        }
    }
}

/// Resets an unfinished build so waiters retry after a failure or panic.
struct PendingBuild<'a> {
    cache: &'a Cache,
    settled: bool,
}

impl PendingBuild<'_> {
    fn settle(&mut self, slot: Slot) {
        *lock(&self.cache.slot) = slot;
        self.settled = true;
        self.cache.settled.notify_all();
    }
}

impl Drop for PendingBuild<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.settle(Slot::Empty);
        }
    }
}

/// Registry of named providers.
#[derive(Default)]
pub struct Container {
    providers: RwLock<Option<HashMap<String, Arc<Provider>>>>,
}

impl fmt::Debug for Container {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers = self.providers.read().unwrap_or_else(|p| p.into_inner());
        let mut keys: Vec<&str> = providers
            .iter()
            .flat_map(|map| map.keys().map(String::as_str))
            .collect();
        keys.sort_unstable();
        formatter
            .debug_struct("Container")
            .field("configured", &providers.is_some())
            .field("keys", &keys)
            .finish()
    }
}

impl Container {
    /// Creates an unconfigured container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `provider` under `key`, replacing any previous provider.
    pub fn install(&self, key: impl Into<String>, provider: Provider) {
        let key = key.into();
        debug!(target: CONTAINER_TARGET, key = %key, provider = ?provider, "provider installed");
        self.providers
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
            .get_or_insert_with(HashMap::new)
            .insert(key, Arc::new(provider));
    }

    /// Returns `true` once anything has been installed.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.providers
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .is_some()
    }

    /// Returns `true` if a provider is installed under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .as_ref()
            .is_some_and(|providers| providers.contains_key(key))
    }

    /// Resolves `key` as a `T`.
    pub fn resolve<T>(&self, key: &str) -> Result<Arc<T>, ContainerError>
    where
        T: Any + Send + Sync,
    {
        self.resolve_instance(key)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                key: key.to_owned(),
                expected: type_name::<T>(),
            })
    }

    /// Resolves `key` without checking its type.
    pub fn resolve_instance(&self, key: &str) -> Result<Instance, ContainerError> {
        let mut current = key.to_owned();
        for _ in 0..MAX_ALIAS_DEPTH {
            let provider = self.provider(&current)?;
            let built = match &provider.kind {
                Kind::Alias(target) => {
                    current.clone_from(target);
                    continue;
                }
                Kind::Delegate { container, key } => return container.resolve_instance(key),
                Kind::Value(value) => Ok(Arc::clone(value)),
                Kind::Factory(build) => build(self),
                Kind::Singleton { build, cache } | Kind::Resource { build, cache, .. } => {
                    cache.get_or_build(build.as_ref(), self)
                }
            };
            return built.map_err(|source| ContainerError::Provider {
                key: current,
                source,
            });
        }
        Err(ContainerError::AliasCycle {
            key: key.to_owned(),
        })
    }

    /// Releases every resource instance built so far.
    ///
    /// Resources never resolved are skipped; a released resource is built
    /// afresh if resolved again.
    pub fn shutdown_resources(&self) {
        let providers: Vec<(String, Arc<Provider>)> = self
            .providers
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .iter()
            .flat_map(|map| map.iter().map(|(key, p)| (key.clone(), Arc::clone(p))))
            .collect();
        for (key, provider) in providers {
            if provider.release() {
                debug!(target: CONTAINER_TARGET, key = %key, "resource released");
            }
        }
    }

    fn provider(&self, key: &str) -> Result<Arc<Provider>, ContainerError> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|poison| poison.into_inner());
        let Some(map) = providers.as_ref() else {
            warn!(target: CONTAINER_TARGET, key, "resolve before configuration");
            return Err(ContainerError::NotConfigured {
                key: key.to_owned(),
            });
        };
        map.get(key)
            .cloned()
            .ok_or_else(|| ContainerError::MissingKey {
                key: key.to_owned(),
            })
    }
}
