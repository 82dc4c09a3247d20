//! Kernel construction and the boot phase sequence.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use kindle_config::{
    ConfigSchema, ConfigurationLoader, DEFAULT_APP_CONFIG, DEFAULT_APP_PARAMETERS,
    YamlConfigurationLoader, default_grace_period,
};
use kindle_supervisor::{ProcessSupervisor, StructuredSupervisorReporter, SupervisorReporter};

use super::error::BootError;
use super::identity::ProcessIdentity;
use super::reporter::{KernelReporter, StructuredKernelReporter};
use super::state::{BootPhase, KernelState};
use super::{Kernel, KernelInner};
use crate::bundle::Bundle;
use crate::container::{CONFIGURATION_KEY, Container, EVENT_BUS_KEY, KERNEL_KEY, Provider};
use crate::event::{
    CONFIGURATION_READY, ConfigurationReady, Event, EventBus, EventType, InjectorReady,
    KERNEL_READY, KERNEL_SHUTDOWN, KernelReady, Listener,
};

/// Collects bundles and collaborators, then boots a [`Kernel`].
pub struct KernelBuilder {
    environment: String,
    bundles: Vec<Arc<dyn Bundle>>,
    loader: Option<Box<dyn ConfigurationLoader>>,
    reporter: Arc<dyn KernelReporter>,
    supervisor_reporter: Arc<dyn SupervisorReporter>,
    grace_period: Duration,
    identity: Option<ProcessIdentity>,
}

impl fmt::Debug for KernelBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bundles: Vec<&str> = self.bundles.iter().map(|bundle| bundle.name()).collect();
        formatter
            .debug_struct("KernelBuilder")
            .field("environment", &self.environment)
            .field("bundles", &bundles)
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}

impl KernelBuilder {
    pub(super) fn new(environment: String) -> Self {
        Self {
            environment,
            bundles: Vec::new(),
            loader: None,
            reporter: Arc::new(StructuredKernelReporter::new()),
            supervisor_reporter: Arc::new(StructuredSupervisorReporter::new()),
            grace_period: default_grace_period(),
            identity: None,
        }
    }

    /// Adds a bundle; bundles contribute in the order they are added.
    #[must_use]
    pub fn bundle(mut self, bundle: impl Bundle + 'static) -> Self {
        self.bundles.push(Arc::new(bundle));
        self
    }

    /// Adds every bundle from `bundles`.
    #[must_use]
    pub fn bundles<I>(mut self, bundles: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Bundle>>,
    {
        self.bundles.extend(bundles);
        self
    }

    /// Replaces the configuration loader.
    ///
    /// Defaults to YAML sources at the default paths, with parameters
    /// overridden from the process environment.
    #[must_use]
    pub fn loader(mut self, loader: impl ConfigurationLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Replaces the kernel lifecycle reporter.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn KernelReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replaces the reporter handed to the process supervisor.
    #[must_use]
    pub fn supervisor_reporter(mut self, reporter: Arc<dyn SupervisorReporter>) -> Self {
        self.supervisor_reporter = reporter;
        self
    }

    /// Sets the time each worker is given to stop after a graceful request.
    #[must_use]
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    #[cfg(test)]
    pub(crate) fn identity(mut self, identity: ProcessIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Runs every boot phase in order.
    ///
    /// Boot is all or nothing: the first failing phase aborts it, and no
    /// service is registered unless every earlier phase succeeded.
    pub fn boot(self) -> Result<Kernel, BootError> {
        let reporter = Arc::clone(&self.reporter);
        reporter.boot_starting(&self.environment);
        self.run_phases().inspect_err(|error| reporter.boot_failed(error))
    }

    fn run_phases(self) -> Result<Kernel, BootError> {
        let Self {
            environment,
            bundles,
            loader,
            reporter,
            supervisor_reporter,
            grace_period,
            identity,
        } = self;
        let identity = identity.unwrap_or_else(ProcessIdentity::current);

        let mut schema = ConfigSchema::new();
        for bundle in &bundles {
            schema.extend(bundle.config_mapping());
        }
        let loader = loader.unwrap_or_else(|| {
            Box::new(YamlConfigurationLoader::new(
                DEFAULT_APP_CONFIG,
                DEFAULT_APP_PARAMETERS,
            ))
        });
        let configuration = loader
            .load(&schema)
            .map(Arc::new)
            .map_err(|source| BootError::Configuration { source })?;
        reporter.phase_completed(BootPhase::LoadConfiguration);

        let kernel = Kernel {
            inner: Arc::new(KernelInner {
                environment,
                state: Mutex::new(KernelState::Booting),
                state_changed: Condvar::new(),
                identity,
                bus: Arc::new(EventBus::new()),
                container: Arc::new(Container::new()),
                supervisor: Arc::new(ProcessSupervisor::with_reporter(supervisor_reporter)),
                configuration,
                reporter,
                grace_period,
            }),
        };
        let sequence = BootSequence {
            kernel: &kernel,
            bundles: &bundles,
        };
        sequence.run()?;
        Ok(kernel)
    }
}

struct BootSequence<'a> {
    kernel: &'a Kernel,
    bundles: &'a [Arc<dyn Bundle>],
}

impl BootSequence<'_> {
    fn run(&self) -> Result<(), BootError> {
        let (configuration_scoped, remaining): (Vec<_>, Vec<_>) = self
            .bundles
            .iter()
            .flat_map(|bundle| bundle.event_listeners())
            .partition(|(event_type, _)| event_type.is_a(&CONFIGURATION_READY));

        self.register(BootPhase::RegisterConfigurationListeners, configuration_scoped);
        self.completed(BootPhase::RegisterConfigurationListeners);

        let inner = &self.kernel.inner;
        self.dispatch(
            BootPhase::DispatchConfigurationReady,
            &ConfigurationReady {
                configuration: Arc::clone(&inner.configuration),
            },
        )?;

        self.register(BootPhase::RegisterListeners, remaining);
        self.register_builtin_listeners();
        self.completed(BootPhase::RegisterListeners);

        self.build_container();
        self.dispatch(
            BootPhase::BuildContainer,
            &InjectorReady {
                container: Arc::clone(&inner.container),
            },
        )?;

        self.dispatch(BootPhase::DispatchKernelReady, &KernelReady)?;
        self.kernel.set_state(KernelState::Ready);

        self.register_services();
        self.completed(BootPhase::RegisterServices);
        Ok(())
    }

    fn register(&self, phase: BootPhase, listeners: Vec<(&'static EventType, Listener)>) {
        let inner = &self.kernel.inner;
        let count = listeners.len();
        for (event_type, listener) in listeners {
            inner.bus.add_listener(event_type, listener);
        }
        inner.reporter.listeners_registered(phase, count);
    }

    fn register_builtin_listeners(&self) {
        let inner = &self.kernel.inner;
        let ready = Arc::clone(&inner.reporter);
        inner.bus.listen(&KERNEL_READY, move |_| {
            ready.kernel_ready();
            Ok(())
        });
        let shutdown = Arc::clone(&inner.reporter);
        inner.bus.listen(&KERNEL_SHUTDOWN, move |_| {
            shutdown.kernel_shutdown();
            Ok(())
        });
    }

    fn build_container(&self) {
        let inner = &self.kernel.inner;
        for bundle in self.bundles {
            for (key, provider) in bundle.injection_bindings() {
                inner.container.install(key, provider);
            }
        }
        inner
            .container
            .install(KERNEL_KEY, Provider::value(self.kernel.handle()));
        inner
            .container
            .install(EVENT_BUS_KEY, Provider::shared(Arc::clone(&inner.bus)));
        inner.container.install(
            CONFIGURATION_KEY,
            Provider::shared(Arc::clone(&inner.configuration)),
        );
    }

    fn dispatch(&self, phase: BootPhase, event: &dyn Event) -> Result<(), BootError> {
        let inner = &self.kernel.inner;
        inner
            .bus
            .dispatch(event)
            .map_err(|source| BootError::Dispatch { phase, source })?;
        self.completed(phase);
        Ok(())
    }

    fn register_services(&self) {
        let inner = &self.kernel.inner;
        for bundle in self.bundles {
            for spec in bundle.services(&inner.container) {
                inner.reporter.service_registered(spec.name());
                inner.supervisor.add_service(spec);
            }
        }
    }

    fn completed(&self, phase: BootPhase) {
        self.kernel.inner.reporter.phase_completed(phase);
    }
}
