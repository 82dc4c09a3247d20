//! Shared doubles for the kernel test suites.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use kindle_config::{
    ConfigSection, FieldError, Section, StaticConfigurationLoader, Validate,
};
use kindle_supervisor::{ServiceSpec, Signal};
use nix::sys::signal::{self, SigHandler};
use serde::Deserialize;
use serde_json::json;

use crate::bundle::Bundle;
use crate::container::{Container, Provider};
use crate::event::{
    CONFIGURATION_READY, ConfigurationReady, EVENT, EventType, INJECTOR_READY, KERNEL_READY,
    KERNEL_SHUTDOWN, Listener, ListenerError, listener,
};
use crate::kernel::{BootError, BootPhase, KernelReporter};

/// Lifecycle notifications captured by [`RecordingKernelReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent {
    BootStarting(String),
    PhaseCompleted(BootPhase),
    BootFailed,
    ListenersRegistered(BootPhase, usize),
    ServiceRegistered(String),
    KernelReady,
    ShutdownRequested,
    KillRequested,
    KernelShutdown,
}

/// Reporter that records every notification in order.
#[derive(Debug, Default)]
pub struct RecordingKernelReporter {
    events: Mutex<Vec<KernelEvent>>,
}

impl RecordingKernelReporter {
    pub fn events(&self) -> Vec<KernelEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    pub fn phases(&self) -> Vec<BootPhase> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                KernelEvent::PhaseCompleted(phase) => Some(phase),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: KernelEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(event);
    }
}

impl KernelReporter for RecordingKernelReporter {
    fn boot_starting(&self, environment: &str) {
        self.record(KernelEvent::BootStarting(environment.to_owned()));
    }

    fn phase_completed(&self, phase: BootPhase) {
        self.record(KernelEvent::PhaseCompleted(phase));
    }

    fn boot_failed(&self, _error: &BootError) {
        self.record(KernelEvent::BootFailed);
    }

    fn listeners_registered(&self, phase: BootPhase, count: usize) {
        self.record(KernelEvent::ListenersRegistered(phase, count));
    }

    fn service_registered(&self, name: &str) {
        self.record(KernelEvent::ServiceRegistered(name.to_owned()));
    }

    fn kernel_ready(&self) {
        self.record(KernelEvent::KernelReady);
    }

    fn shutdown_requested(&self, _grace: Duration) {
        self.record(KernelEvent::ShutdownRequested);
    }

    fn kill_requested(&self) {
        self.record(KernelEvent::KillRequested);
    }

    fn kernel_shutdown(&self) {
        self.record(KernelEvent::KernelShutdown);
    }
}

/// Ordered log written by sample listeners and resources.
#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|recorded| recorded == entry)
    }

    fn recorder(&self, label: &'static str) -> Listener {
        let log = self.clone();
        listener(move |event| {
            log.push(format!("{label}:{}", event.name()));
            Ok(())
        })
    }
}

/// The `greeting` section: `value` must hold two words and is title-cased.
#[derive(Debug, Deserialize)]
pub struct Greeting {
    pub value: String,
}

impl Validate for Greeting {
    fn validate(mut self) -> Result<Self, Vec<FieldError>> {
        if !self.value.contains(' ') {
            return Err(vec![FieldError::value_error("value", "must contain a space")]);
        }
        self.value = self
            .value
            .split(' ')
            .map(|word| {
                let mut chars = word.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars).collect()
                })
            })
            .collect::<Vec<_>>()
            .join(" ");
        Ok(self)
    }
}

/// Loader serving a `greeting` section with `value`.
pub fn greeting_loader(value: &str) -> StaticConfigurationLoader {
    StaticConfigurationLoader::new(json!({ "greeting": { "value": value } }))
}

/// Bundle exercising every capability and logging what it observes.
#[derive(Clone, Default)]
pub struct SampleBundle {
    pub log: Log,
    services: Vec<ServiceSpec>,
    refuse: Option<&'static EventType>,
}

impl SampleBundle {
    pub fn new(log: Log) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_service(mut self, spec: ServiceSpec) -> Self {
        self.services.push(spec);
        self
    }

    /// Adds a listener on `event_type` that always fails.
    #[must_use]
    pub fn refusing(mut self, event_type: &'static EventType) -> Self {
        self.refuse = Some(event_type);
        self
    }
}

impl Bundle for SampleBundle {
    fn name(&self) -> &str {
        "sample"
    }

    fn config_mapping(&self) -> Vec<(String, Arc<dyn ConfigSection>)> {
        vec![("greeting".to_owned(), Arc::new(Section::<Greeting>::new()))]
    }

    fn event_listeners(&self) -> Vec<(&'static EventType, Listener)> {
        let log = self.log.clone();
        let mut listeners = vec![
            (&EVENT, self.log.recorder("root")),
            (
                &CONFIGURATION_READY,
                listener(move |event| {
                    let greeting = event
                        .downcast_ref::<ConfigurationReady>()
                        .and_then(|ready| ready.configuration.get::<Greeting>("greeting"))
                        .ok_or_else(|| ListenerError::new("greeting missing"))?;
                    log.push(format!("greeting:{}", greeting.value));
                    Ok(())
                }),
            ),
            (&INJECTOR_READY, self.log.recorder("injector")),
            (&KERNEL_READY, self.log.recorder("ready")),
            (&KERNEL_SHUTDOWN, self.log.recorder("shutdown")),
        ];
        if let Some(event_type) = self.refuse {
            listeners.push((
                event_type,
                listener(|_| Err(ListenerError::new("refused by sample"))),
            ));
        }
        listeners
    }

    fn injection_bindings(&self) -> Vec<(String, Provider)> {
        let log = self.log.clone();
        vec![
            ("sample.name".to_owned(), Provider::value(String::from("sample"))),
            ("sample.alias".to_owned(), Provider::alias("sample.name")),
            (
                "sample.pool".to_owned(),
                Provider::resource(
                    |_| Ok(String::from("pool")),
                    move |pool: &String| log.push(format!("released:{pool}")),
                ),
            ),
        ]
    }

    fn services(&self, _container: &Container) -> Vec<ServiceSpec> {
        self.services.clone()
    }
}

/// A worker that sleeps until it is signalled.
pub fn sleeper(name: &str) -> ServiceSpec {
    ServiceSpec::function(name, |_| {
        thread::sleep(Duration::from_secs(60));
        0
    })
}

/// A worker that ignores termination requests and creates `ready` once it
/// does.
pub fn stubborn(name: &str, ready: PathBuf) -> ServiceSpec {
    ServiceSpec::function(name, move |_| {
        // SAFETY: ignoring a signal installs no handler code.
        unsafe { signal::signal(Signal::SIGTERM, SigHandler::SigIgn) }.ok();
        fs::write(&ready, b"ready").ok();
        loop {
            thread::sleep(Duration::from_secs(60));
        }
    })
}

/// Blocks until every path exists.
pub fn await_files(paths: &[&Path]) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !paths.iter().all(|path| path.exists()) {
        assert!(Instant::now() < deadline, "workers never became ready");
        thread::sleep(Duration::from_millis(10));
    }
}

/// Blocks until `condition` holds.
pub fn await_condition(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition never held");
        thread::sleep(Duration::from_millis(10));
    }
}
