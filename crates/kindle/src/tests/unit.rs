//! Unit tests for the boot sequence and kernel lifecycle.

use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kindle_config::{Configuration, FieldErrorKind};
use kindle_supervisor::{ExitState, ServiceSpec, Signal};
use rstest::{fixture, rstest};
use strum::IntoEnumIterator;
use tempfile::TempDir;

use super::support::{
    KernelEvent, Log, SampleBundle, RecordingKernelReporter, await_condition, await_files,
    greeting_loader, sleeper, stubborn,
};
use crate::container::{CONFIGURATION_KEY, EVENT_BUS_KEY, KERNEL_KEY};
use crate::event::{EventBus, KERNEL_READY};
use crate::kernel::{BootError, BootPhase, Kernel, KernelHandle, KernelState, ProcessIdentity};
use crate::launch::{LaunchError, serve};

struct Fixture {
    log: Log,
    reporter: Arc<RecordingKernelReporter>,
}

impl Fixture {
    fn boot(&self, bundle: SampleBundle, greeting: &str) -> Result<Kernel, BootError> {
        Kernel::builder("test")
            .bundle(bundle)
            .loader(greeting_loader(greeting))
            .reporter(self.reporter.clone())
            .grace_period(Duration::from_secs(5))
            .boot()
    }

    fn sample(&self) -> SampleBundle {
        SampleBundle::new(self.log.clone())
    }
}

#[fixture]
fn fixture() -> Fixture {
    Fixture {
        log: Log::default(),
        reporter: Arc::new(RecordingKernelReporter::default()),
    }
}

#[rstest]
fn boot_completes_every_phase_in_order(fixture: Fixture) {
    let kernel = fixture
        .boot(fixture.sample(), "hello world")
        .expect("boot should succeed");

    assert_eq!(kernel.state(), KernelState::Ready);
    assert_eq!(fixture.reporter.phases(), BootPhase::iter().collect::<Vec<_>>());
    assert_eq!(
        fixture.reporter.events().first(),
        Some(&KernelEvent::BootStarting("test".to_owned()))
    );
}

#[rstest]
fn configuration_ready_only_reaches_configuration_listeners(fixture: Fixture) {
    fixture
        .boot(fixture.sample(), "hello world")
        .expect("boot should succeed");

    assert_eq!(
        fixture.log.entries(),
        [
            "greeting:Hello World",
            "injector:kernel.injector_ready",
            "root:kernel.injector_ready",
            "ready:kernel.kernel_ready",
            "root:kernel.kernel_ready",
        ]
    );
    assert!(!fixture.log.contains("root:kernel.configuration_ready"));
}

#[rstest]
fn bundle_listeners_are_partitioned_without_overlap(fixture: Fixture) {
    fixture
        .boot(fixture.sample(), "hello world")
        .expect("boot should succeed");

    let events = fixture.reporter.events();
    assert!(events.contains(&KernelEvent::ListenersRegistered(
        BootPhase::RegisterConfigurationListeners,
        1
    )));
    assert!(events.contains(&KernelEvent::ListenersRegistered(
        BootPhase::RegisterListeners,
        4
    )));
    assert!(events.contains(&KernelEvent::KernelReady));
}

#[rstest]
fn invalid_configuration_aborts_boot(fixture: Fixture) {
    let error = fixture
        .boot(fixture.sample(), "onewordonly")
        .expect_err("boot must fail");

    let invalid = error.validation().expect("validation error expected");
    let field = invalid.errors().first().expect("one field error");
    assert_eq!(field.dotted_location(), "greeting.value");
    assert_eq!(field.kind(), FieldErrorKind::ValueError);
    assert_eq!(fixture.reporter.phases(), Vec::<BootPhase>::new());
    assert!(fixture.reporter.events().contains(&KernelEvent::BootFailed));
    assert!(fixture.log.entries().is_empty());
}

#[rstest]
fn failing_listener_aborts_boot_before_services_register(fixture: Fixture) {
    let bundle = fixture
        .sample()
        .refusing(&KERNEL_READY)
        .with_service(sleeper("never"));

    let error = fixture.boot(bundle, "hello world").expect_err("boot must fail");

    assert!(
        matches!(
            error,
            BootError::Dispatch {
                phase: BootPhase::DispatchKernelReady,
                ..
            }
        ),
        "unexpected error: {error:?}"
    );
    assert!(
        !fixture
            .reporter
            .events()
            .contains(&KernelEvent::ServiceRegistered("never".to_owned()))
    );
}

#[rstest]
fn container_exposes_kernel_bus_and_configuration(fixture: Fixture) {
    let kernel = fixture
        .boot(fixture.sample(), "hello world")
        .expect("boot should succeed");
    let container = kernel.container();

    let handle = container
        .resolve::<KernelHandle>(KERNEL_KEY)
        .expect("kernel handle");
    let upgraded = handle.upgrade().expect("kernel is alive");
    assert_eq!(upgraded.environment(), "test");

    let bus = container.resolve::<EventBus>(EVENT_BUS_KEY).expect("bus");
    assert!(Arc::ptr_eq(&bus, kernel.event_bus()));

    let configuration = container
        .resolve::<Configuration>(CONFIGURATION_KEY)
        .expect("configuration");
    assert!(Arc::ptr_eq(&configuration, kernel.configuration()));

    let aliased = container.resolve::<String>("sample.alias").expect("alias");
    assert_eq!(*aliased, "sample");
}

#[rstest]
fn services_are_registered_but_not_started(fixture: Fixture) {
    let bundle = fixture
        .sample()
        .with_service(sleeper("first"))
        .with_service(sleeper("second"));

    let kernel = fixture.boot(bundle, "hello world").expect("boot should succeed");

    let statuses = kernel.supervisor().statuses();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|status| status.pid.is_none()));
    assert!(
        fixture
            .reporter
            .events()
            .contains(&KernelEvent::ServiceRegistered("second".to_owned()))
    );
}

#[rstest]
fn graceful_shutdown_stops_workers_and_releases_resources(fixture: Fixture) {
    let bundle = fixture.sample().with_service(sleeper("cooperative"));
    let kernel = fixture.boot(bundle, "hello world").expect("boot should succeed");
    kernel
        .container()
        .resolve::<String>("sample.pool")
        .expect("pool resource");
    kernel.run().expect("services should start");

    let started = Instant::now();
    kernel.shutdown().expect("shutdown should succeed");

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(kernel.state(), KernelState::Terminated);
    assert!(fixture.log.contains("shutdown:kernel.kernel_shutdown"));
    assert!(fixture.log.contains("released:pool"));
    let events = fixture.reporter.events();
    assert!(events.contains(&KernelEvent::ShutdownRequested));
    assert!(events.contains(&KernelEvent::KernelShutdown));
    assert!(kernel.supervisor().statuses().iter().all(|s| !s.alive));
}

#[rstest]
fn shutdown_after_termination_does_nothing(fixture: Fixture) {
    let kernel = fixture
        .boot(fixture.sample(), "hello world")
        .expect("boot should succeed");
    kernel.shutdown().expect("first shutdown");

    kernel.shutdown().expect("second shutdown");

    let events = fixture.reporter.events();
    let requests = events
        .iter()
        .filter(|event| **event == KernelEvent::ShutdownRequested)
        .count();
    assert_eq!(requests, 1);
    assert!(!events.contains(&KernelEvent::KillRequested));
}

#[rstest]
fn second_shutdown_request_kills_stubborn_workers(fixture: Fixture) {
    let dir = TempDir::new().expect("create temp dir");
    let ready = dir.path().join("stubborn.ready");
    let bundle = fixture.sample().with_service(stubborn("stubborn", ready.clone()));
    let kernel = Kernel::builder("test")
        .bundle(bundle)
        .loader(greeting_loader("hello world"))
        .reporter(fixture.reporter.clone())
        .grace_period(Duration::from_secs(30))
        .boot()
        .expect("boot should succeed");
    kernel.run().expect("services should start");
    await_files(&[ready.as_path()]);

    let started = Instant::now();
    let graceful = {
        let kernel = kernel.clone();
        thread::spawn(move || kernel.shutdown())
    };
    await_condition(|| kernel.state() == KernelState::ShuttingDown);
    kernel.shutdown().expect("escalation should succeed");
    graceful
        .join()
        .expect("graceful thread")
        .expect("graceful shutdown should succeed");
    kernel.wait_terminated();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(kernel.state(), KernelState::Terminated);
    assert!(fixture.reporter.events().contains(&KernelEvent::KillRequested));
    for worker in kernel.supervisor().workers() {
        assert_eq!(
            worker.exit_state(),
            Some(ExitState::Signaled(Signal::SIGKILL))
        );
    }
}

#[rstest]
fn non_origin_shutdown_leaves_workers_alone(fixture: Fixture) {
    let bundle = fixture.sample().with_service(sleeper("inherited"));
    let kernel = Kernel::builder("test")
        .bundle(bundle)
        .loader(greeting_loader("hello world"))
        .reporter(fixture.reporter.clone())
        .identity(ProcessIdentity::with_origin(process::id().wrapping_add(1)))
        .boot()
        .expect("boot should succeed");
    kernel
        .container()
        .resolve::<String>("sample.pool")
        .expect("pool resource");
    kernel.run().expect("services should start");

    kernel.shutdown().expect("shutdown should succeed");

    assert!(!kernel.is_origin());
    assert_eq!(kernel.state(), KernelState::ShuttingDown);
    assert!(fixture.log.contains("shutdown:kernel.kernel_shutdown"));
    assert!(fixture.log.contains("released:pool"));
    assert!(kernel.supervisor().statuses().iter().all(|s| s.alive));

    kernel.shutdown().expect("repeat shutdown should succeed");
    assert!(!fixture.reporter.events().contains(&KernelEvent::KillRequested));
    assert!(kernel.supervisor().statuses().iter().all(|s| s.alive));

    kernel.supervisor().kill().expect("cleanup kill");
}

#[rstest]
fn serve_shuts_down_after_workers_exit_on_their_own(fixture: Fixture) {
    let bundle = fixture
        .sample()
        .with_service(ServiceSpec::function("brief", |_| 0));
    let kernel = fixture.boot(bundle, "hello world").expect("boot should succeed");

    serve(&kernel).expect("serve should succeed");

    assert_eq!(kernel.state(), KernelState::Terminated);
    assert!(fixture.log.contains("shutdown:kernel.kernel_shutdown"));
}

#[rstest]
fn serve_reports_spawn_failures_after_stopping(fixture: Fixture) {
    let bundle = fixture.sample().with_service(ServiceSpec::command(
        "ghost",
        "/nonexistent/kindle-test-binary",
    ));
    let kernel = fixture.boot(bundle, "hello world").expect("boot should succeed");

    let error = serve(&kernel).expect_err("serve must fail");

    assert!(
        matches!(error, LaunchError::Supervisor { .. }),
        "unexpected error: {error:?}"
    );
    assert_eq!(kernel.state(), KernelState::Terminated);
}
