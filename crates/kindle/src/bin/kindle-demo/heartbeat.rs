//! A bundle whose workers log a heartbeat until they are stopped.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kindle::config::{ConfigSection, Configuration, FieldError, Section, Validate};
use kindle::container::CONFIGURATION_KEY;
use kindle::event::{CONFIGURATION_READY, ConfigurationReady, KERNEL_SHUTDOWN};
use kindle::supervisor::ServiceSpec;
use kindle::{Bundle, Container, EventType, Listener, listener};
use serde::Deserialize;
use tracing::{info, warn};

const HEARTBEAT_TARGET: &str = concat!(env!("CARGO_BIN_NAME"), "::heartbeat");
const SECTION: &str = "heartbeat";
const WORKERS: [&str; 2] = ["alpha", "beta"];

/// The `heartbeat` configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatSettings {
    message: String,
    #[serde(default = "default_interval")]
    interval_secs: u64,
}

fn default_interval() -> u64 {
    1
}

impl Validate for HeartbeatSettings {
    fn validate(self) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        if self.message.trim().is_empty() {
            errors.push(FieldError::value_error("message", "must not be blank"));
        }
        if self.interval_secs == 0 {
            errors.push(FieldError::value_error(
                "interval_secs",
                "must be at least one second",
            ));
        }
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(errors)
        }
    }
}

/// Contributes the heartbeat section, two listeners, and two workers.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeartbeatBundle;

impl Bundle for HeartbeatBundle {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn config_mapping(&self) -> Vec<(String, Arc<dyn ConfigSection>)> {
        vec![(
            SECTION.to_owned(),
            Arc::new(Section::<HeartbeatSettings>::new()),
        )]
    }

    fn event_listeners(&self) -> Vec<(&'static EventType, Listener)> {
        vec![
            (
                &CONFIGURATION_READY,
                listener(|event| {
                    if let Some(ready) = event.downcast_ref::<ConfigurationReady>()
                        && let Some(settings) = settings(&ready.configuration)
                    {
                        info!(
                            target: HEARTBEAT_TARGET,
                            interval_secs = settings.interval_secs,
                            "heartbeat configured"
                        );
                    }
                    Ok(())
                }),
            ),
            (
                &KERNEL_SHUTDOWN,
                listener(|_| {
                    info!(target: HEARTBEAT_TARGET, "heartbeat stopping");
                    Ok(())
                }),
            ),
        ]
    }

    fn services(&self, container: &Container) -> Vec<ServiceSpec> {
        let configured = container
            .resolve::<Configuration>(CONFIGURATION_KEY)
            .ok()
            .and_then(|configuration| settings(&configuration));
        let Some(settings) = configured else {
            warn!(target: HEARTBEAT_TARGET, "heartbeat section unavailable");
            return Vec::new();
        };
        WORKERS
            .iter()
            .map(|worker| {
                let settings = Arc::clone(&settings);
                // Forked by `Kernel::run` while the other threads are idle.
                ServiceSpec::function(format!("heartbeat-{worker}"), move |args| {
                    beat(&settings, args.get("worker").unwrap_or("anonymous"))
                })
                .kwarg("worker", *worker)
            })
            .collect()
    }
}

fn settings(configuration: &Configuration) -> Option<Arc<HeartbeatSettings>> {
    configuration.get::<HeartbeatSettings>(SECTION)
}

fn beat(settings: &HeartbeatSettings, worker: &str) -> i32 {
    let interval = Duration::from_secs(settings.interval_secs);
    loop {
        info!(target: HEARTBEAT_TARGET, worker, message = %settings.message, "beat");
        thread::sleep(interval);
    }
}
