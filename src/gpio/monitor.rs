//! Background monitoring of input pins.

use crate::error::{GpioError, Result};
use crate::events::{Broadcaster, Event};
use crate::gpio::data::PinMode;
use crate::gpio::registry::PinRegistry;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Current state of the monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MonitorStatus {
    Idle,
    Running { pins: Vec<u8>, interval_ms: u64 },
}

type Targets = Arc<Mutex<Vec<u8>>>;

fn targets_of(targets: &Targets) -> Vec<u8> {
    targets.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

struct Run {
    targets: Targets,
    interval_ms: u64,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Run {
    /// Cancel the loop and wait for it to finish its current tick.
    async fn shutdown(self) {
        // The loop also exits if the sender is dropped, so a send error is fine.
        let _ = self.cancel.send(true);
        if let Err(e) = self.handle.await {
            warn!("Monitoring task ended abnormally: {}", e);
        }
    }
}

/// Single-slot scheduler polling a set of input pins at a fixed interval.
///
/// At most one run is active; starting a new one replaces the previous one.
/// The monitor publishes its own `monitoring_started`, `pin_readings` and
/// `monitoring_stopped` events. Replacing a run only announces the new one.
pub struct Monitor {
    registry: Arc<PinRegistry>,
    events: Broadcaster,
    run: tokio::sync::Mutex<Option<Run>>,
}

impl Monitor {
    pub fn new(registry: Arc<PinRegistry>, events: Broadcaster) -> Self {
        Self {
            registry,
            events,
            run: tokio::sync::Mutex::new(None),
        }
    }

    /// Start monitoring `pins` every `interval_ms` milliseconds.
    ///
    /// Every pin must currently be configured as an input. Returns the
    /// deduplicated target list.
    pub async fn start(&self, pins: &[u8], interval_ms: u64) -> Result<Vec<u8>> {
        let mut targets: Vec<u8> = Vec::with_capacity(pins.len());
        for &pin in pins {
            if !targets.contains(&pin) {
                targets.push(pin);
            }
        }
        if targets.is_empty() {
            return Err(GpioError::invalid_monitor_target(
                "no pins specified for monitoring",
            ));
        }
        {
            let registry = self.registry.lock().await;
            for &pin in &targets {
                match registry.get(pin) {
                    Ok(entry) if entry.mode == PinMode::Input => {}
                    Ok(entry) => {
                        return Err(GpioError::invalid_monitor_target(format!(
                            "pin {} is configured as {}, not input",
                            pin, entry.mode
                        )))
                    }
                    Err(_) => {
                        return Err(GpioError::invalid_monitor_target(format!(
                            "pin {} is not configured",
                            pin
                        )))
                    }
                }
            }
        }
        if interval_ms == 0 {
            return Err(GpioError::InvalidInterval(interval_ms));
        }

        let mut slot = self.run.lock().await;
        if let Some(previous) = slot.take() {
            debug!("Replacing running monitor");
            previous.shutdown().await;
        }

        // Announced before the first tick can publish a batch.
        self.events.publish(Event::MonitoringStarted {
            pins: targets.clone(),
            interval_ms,
        });

        let shared: Targets = Arc::new(Mutex::new(targets.clone()));
        let (cancel, cancelled) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.registry),
            self.events.clone(),
            Arc::clone(&shared),
            Duration::from_millis(interval_ms),
            cancelled,
        ));

        *slot = Some(Run {
            targets: shared,
            interval_ms,
            cancel,
            handle,
        });
        info!("Monitoring pins {:?} every {}ms", targets, interval_ms);
        Ok(targets)
    }

    /// Stop the running loop. Returns `false` if nothing was running.
    pub async fn stop(&self) -> bool {
        let Some(run) = self.run.lock().await.take() else {
            return false;
        };
        run.shutdown().await;
        self.events.publish(Event::MonitoringStopped {
            message: "Monitoring stopped".to_string(),
        });
        info!("Monitoring stopped");
        true
    }

    /// Drop `pin` from the running target set. Returns `true` if that left
    /// nothing to monitor and the run was stopped.
    pub async fn forget(&self, pin: u8) -> bool {
        let mut slot = self.run.lock().await;
        let Some(run) = slot.as_ref() else {
            return false;
        };

        let remaining = {
            let mut targets = run.targets.lock().unwrap_or_else(PoisonError::into_inner);
            targets.retain(|p| *p != pin);
            targets.len()
        };
        if remaining > 0 {
            return false;
        }

        if let Some(run) = slot.take() {
            run.shutdown().await;
        }
        self.events.publish(Event::MonitoringStopped {
            message: format!("Monitoring stopped, pin {} was released", pin),
        });
        info!("Monitoring stopped, no pins left after releasing pin {}", pin);
        true
    }

    pub async fn status(&self) -> MonitorStatus {
        match self.run.lock().await.as_ref() {
            Some(run) => MonitorStatus::Running {
                pins: targets_of(&run.targets),
                interval_ms: run.interval_ms,
            },
            None => MonitorStatus::Idle,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.run.lock().await.is_some()
    }
}

async fn run_loop(
    registry: Arc<PinRegistry>,
    events: Broadcaster,
    targets: Targets,
    interval: Duration,
    mut cancelled: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancelled.changed() => break,
            _ = ticker.tick() => {}
        }

        let pins = targets_of(&targets);
        let mut readings = Vec::with_capacity(pins.len());
        for pin in pins {
            if *cancelled.borrow() {
                return;
            }
            // Each read takes the registry lock on its own.
            match registry.read(pin).await {
                Ok(snapshot) => readings.push(snapshot),
                Err(e) => warn!("Skipping pin {} in this batch: {}", pin, e),
            }
        }

        // Publish under the lock so a release committed after these reads
        // is announced after the batch, or its pin is left out of it.
        let table = registry.lock().await;
        if *cancelled.borrow() {
            return;
        }
        readings.retain(|reading| {
            table
                .get(reading.pin)
                .is_ok_and(|entry| entry.mode == PinMode::Input)
        });
        debug!("Publishing {} readings", readings.len());
        events.publish(Event::readings(readings));
    }
}
