//! Request façade: the operations external callers invoke.
//!
//! Each operation delegates to the registry or the monitor. Registry events
//! are published only after the change has committed, while the registry
//! lock is still held, so subscribers see them in commit order. The monitor
//! announces its own state transitions.

use crate::config::ControllerConfig;
use crate::error::{ErrorResponse, GpioError, Result};
use crate::events::{Broadcaster, Event, Subscription};
use crate::gpio::data::{Level, Pin, PinListing, PinMode, PinOptions};
use crate::gpio::driver::PinDriver;
use crate::gpio::monitor::{Monitor, MonitorStatus};
use crate::gpio::registry::PinRegistry;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a façade operation.
pub type Response<T> = std::result::Result<T, ErrorResponse>;

/// Owns the registry, broadcaster and monitor for one process.
pub struct GpioService {
    registry: Arc<PinRegistry>,
    events: Broadcaster,
    monitor: Monitor,
}

impl GpioService {
    pub fn new(config: ControllerConfig, driver: Arc<dyn PinDriver>) -> Result<Self> {
        config.validate()?;
        info!(
            "GPIO service using {} driver, pins {}-{}, reserved {:?}",
            driver.name(),
            config.first_pin,
            config.last_pin,
            config.sorted_reserved_pins()
        );

        let events = Broadcaster::new(config.subscriber_buffer);
        let registry = Arc::new(PinRegistry::new(config, driver));
        let monitor = Monitor::new(Arc::clone(&registry), events.clone());

        Ok(Self {
            registry,
            events,
            monitor,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        self.registry.config()
    }

    pub fn registry(&self) -> &Arc<PinRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Broadcaster {
        &self.events
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub async fn list_pins(&self) -> PinListing {
        self.registry.snapshot().await
    }

    pub async fn get_pin(&self, pin: u8) -> Response<Pin> {
        Ok(self.registry.get(pin).await?)
    }

    /// Configure a pin. If reconfiguring fails, the old setup is already
    /// gone, so the pin is reported released and dropped from monitoring.
    pub async fn configure(&self, pin: u8, mode: PinMode, options: &PinOptions) -> Response<Pin> {
        let (result, torn_down) = {
            let mut pins = self.registry.lock().await;
            let was_configured = pins.contains(pin);

            match pins.configure(pin, mode, options).await {
                Ok(snapshot) => {
                    self.events.publish(Event::PinConfigured(snapshot.clone()));
                    (Ok(snapshot), false)
                }
                Err(e) => {
                    let torn_down = was_configured && !pins.contains(pin);
                    if torn_down {
                        self.events.publish(Event::PinReleased { pin });
                    }
                    (Err(e), torn_down)
                }
            }
        };

        if torn_down {
            self.monitor.forget(pin).await;
        }

        Ok(result?)
    }

    pub async fn write(&self, pin: u8, value: u8) -> Response<Pin> {
        let level = Level::try_from(value)?;
        let mut pins = self.registry.lock().await;
        let snapshot = pins.write(pin, level).await?;
        self.events.publish(Event::PinChanged(snapshot.clone()));
        Ok(snapshot)
    }

    pub async fn read(&self, pin: u8) -> Response<Pin> {
        Ok(self.registry.read(pin).await?)
    }

    pub async fn set_pwm(&self, pin: u8, duty_cycle: f64, frequency: Option<u32>) -> Response<Pin> {
        let mut pins = self.registry.lock().await;
        let snapshot = pins.set_pwm(pin, duty_cycle, frequency).await?;
        self.events.publish(Event::PinChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// Release one pin. A driver failure is reported, but the pin is gone
    /// from the registry and from any running monitor either way.
    pub async fn release(&self, pin: u8) -> Response<()> {
        let result = {
            let mut pins = self.registry.lock().await;
            let result = pins.release(pin).await;
            if !matches!(result, Err(GpioError::NotConfigured(_))) {
                self.events.publish(Event::PinReleased { pin });
            }
            result
        };

        // The registry lock must be free here: stopping waits on the monitor
        // task, which takes that lock for every read.
        if !matches!(result, Err(GpioError::NotConfigured(_))) {
            self.monitor.forget(pin).await;
        }

        Ok(result?)
    }

    /// Stop monitoring and release every pin, returning per-pin failures.
    pub async fn release_all(&self) -> Vec<ErrorResponse> {
        self.stop_monitoring().await;

        let mut pins = self.registry.lock().await;
        let released = pins.configured_pins();
        let errors = pins.release_all().await;
        for pin in released {
            self.events.publish(Event::PinReleased { pin });
        }

        errors.iter().map(ErrorResponse::from).collect()
    }

    /// Start monitoring; `interval_ms` falls back to the configured default.
    pub async fn start_monitoring(&self, pins: &[u8], interval_ms: Option<u64>) -> Response<Vec<u8>> {
        let interval_ms = interval_ms.unwrap_or(self.config().default_interval_ms);

        self.monitor.start(pins, interval_ms).await.map_err(|e| {
            warn!("Rejected monitoring request: {}", e);
            self.events.publish(Event::error(e.to_string()));
            ErrorResponse::from(e)
        })
    }

    /// Stop monitoring. Returns `false` (and publishes nothing) when idle.
    pub async fn stop_monitoring(&self) -> bool {
        self.monitor.stop().await
    }

    pub async fn monitoring_status(&self) -> MonitorStatus {
        self.monitor.status().await
    }

    /// Process teardown: stop monitoring and return every pin to a safe state.
    pub async fn shutdown(&self) -> Vec<ErrorResponse> {
        info!("Shutting down GPIO service");
        let errors = self.release_all().await;
        for error in &errors {
            warn!("Cleanup error: {}", error);
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::gpio::mock::{DriverOp, MockDriver};

    fn service() -> (Arc<MockDriver>, GpioService) {
        let driver = Arc::new(MockDriver::new());
        let service = GpioService::new(ControllerConfig::default(), driver.clone()).unwrap();
        (driver, service)
    }

    fn drain(sub: &mut Subscription) -> Vec<Event> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[tokio::test]
    async fn test_configure_publishes_after_commit() {
        let (_driver, service) = service();
        let mut sub = service.subscribe();
        drain(&mut sub);

        let err = service
            .configure(13, PinMode::Output, &PinOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ReservedPin);
        assert!(drain(&mut sub).is_empty());

        let pin = service
            .configure(17, PinMode::Output, &PinOptions::new())
            .await
            .unwrap();
        assert_eq!(drain(&mut sub), vec![Event::PinConfigured(pin)]);
    }

    #[tokio::test]
    async fn test_write_rejects_non_binary_value() {
        let (driver, service) = service();
        service
            .configure(17, PinMode::Output, &PinOptions::new())
            .await
            .unwrap();
        let calls = driver.call_count();

        let err = service.write(17, 2).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOption);
        assert_eq!(driver.call_count(), calls);
    }

    #[tokio::test]
    async fn test_release_unknown_pin() {
        let (_driver, service) = service();
        let mut sub = service.subscribe();
        drain(&mut sub);

        let err = service.release(17).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotConfigured);
        assert!(drain(&mut sub).is_empty());
    }

    #[tokio::test]
    async fn test_failed_monitor_request_publishes_error() {
        let (_driver, service) = service();
        let mut sub = service.subscribe();
        drain(&mut sub);

        let err = service.start_monitoring(&[], Some(50)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMonitorTarget);
        assert!(matches!(drain(&mut sub).as_slice(), [Event::Error { .. }]));
    }

    #[tokio::test]
    async fn test_stop_monitoring_emits_once() {
        let (_driver, service) = service();
        service
            .configure(17, PinMode::Input, &PinOptions::new())
            .await
            .unwrap();
        service.start_monitoring(&[17], Some(20)).await.unwrap();

        let mut sub = service.subscribe();
        drain(&mut sub);
        assert!(service.stop_monitoring().await);
        assert!(!service.stop_monitoring().await);

        let stops = drain(&mut sub)
            .into_iter()
            .filter(|e| matches!(e, Event::MonitoringStopped { .. }))
            .count();
        assert_eq!(stops, 1);
    }

    #[tokio::test]
    async fn test_failed_reconfigure_publishes_release() {
        let (driver, service) = service();
        service
            .configure(17, PinMode::Output, &PinOptions::new())
            .await
            .unwrap();
        let mut sub = service.subscribe();
        drain(&mut sub);

        driver.fail(DriverOp::Configure, 17);
        let err = service
            .configure(17, PinMode::Input, &PinOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DriverError);
        assert_eq!(drain(&mut sub), vec![Event::PinReleased { pin: 17 }]);
        assert!(driver.line(17).is_none());
    }

    #[tokio::test]
    async fn test_failed_reconfigure_of_monitored_pin_stops_monitoring() {
        let (driver, service) = service();
        service
            .configure(17, PinMode::Input, &PinOptions::new())
            .await
            .unwrap();
        service.start_monitoring(&[17], Some(20)).await.unwrap();
        let mut sub = service.subscribe();
        drain(&mut sub);

        driver.fail(DriverOp::Configure, 17);
        assert!(service
            .configure(17, PinMode::Output, &PinOptions::new())
            .await
            .is_err());

        assert_eq!(service.monitoring_status().await, MonitorStatus::Idle);
        let events = drain(&mut sub);
        let released = events
            .iter()
            .position(|e| *e == Event::PinReleased { pin: 17 })
            .expect("release should be published");
        let after = &events[released..];
        let stops = after
            .iter()
            .filter(|e| matches!(e, Event::MonitoringStopped { .. }))
            .count();
        assert_eq!(stops, 1);
        assert!(!after.iter().any(|e| matches!(
            e,
            Event::PinReadings { readings, .. } if readings.iter().any(|p| p.pin == 17)
        )));

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(drain(&mut sub).is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let (driver, service) = service();
        service
            .configure(17, PinMode::Output, &PinOptions::new().with_initial_value(1))
            .await
            .unwrap();
        service
            .configure(27, PinMode::Input, &PinOptions::new())
            .await
            .unwrap();
        service.start_monitoring(&[27], Some(20)).await.unwrap();

        assert!(service.shutdown().await.is_empty());
        assert!(driver.claimed_pins().is_empty());
        assert!(service.list_pins().await.configured.is_empty());
        assert_eq!(service.monitoring_status().await, MonitorStatus::Idle);
        assert!(service.shutdown().await.is_empty());
    }
}
