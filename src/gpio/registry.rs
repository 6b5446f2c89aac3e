//! Authoritative table of pin configuration and last known values.
//!
//! All mutations go through a [`RegistryGuard`], which holds the single
//! global lock for the whole validate, drive, commit sequence. Driver calls
//! run on the blocking pool. Reads are bounded by the driver timeout, so an
//! unresponsive input surfaces as a [`DriverError::Timeout`] instead of
//! stalling the monitor.

use crate::config::ControllerConfig;
use crate::error::{DriverError, GpioError, Result};
use crate::gpio::data::{
    validate_duty_cycle, validate_frequency, Level, Pin, PinListing, PinMode, PinOptions,
    PinSetup, PullMode,
};
use crate::gpio::driver::{DriverResult, PinDriver};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Shared pin table. Hand it around as `Arc<PinRegistry>`.
pub struct PinRegistry {
    config: ControllerConfig,
    driver: Arc<dyn PinDriver>,
    timeout: Duration,
    table: Mutex<BTreeMap<u8, Pin>>,
}

impl PinRegistry {
    pub fn new(config: ControllerConfig, driver: Arc<dyn PinDriver>) -> Self {
        let timeout = config.driver_timeout();
        Self {
            config,
            driver,
            timeout,
            table: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    /// Take the global lock. Every mutation made through the guard is
    /// serialised against all others until it is dropped.
    pub async fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            registry: self,
            table: self.table.lock().await,
        }
    }

    /// Cached snapshot of a configured pin (no driver call).
    pub async fn get(&self, pin: u8) -> Result<Pin> {
        self.lock().await.get(pin)
    }

    pub async fn snapshot(&self) -> PinListing {
        self.lock().await.listing()
    }

    pub async fn configure(&self, pin: u8, mode: PinMode, options: &PinOptions) -> Result<Pin> {
        self.lock().await.configure(pin, mode, options).await
    }

    pub async fn write(&self, pin: u8, level: Level) -> Result<Pin> {
        self.lock().await.write(pin, level).await
    }

    /// Read one input pin, holding the lock only for this pin.
    pub async fn read(&self, pin: u8) -> Result<Pin> {
        self.lock().await.read(pin).await
    }

    pub async fn set_pwm(&self, pin: u8, duty_cycle: f64, frequency: Option<u32>) -> Result<Pin> {
        self.lock().await.set_pwm(pin, duty_cycle, frequency).await
    }

    pub async fn release(&self, pin: u8) -> Result<()> {
        self.lock().await.release(pin).await
    }

    pub async fn release_all(&self) -> Vec<GpioError> {
        self.lock().await.release_all().await
    }

    fn check_pin(&self, pin: u8) -> Result<()> {
        if self.config.is_reserved(pin) {
            return Err(GpioError::ReservedPin(pin));
        }
        if !self.config.is_valid_pin(pin) {
            return Err(GpioError::InvalidPin(pin));
        }
        Ok(())
    }

    /// Run a mutating driver call on the blocking pool and wait for it.
    ///
    /// Mutations are not cut short: the lock stays held until the line is
    /// in its new state, so two changes to one pin never overlap physically.
    async fn call<T, F>(&self, pin: u8, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PinDriver) -> DriverResult<T> + Send + 'static,
    {
        let driver = Arc::clone(&self.driver);
        match tokio::task::spawn_blocking(move || f(driver.as_ref())).await {
            Ok(result) => result.map_err(|source| GpioError::driver(pin, source)),
            Err(join_error) => Err(join_failure(pin, op, join_error)),
        }
    }

    /// Sample a line, giving up after the driver timeout. A read that is
    /// abandoned this way may still finish later, with nothing committed.
    async fn sample(&self, pin: u8) -> Result<Level> {
        let driver = Arc::clone(&self.driver);
        let task = tokio::task::spawn_blocking(move || driver.read(pin));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(|source| GpioError::driver(pin, source)),
            Ok(Err(join_error)) => Err(join_failure(pin, "read", join_error)),
            Err(_) => {
                warn!(
                    "Driver read on pin {} did not return within {:?}",
                    pin, self.timeout
                );
                Err(GpioError::driver(pin, DriverError::Timeout { op: "read" }))
            }
        }
    }

    fn snapshot_of(&self, pin: u8, setup: &PinSetup, value: Level) -> Pin {
        let (pull, pwm_frequency, pwm_duty_cycle) = match *setup {
            PinSetup::Input { pull } => (pull, None, None),
            PinSetup::Output { .. } => (PullMode::None, None, None),
            PinSetup::Pwm {
                frequency,
                duty_cycle,
            } => (PullMode::None, Some(frequency), Some(duty_cycle)),
        };
        let is_reserved = self.config.is_reserved(pin);

        Pin {
            pin,
            mode: setup.mode(),
            value,
            pull,
            pwm_frequency,
            pwm_duty_cycle,
            is_reserved,
            is_available: !is_reserved,
        }
    }
}

fn join_failure(pin: u8, op: &str, join_error: tokio::task::JoinError) -> GpioError {
    GpioError::driver(
        pin,
        DriverError::hardware(format!("{} failed: {}", op, join_error)),
    )
}

/// Exclusive access to the pin table.
pub struct RegistryGuard<'a> {
    registry: &'a PinRegistry,
    table: MutexGuard<'a, BTreeMap<u8, Pin>>,
}

impl RegistryGuard<'_> {
    pub fn get(&self, pin: u8) -> Result<Pin> {
        self.table
            .get(&pin)
            .cloned()
            .ok_or(GpioError::NotConfigured(pin))
    }

    pub fn contains(&self, pin: u8) -> bool {
        self.table.contains_key(&pin)
    }

    pub fn configured_pins(&self) -> Vec<u8> {
        self.table.keys().copied().collect()
    }

    pub fn listing(&self) -> PinListing {
        PinListing {
            available: self.registry.config.available_pins(),
            configured: self.table.values().cloned().collect(),
            reserved: self.registry.config.sorted_reserved_pins(),
            hardware_pwm: self.registry.config.hardware_pwm_pins(),
        }
    }

    fn expect_mode(&self, pin: u8, expected: PinMode) -> Result<&Pin> {
        let entry = self.table.get(&pin).ok_or(GpioError::NotConfigured(pin))?;
        if entry.mode != expected {
            return Err(GpioError::WrongMode {
                pin,
                expected,
                actual: entry.mode,
            });
        }
        Ok(entry)
    }

    /// Configure `pin`, replacing any previous configuration.
    ///
    /// On driver failure the pin is left unconfigured, even if it was
    /// configured before the call.
    pub async fn configure(&mut self, pin: u8, mode: PinMode, options: &PinOptions) -> Result<Pin> {
        self.registry.check_pin(pin)?;
        let setup = options.to_setup(mode)?;

        if let Some(previous) = self.table.remove(&pin) {
            debug!("Replacing {} configuration of pin {}", previous.mode, pin);
            if let Err(e) = self.registry.call(pin, "release", move |d| d.release(pin)).await {
                warn!("Failed to release previous configuration of pin {}: {}", pin, e);
            }
        }

        if let Err(e) = self
            .registry
            .call(pin, "configure", move |d| d.configure(pin, &setup))
            .await
        {
            error!("Failed to configure pin {} as {}: {}", pin, mode, e);
            return Err(e);
        }

        let value = match setup {
            PinSetup::Input { .. } => {
                match self.registry.sample(pin).await {
                    Ok(level) => level,
                    Err(e) => {
                        error!("Failed to sample freshly configured pin {}: {}", pin, e);
                        if let Err(e) = self.registry.call(pin, "release", move |d| d.release(pin)).await {
                            warn!("Failed to release pin {} after failed setup: {}", pin, e);
                        }
                        return Err(e);
                    }
                }
            }
            PinSetup::Output { initial } => initial,
            PinSetup::Pwm { .. } => Level::Low,
        };

        let snapshot = self.registry.snapshot_of(pin, &setup, value);
        self.table.insert(pin, snapshot.clone());
        info!("Configured pin {} as {}", pin, mode);
        Ok(snapshot)
    }

    /// Drive an output pin.
    pub async fn write(&mut self, pin: u8, level: Level) -> Result<Pin> {
        self.expect_mode(pin, PinMode::Output)?;
        self.registry
            .call(pin, "write", move |d| d.write(pin, level))
            .await?;

        let entry = self.table.get_mut(&pin).ok_or(GpioError::NotConfigured(pin))?;
        entry.value = level;
        debug!("Wrote {:?} to pin {}", level, pin);
        Ok(entry.clone())
    }

    /// Sample an input pin and cache the level.
    pub async fn read(&mut self, pin: u8) -> Result<Pin> {
        self.expect_mode(pin, PinMode::Input)?;
        let level = self.registry.sample(pin).await?;

        let entry = self.table.get_mut(&pin).ok_or(GpioError::NotConfigured(pin))?;
        entry.value = level;
        Ok(entry.clone())
    }

    /// Update PWM duty cycle; the frequency is kept when not given.
    pub async fn set_pwm(&mut self, pin: u8, duty_cycle: f64, frequency: Option<u32>) -> Result<Pin> {
        let current = self.expect_mode(pin, PinMode::Pwm)?.pwm_frequency;
        let duty_cycle = validate_duty_cycle(duty_cycle)?;
        let frequency = match frequency {
            Some(frequency) => validate_frequency(frequency)?,
            None => current.ok_or_else(|| {
                GpioError::invalid_option(format!("pin {} has no PWM frequency", pin))
            })?,
        };

        self.registry
            .call(pin, "set_pwm", move |d| d.set_pwm(pin, duty_cycle, frequency))
            .await?;

        let entry = self.table.get_mut(&pin).ok_or(GpioError::NotConfigured(pin))?;
        entry.pwm_duty_cycle = Some(duty_cycle);
        entry.pwm_frequency = Some(frequency);
        debug!("Set pin {} PWM to {}% at {} Hz", pin, duty_cycle, frequency);
        Ok(entry.clone())
    }

    /// Release a pin. The software entry is removed even if the driver fails.
    pub async fn release(&mut self, pin: u8) -> Result<()> {
        if !self.table.contains_key(&pin) {
            return Err(GpioError::NotConfigured(pin));
        }

        let result = self
            .registry
            .call(pin, "release", move |d| d.release(pin))
            .await;
        self.table.remove(&pin);

        match result {
            Ok(()) => {
                info!("Released pin {}", pin);
                Ok(())
            }
            Err(e) => {
                warn!("Pin {} removed, but the driver failed to release it: {}", pin, e);
                Err(e)
            }
        }
    }

    /// Release every configured pin, collecting one error per failed pin.
    pub async fn release_all(&mut self) -> Vec<GpioError> {
        let mut errors = Vec::new();
        for pin in self.configured_pins() {
            if let Err(e) = self.release(pin).await {
                errors.push(e);
            }
        }

        let driver = Arc::clone(&self.registry.driver);
        match tokio::task::spawn_blocking(move || driver.release_all()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Driver cleanup failed: {}", e),
            Err(e) => warn!("Driver cleanup task failed: {}", e),
        }

        info!("Released all pins ({} errors)", errors.len());
        errors
    }
}
