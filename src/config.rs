//! Controller configuration.

use crate::error::{GpioError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the GPIO controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Lowest valid BCM pin number
    pub first_pin: u8,
    /// Highest valid BCM pin number
    pub last_pin: u8,
    /// Pins the platform forbids configuring
    pub reserved_pins: Vec<u8>,
    /// Pins wired to a hardware PWM channel
    pub hardware_pwm_pins: Vec<u8>,
    /// Upper bound on a single driver call, in milliseconds
    pub driver_timeout_ms: u64,
    /// Events buffered per subscriber before the oldest are dropped
    pub subscriber_buffer: usize,
    /// Monitoring interval used when a request does not give one
    pub default_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            first_pin: 2,
            last_pin: 27,
            // Wired to the USB hub on the reTerminal carrier board
            reserved_pins: vec![6, 13],
            // PWM0 on 12 and 18, PWM1 on 19 (13 is PWM1 too, but reserved)
            hardware_pwm_pins: vec![12, 18, 19],
            driver_timeout_ms: crate::DEFAULT_DRIVER_TIMEOUT_MS,
            subscriber_buffer: 64,
            default_interval_ms: crate::DEFAULT_INTERVAL_MS,
        }
    }
}

impl ControllerConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the valid pin range.
    pub fn with_pin_range(mut self, first_pin: u8, last_pin: u8) -> Self {
        self.first_pin = first_pin;
        self.last_pin = last_pin;
        self
    }

    /// Set the reserved pins.
    pub fn with_reserved_pins(mut self, pins: impl Into<Vec<u8>>) -> Self {
        self.reserved_pins = pins.into();
        self
    }

    /// Set the driver call timeout.
    pub fn with_driver_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.driver_timeout_ms = timeout_ms;
        self
    }

    /// Set the per-subscriber buffer size.
    pub fn with_subscriber_buffer(mut self, size: usize) -> Self {
        self.subscriber_buffer = size;
        self
    }

    pub fn with_default_interval_ms(mut self, interval_ms: u64) -> Self {
        self.default_interval_ms = interval_ms;
        self
    }

    pub fn driver_timeout(&self) -> Duration {
        Duration::from_millis(self.driver_timeout_ms)
    }

    pub fn is_valid_pin(&self, pin: u8) -> bool {
        (self.first_pin..=self.last_pin).contains(&pin)
    }

    pub fn is_reserved(&self, pin: u8) -> bool {
        self.reserved_pins.contains(&pin)
    }

    /// Valid pins that are not reserved, ascending.
    pub fn available_pins(&self) -> Vec<u8> {
        (self.first_pin..=self.last_pin)
            .filter(|pin| !self.is_reserved(*pin))
            .collect()
    }

    /// Usable pins with a hardware PWM channel, ascending.
    pub fn hardware_pwm_pins(&self) -> Vec<u8> {
        let mut pins: Vec<u8> = self
            .hardware_pwm_pins
            .iter()
            .copied()
            .filter(|pin| self.is_valid_pin(*pin) && !self.is_reserved(*pin))
            .collect();
        pins.sort_unstable();
        pins.dedup();
        pins
    }

    /// Reserved pins, ascending and deduplicated.
    pub fn sorted_reserved_pins(&self) -> Vec<u8> {
        let mut pins = self.reserved_pins.clone();
        pins.sort_unstable();
        pins.dedup();
        pins
    }

    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.first_pin > self.last_pin {
            return Err(GpioError::config_error(format!(
                "first_pin {} is above last_pin {}",
                self.first_pin, self.last_pin
            )));
        }
        if self.driver_timeout_ms == 0 {
            return Err(GpioError::config_error("driver_timeout_ms must be positive"));
        }
        if self.subscriber_buffer == 0 {
            return Err(GpioError::config_error("subscriber_buffer must be positive"));
        }
        if self.default_interval_ms == 0 {
            return Err(GpioError::config_error("default_interval_ms must be positive"));
        }
        Ok(())
    }
}
