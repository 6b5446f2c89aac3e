//! Data structures for GPIO pin state.

use crate::error::{GpioError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Functional configuration of a pin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PinMode {
    /// Digital input
    Input,
    /// Digital output
    Output,
    /// Pulse-width modulated output
    Pwm,
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Pwm => "pwm",
        })
    }
}

impl std::str::FromStr for PinMode {
    type Err = GpioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "input" => Ok(Self::Input),
            "output" => Ok(Self::Output),
            "pwm" => Ok(Self::Pwm),
            other => Err(GpioError::invalid_option(format!("unknown mode '{}'", other))),
        }
    }
}

/// Input biasing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PullMode {
    #[default]
    None,
    Up,
    Down,
}

impl std::str::FromStr for PullMode {
    type Err = GpioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(GpioError::invalid_option(format!("unknown pull '{}'", other))),
        }
    }
}

/// Digital logic level, serialized as `0` or `1`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    /// The opposite level.
    pub fn toggled(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> u8 {
        match level {
            Level::Low => 0,
            Level::High => 1,
        }
    }
}

impl TryFrom<u8> for Level {
    type Error = GpioError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::High),
            other => Err(GpioError::invalid_option(format!(
                "value must be 0 or 1, got {}",
                other
            ))),
        }
    }
}

/// Snapshot of a configured pin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pin {
    /// BCM pin number
    pub pin: u8,
    /// Current mode
    pub mode: PinMode,
    /// Last known level (stale for pwm)
    pub value: Level,
    /// Pull resistor (input only, `none` otherwise)
    pub pull: PullMode,
    /// PWM frequency in Hz (pwm only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pwm_frequency: Option<u32>,
    /// PWM duty cycle percentage (pwm only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pwm_duty_cycle: Option<f64>,
    pub is_reserved: bool,
    pub is_available: bool,
}

/// Caller-supplied configuration options, validated against the mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PinOptions {
    pub pull: Option<PullMode>,
    pub initial_value: Option<u8>,
    pub pwm_frequency: Option<u32>,
    pub pwm_duty_cycle: Option<f64>,
}

impl PinOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pull(mut self, pull: PullMode) -> Self {
        self.pull = Some(pull);
        self
    }

    pub fn with_initial_value(mut self, value: u8) -> Self {
        self.initial_value = Some(value);
        self
    }

    pub fn with_pwm_frequency(mut self, frequency: u32) -> Self {
        self.pwm_frequency = Some(frequency);
        self
    }

    pub fn with_pwm_duty_cycle(mut self, duty_cycle: f64) -> Self {
        self.pwm_duty_cycle = Some(duty_cycle);
        self
    }

    /// Resolve the options for `mode` into a driver-ready setup.
    pub fn to_setup(&self, mode: PinMode) -> Result<PinSetup> {
        match mode {
            PinMode::Input => Ok(PinSetup::Input {
                pull: self.pull.unwrap_or_default(),
            }),
            PinMode::Output => {
                let initial = match self.initial_value {
                    Some(value) => Level::try_from(value)?,
                    None => Level::Low,
                };
                Ok(PinSetup::Output { initial })
            }
            PinMode::Pwm => {
                let frequency = self.pwm_frequency.ok_or_else(|| {
                    GpioError::invalid_option("pwm mode requires pwm_frequency")
                })?;
                let frequency = validate_frequency(frequency)?;
                let duty_cycle = validate_duty_cycle(self.pwm_duty_cycle.unwrap_or(0.0))?;
                Ok(PinSetup::Pwm {
                    frequency,
                    duty_cycle,
                })
            }
        }
    }
}

/// Validated, mode-specific setup handed to the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PinSetup {
    Input { pull: PullMode },
    Output { initial: Level },
    Pwm { frequency: u32, duty_cycle: f64 },
}

impl PinSetup {
    pub fn mode(&self) -> PinMode {
        match self {
            Self::Input { .. } => PinMode::Input,
            Self::Output { .. } => PinMode::Output,
            Self::Pwm { .. } => PinMode::Pwm,
        }
    }
}

/// Check a duty cycle lies in `[0, 100]`.
pub fn validate_duty_cycle(duty_cycle: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&duty_cycle) {
        return Err(GpioError::invalid_option(format!(
            "duty cycle must be 0-100, got {}",
            duty_cycle
        )));
    }
    Ok(duty_cycle)
}

/// Check a PWM frequency is positive.
pub fn validate_frequency(frequency: u32) -> Result<u32> {
    if frequency == 0 {
        return Err(GpioError::invalid_option("pwm frequency must be positive"));
    }
    Ok(frequency)
}

/// Read-only listing of the pin table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PinListing {
    /// Valid, non-reserved pins
    pub available: Vec<u8>,
    /// Currently configured pins, sorted by number
    pub configured: Vec<Pin>,
    /// Pins the platform forbids configuring
    pub reserved: Vec<u8>,
    /// Available pins backed by a hardware PWM channel
    #[serde(default)]
    pub hardware_pwm: Vec<u8>,
}
