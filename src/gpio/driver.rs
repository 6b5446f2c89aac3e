//! Pin driver abstraction over the physical GPIO lines.
//!
//! The registry talks to hardware only through [`PinDriver`]. The real
//! implementation is feature-gated on `gpio` so the crate still builds on
//! machines without a Raspberry Pi GPIO block.

use crate::error::DriverError;
use crate::gpio::data::{Level, PinSetup};

/// Result of a single driver call.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Line-level GPIO operations.
///
/// Calls are synchronous and expected to return promptly. Implementations
/// synchronise internally so they can be shared behind an `Arc`.
pub trait PinDriver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Claim `pin` and put it in the requested mode.
    fn configure(&self, pin: u8, setup: &PinSetup) -> DriverResult<()>;

    /// Drive an output pin.
    fn write(&self, pin: u8, level: Level) -> DriverResult<()>;

    /// Sample an input pin.
    fn read(&self, pin: u8) -> DriverResult<Level>;

    /// Update PWM duty cycle (percent) and frequency (Hz).
    fn set_pwm(&self, pin: u8, duty_cycle: f64, frequency: u32) -> DriverResult<()>;

    /// Return `pin` to its unclaimed state.
    fn release(&self, pin: u8) -> DriverResult<()>;

    /// Final cleanup after every pin has been released.
    fn release_all(&self) -> DriverResult<()> {
        Ok(())
    }
}

#[cfg(feature = "gpio")]
mod raspberry_pi {
    use super::*;
    use crate::gpio::data::PullMode;
    use rppal::gpio::{Gpio, InputPin, OutputPin};
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Line {
        Input(InputPin),
        Output(OutputPin),
        Pwm(OutputPin),
    }

    /// Raspberry Pi GPIO driver using rppal.
    pub struct RppalDriver {
        gpio: Gpio,
        lines: Mutex<HashMap<u8, Line>>,
    }

    impl RppalDriver {
        /// Open the GPIO peripheral.
        pub fn new() -> DriverResult<Self> {
            let gpio = Gpio::new().map_err(|e| {
                DriverError::hardware(format!("Failed to initialize GPIO: {}", e))
            })?;

            Ok(Self {
                gpio,
                lines: Mutex::new(HashMap::new()),
            })
        }

        fn lines(&self) -> DriverResult<std::sync::MutexGuard<'_, HashMap<u8, Line>>> {
            self.lines
                .lock()
                .map_err(|_| DriverError::hardware("GPIO line table poisoned"))
        }
    }

    fn to_rppal(level: Level) -> rppal::gpio::Level {
        match level {
            Level::Low => rppal::gpio::Level::Low,
            Level::High => rppal::gpio::Level::High,
        }
    }

    fn from_rppal(level: rppal::gpio::Level) -> Level {
        match level {
            rppal::gpio::Level::Low => Level::Low,
            rppal::gpio::Level::High => Level::High,
        }
    }

    fn start_pwm(line: &mut OutputPin, duty_cycle: f64, frequency: u32) -> DriverResult<()> {
        line.set_pwm_frequency(f64::from(frequency), duty_cycle / 100.0)
            .map_err(|e| DriverError::hardware(format!("PWM update failed: {}", e)))
    }

    impl PinDriver for RppalDriver {
        fn name(&self) -> &'static str {
            "rppal"
        }

        fn configure(&self, pin: u8, setup: &PinSetup) -> DriverResult<()> {
            let mut lines = self.lines()?;
            // Re-claiming requires the previous handle to be dropped first.
            lines.remove(&pin);

            let raw = self.gpio.get(pin).map_err(|e| match e {
                rppal::gpio::Error::PinUsed(_) => DriverError::Busy,
                rppal::gpio::Error::PinNotAvailable(_) => DriverError::Unavailable,
                other => DriverError::hardware(other.to_string()),
            })?;

            let line = match *setup {
                PinSetup::Input { pull } => Line::Input(match pull {
                    PullMode::None => raw.into_input(),
                    PullMode::Up => raw.into_input_pullup(),
                    PullMode::Down => raw.into_input_pulldown(),
                }),
                PinSetup::Output { initial } => {
                    let mut out = raw.into_output();
                    out.write(to_rppal(initial));
                    Line::Output(out)
                }
                PinSetup::Pwm {
                    frequency,
                    duty_cycle,
                } => {
                    let mut out = raw.into_output_low();
                    start_pwm(&mut out, duty_cycle, frequency)?;
                    Line::Pwm(out)
                }
            };

            lines.insert(pin, line);
            Ok(())
        }

        fn write(&self, pin: u8, level: Level) -> DriverResult<()> {
            match self.lines()?.get_mut(&pin) {
                Some(Line::Output(out)) => {
                    out.write(to_rppal(level));
                    Ok(())
                }
                _ => Err(DriverError::hardware(format!("pin {} is not an output", pin))),
            }
        }

        fn read(&self, pin: u8) -> DriverResult<Level> {
            match self.lines()?.get(&pin) {
                Some(Line::Input(input)) => Ok(from_rppal(input.read())),
                _ => Err(DriverError::hardware(format!("pin {} is not an input", pin))),
            }
        }

        fn set_pwm(&self, pin: u8, duty_cycle: f64, frequency: u32) -> DriverResult<()> {
            match self.lines()?.get_mut(&pin) {
                Some(Line::Pwm(out)) => start_pwm(out, duty_cycle, frequency),
                _ => Err(DriverError::hardware(format!("pin {} is not a PWM output", pin))),
            }
        }

        fn release(&self, pin: u8) -> DriverResult<()> {
            let mut lines = self.lines()?;
            if let Some(Line::Pwm(mut out)) = lines.remove(&pin) {
                out.clear_pwm()
                    .map_err(|e| DriverError::hardware(format!("PWM stop failed: {}", e)))?;
            }
            // Dropping the rppal handle resets the line.
            Ok(())
        }

        fn release_all(&self) -> DriverResult<()> {
            self.lines()?.clear();
            Ok(())
        }
    }
}

#[cfg(feature = "gpio")]
pub use raspberry_pi::RppalDriver;
