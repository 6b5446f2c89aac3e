//! In-memory pin driver for systems without GPIO support.
//!
//! Besides standing in for hardware, the mock lets tests script the outside
//! world: drive input levels, fail specific operations and slow reads down.

use crate::error::DriverError;
use crate::gpio::data::{Level, PinSetup};
use crate::gpio::driver::{DriverResult, PinDriver};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Driver operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    Configure,
    Write,
    Read,
    SetPwm,
    Release,
}

/// Physical state of a mock line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockLine {
    pub setup: PinSetup,
    pub level: Level,
    pub duty_cycle: f64,
    pub frequency: u32,
}

#[derive(Default)]
struct MockState {
    lines: HashMap<u8, MockLine>,
    // Levels an external circuit applies to input pins
    inputs: HashMap<u8, Level>,
    failures: HashSet<(DriverOp, u8)>,
    delays: HashMap<(DriverOp, u8), Duration>,
    // Lines held by another process
    foreign: HashSet<u8>,
}

/// Mock GPIO driver.
#[derive(Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
    calls: AtomicUsize,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not wedge every later call.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, op: DriverOp, pin: u8) -> DriverResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = {
            let state = self.state();
            if state.failures.contains(&(op, pin)) {
                return Err(DriverError::hardware(format!(
                    "injected {:?} failure on pin {}",
                    op, pin
                )));
            }
            if op == DriverOp::Configure && state.foreign.contains(&pin) {
                return Err(DriverError::Busy);
            }
            state.delays.get(&(op, pin)).copied()
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    /// Simulate an external signal on an input pin.
    pub fn set_input_level(&self, pin: u8, level: Level) {
        self.state().inputs.insert(pin, level);
    }

    /// Make every `op` on `pin` fail until cleared.
    pub fn fail(&self, op: DriverOp, pin: u8) {
        self.state().failures.insert((op, pin));
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Block every `op` on `pin` for `delay` before answering.
    pub fn delay(&self, op: DriverOp, pin: u8, delay: Duration) {
        self.state().delays.insert((op, pin), delay);
    }

    pub fn delay_reads(&self, pin: u8, delay: Duration) {
        self.delay(DriverOp::Read, pin, delay);
    }

    /// Simulate another process holding `pin`, so claiming it reports busy.
    pub fn claim_elsewhere(&self, pin: u8) {
        self.state().foreign.insert(pin);
    }

    /// Total number of driver calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Physical state of `pin`, if claimed.
    pub fn line(&self, pin: u8) -> Option<MockLine> {
        self.state().lines.get(&pin).copied()
    }

    pub fn claimed_pins(&self) -> Vec<u8> {
        let mut pins: Vec<u8> = self.state().lines.keys().copied().collect();
        pins.sort_unstable();
        pins
    }
}

impl PinDriver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn configure(&self, pin: u8, setup: &PinSetup) -> DriverResult<()> {
        self.enter(DriverOp::Configure, pin)?;
        let mut state = self.state();
        let (level, duty_cycle, frequency) = match *setup {
            PinSetup::Input { .. } => (state.inputs.get(&pin).copied().unwrap_or_default(), 0.0, 0),
            PinSetup::Output { initial } => (initial, 0.0, 0),
            PinSetup::Pwm {
                frequency,
                duty_cycle,
            } => (Level::Low, duty_cycle, frequency),
        };
        state.lines.insert(
            pin,
            MockLine {
                setup: *setup,
                level,
                duty_cycle,
                frequency,
            },
        );
        Ok(())
    }

    fn write(&self, pin: u8, level: Level) -> DriverResult<()> {
        self.enter(DriverOp::Write, pin)?;
        match self.state().lines.get_mut(&pin) {
            Some(line) => {
                line.level = level;
                Ok(())
            }
            None => Err(DriverError::Unavailable),
        }
    }

    fn read(&self, pin: u8) -> DriverResult<Level> {
        self.enter(DriverOp::Read, pin)?;
        let mut state = self.state();
        let external = state.inputs.get(&pin).copied();
        match state.lines.get_mut(&pin) {
            Some(line) => {
                if let Some(level) = external {
                    line.level = level;
                }
                Ok(line.level)
            }
            None => Err(DriverError::Unavailable),
        }
    }

    fn set_pwm(&self, pin: u8, duty_cycle: f64, frequency: u32) -> DriverResult<()> {
        self.enter(DriverOp::SetPwm, pin)?;
        match self.state().lines.get_mut(&pin) {
            Some(line) => {
                line.duty_cycle = duty_cycle;
                line.frequency = frequency;
                Ok(())
            }
            None => Err(DriverError::Unavailable),
        }
    }

    fn release(&self, pin: u8) -> DriverResult<()> {
        self.enter(DriverOp::Release, pin)?;
        self.state().lines.remove(&pin);
        Ok(())
    }

    fn release_all(&self) -> DriverResult<()> {
        self.state().lines.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::data::PullMode;

    #[test]
    fn test_mock_tracks_lines() {
        let driver = MockDriver::new();
        driver
            .configure(17, &PinSetup::Output { initial: Level::High })
            .unwrap();
        assert_eq!(driver.line(17).unwrap().level, Level::High);

        driver.write(17, Level::Low).unwrap();
        assert_eq!(driver.line(17).unwrap().level, Level::Low);

        driver.release(17).unwrap();
        assert!(driver.line(17).is_none());
        assert_eq!(driver.call_count(), 3);
    }

    #[test]
    fn test_mock_external_input() {
        let driver = MockDriver::new();
        driver
            .configure(27, &PinSetup::Input { pull: PullMode::Up })
            .unwrap();
        assert_eq!(driver.read(27).unwrap(), Level::Low);

        driver.set_input_level(27, Level::High);
        assert_eq!(driver.read(27).unwrap(), Level::High);
    }

    #[test]
    fn test_mock_injected_failure() {
        let driver = MockDriver::new();
        driver.fail(DriverOp::Configure, 5);
        assert!(driver
            .configure(5, &PinSetup::Input { pull: PullMode::None })
            .is_err());
        assert!(driver.line(5).is_none());

        driver.clear_failures();
        assert!(driver
            .configure(5, &PinSetup::Input { pull: PullMode::None })
            .is_ok());
    }

    #[test]
    fn test_mock_line_held_elsewhere() {
        let driver = MockDriver::new();
        driver.claim_elsewhere(5);
        assert_eq!(
            driver.configure(5, &PinSetup::Output { initial: Level::Low }),
            Err(DriverError::Busy)
        );
        assert!(driver.claimed_pins().is_empty());
    }
}
