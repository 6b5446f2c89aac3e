//! # Pi Pins - Raspberry Pi GPIO Pin Manager
//!
//! A Rust crate owning the authoritative state of a Raspberry Pi's GPIO pins:
//! configuration as digital input, digital output or PWM output, reads and
//! writes through a pluggable driver, a cancellable background monitor, and
//! live event fan-out to any number of subscribers.
//!
//! ## Features
//!
//! - **Pin registry**: one lock serialises every configure/write/read/release
//! - **Monitoring**: batched `pin_readings` events at a fixed interval
//! - **Event fan-out**: bounded per-subscriber queues, slow consumers drop oldest
//! - **Hardware driver**: `rppal` backed (feature `gpio`), in-memory mock otherwise
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pi_pins::{ControllerConfig, GpioService, MockDriver, PinMode, PinOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = GpioService::new(ControllerConfig::default(), Arc::new(MockDriver::new()))?;
//!     let mut events = service.subscribe();
//!
//!     service
//!         .configure(17, PinMode::Input, &PinOptions::new())
//!         .await?;
//!     service.start_monitoring(&[17], Some(100)).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{}", serde_json::to_string(&event)?);
//!     }
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod gpio;
pub mod service;

// Re-export public API
pub use config::ControllerConfig;
pub use error::{DriverError, ErrorCode, ErrorResponse, GpioError, Result};
pub use events::{Broadcaster, Event, Subscription};
pub use gpio::{
    Level, MockDriver, Monitor, MonitorStatus, Pin, PinDriver, PinListing, PinMode, PinOptions,
    PinRegistry, PullMode,
};
pub use service::GpioService;

#[cfg(feature = "gpio")]
pub use gpio::RppalDriver;

/// The default monitoring interval in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 100;

/// The default upper bound on a single driver call in milliseconds
pub const DEFAULT_DRIVER_TIMEOUT_MS: u64 = 250;
