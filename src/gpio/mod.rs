//! GPIO pin state management.
//!
//! This module holds the pin data model, the driver abstraction over the
//! physical lines, the registry that owns all pin state, and the background
//! monitor that polls input pins.

pub mod data;
pub mod driver;
pub mod mock;
pub mod monitor;
pub mod registry;

// Re-export commonly used items
pub use data::{Level, Pin, PinListing, PinMode, PinOptions, PinSetup, PullMode};
pub use driver::PinDriver;
pub use mock::MockDriver;
pub use monitor::{Monitor, MonitorStatus};
pub use registry::{PinRegistry, RegistryGuard};

#[cfg(feature = "gpio")]
pub use driver::RppalDriver;
