#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// Possible errors in this library.
pub mod error;

/// GPIO pins and the momentary pulse action.
pub mod gpio;

/// Logging/tracing setup.
pub mod logging;

/// In-memory stand-ins for the hardware collaborators.
///
/// Lets the whole server run without a serial port, GPIO pins, or a
/// network link, which is how the integration tests exercise it.
pub mod mock;

/// Serial port driver.
pub mod serial;

/// Code relating to setting up the server which binds the listeners and
/// spawns the bridge, watchdog, and HTTP handlers.
pub mod server;

/// The network-health watchdog.
pub mod watchdog;

/// The engine relaying bytes between the serial line and TCP peers.
pub(crate) mod bridge;

/// TCP peer connections and the accept loop.
pub(crate) mod peer;
