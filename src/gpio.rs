use std::fmt::Display;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Error;

/// How long a pulsed pin is held low. Emulates a momentary button press.
pub const HOLD: Duration = Duration::from_millis(120);

/// A logical output level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Driven low.
    Low,

    /// Driven high.
    High,
}

/// Which control line a pin is wired to.
///
/// The binding from role to pin number is made once at startup and never
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRole {
    /// The board's reset line.
    Reset,

    /// The board's shutdown/wake line.
    Shutdown,
}

impl Display for PinRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PinRole::Reset => write!(f, "reset"),
            PinRole::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// An output pin the pulse action can drive.
///
/// Kept narrow so tests can substitute a recording double for the sysfs
/// implementation.
pub trait OutputPin: Send {
    /// Drive the pin low.
    fn set_low(&mut self) -> io::Result<()>;

    /// Drive the pin high.
    fn set_high(&mut self) -> io::Result<()>;
}

/// An output pin backed by the kernel's sysfs GPIO interface.
#[derive(Debug)]
pub struct SysfsPin {
    number: u32,
    value: PathBuf,
}

impl SysfsPin {
    /// Export the pin and configure it as an output driven high.
    pub fn export(number: u32) -> Result<Self, Error> {
        let gpio_err = |source| Error::Gpio {
            pin: number,
            source,
        };

        let pin_dir = PathBuf::from(format!("/sys/class/gpio/gpio{number}"));
        if !pin_dir.exists() {
            std::fs::write("/sys/class/gpio/export", number.to_string()).map_err(gpio_err)?;
        }

        // "high" selects the output direction with the line already driven
        // high, so the attached button is released from the first instant.
        std::fs::write(pin_dir.join("direction"), "high").map_err(gpio_err)?;

        debug!(%number, "Pin exported as output, driven high");

        Ok(Self {
            number,
            value: pin_dir.join("value"),
        })
    }

    /// The pin number this was exported as.
    pub fn number(&self) -> u32 {
        self.number
    }
}

impl OutputPin for SysfsPin {
    fn set_low(&mut self) -> io::Result<()> {
        std::fs::write(&self.value, "0")
    }

    fn set_high(&mut self) -> io::Result<()> {
        std::fs::write(&self.value, "1")
    }
}

/// A momentary low pulse on an output pin.
///
/// Triggering drives the pin low immediately and schedules the rising
/// edge [`HOLD`] later on a timer task. The caller never waits out the
/// hold, so pressing a button does not stall the bridge or the watchdog.
#[derive(Clone)]
pub struct Pulse {
    role: PinRole,
    pin: Arc<Mutex<Box<dyn OutputPin>>>,
}

impl Pulse {
    /// Wrap a pin for pulsing.
    pub fn new(role: PinRole, pin: Box<dyn OutputPin>) -> Self {
        Self {
            role,
            pin: Arc::new(Mutex::new(pin)),
        }
    }

    /// Produce one full pulse cycle.
    ///
    /// Every trigger produces its own cycle; triggers are not queued or
    /// coalesced.
    pub fn trigger(&self) {
        info!(role = %self.role, "Pulse");

        if let Err(e) = self
            .pin
            .lock()
            .expect("Pin lock should not be poisoned")
            .set_low()
        {
            warn!(?e, role = %self.role, "Could not drive pin low");
        }

        let pin = Arc::clone(&self.pin);
        let role = self.role;

        tokio::spawn(async move {
            tokio::time::sleep(HOLD).await;

            if let Err(e) = pin
                .lock()
                .expect("Pin lock should not be poisoned")
                .set_high()
            {
                warn!(?e, %role, "Could not drive pin high");
            }
        });
    }
}
