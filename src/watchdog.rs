use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// How long the link may stay down before the watchdog restarts the
/// process.
pub const GRACE_PERIOD: Duration = Duration::from_secs(30);

/// How often the watchdog looks at the link.
pub const TICK_PERIOD: Duration = Duration::from_millis(2000);

/// A monotonic uptime source.
pub trait Uptime: Send + Sync {
    /// Time elapsed since startup.
    fn uptime(&self) -> Duration;
}

/// Uptime measured from construction.
#[derive(Debug)]
pub struct SystemUptime {
    started: Instant,
}

impl SystemUptime {
    /// Start counting now.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemUptime {
    fn default() -> Self {
        Self::new()
    }
}

impl Uptime for SystemUptime {
    fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Reports whether the network link currently has an address.
pub trait LinkState: Send + Sync {
    /// True if the link is up with an address acquired.
    fn address_acquired(&self) -> bool;
}

/// Route-presence probe.
///
/// Connecting a UDP socket sends no packets; it only asks the kernel
/// whether a route to the target exists, which it does not while the link
/// is down or unaddressed.
#[derive(Debug)]
pub struct UdpProbe {
    target: SocketAddr,
}

impl UdpProbe {
    /// Probe against the given target address.
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl LinkState for UdpProbe {
    fn address_acquired(&self) -> bool {
        match UdpSocket::bind(("0.0.0.0", 0)) {
            Ok(socket) => socket.connect(self.target).is_ok(),
            Err(_) => false,
        }
    }
}

/// Restarts the whole process.
pub trait Restart: Send + Sync {
    /// Restart now. Production implementations do not return.
    fn restart(&self);
}

/// Exits the process, relying on the supervisor to start it again.
///
/// A watchdog or endpoint triggered restart is intentional, so the exit
/// status is success.
#[derive(Debug)]
pub struct ProcessExit;

impl Restart for ProcessExit {
    fn restart(&self) {
        info!("Restarting process");
        std::process::exit(0);
    }
}

/// Tracks when the link was last known good and restarts the process
/// once it has been down past [`GRACE_PERIOD`].
///
/// There is no stored healthy/degraded flag; the state is derived on
/// every tick from `uptime - last_good`, which tolerates transient flaps
/// without debounce logic and self-heals the moment the link returns.
pub struct Watchdog {
    last_good: Duration,
    uptime: Arc<dyn Uptime>,
    link: Arc<dyn LinkState>,
    restart: Arc<dyn Restart>,
}

impl Watchdog {
    /// Create a watchdog considering the link good as of now.
    pub fn new(
        uptime: Arc<dyn Uptime>,
        link: Arc<dyn LinkState>,
        restart: Arc<dyn Restart>,
    ) -> Self {
        let last_good = uptime.uptime();

        Self {
            last_good,
            uptime,
            link,
            restart,
        }
    }

    fn on_tick(&mut self) {
        let now = self.uptime.uptime();
        let acquired = self.link.address_acquired();

        debug!(uptime = ?now, last_good = ?self.last_good, acquired, "Watchdog tick");

        if acquired {
            self.last_good = now;
        } else if now > self.last_good + GRACE_PERIOD {
            warn!(
                down_for = ?(now - self.last_good),
                "Link down past grace period, restarting"
            );
            self.restart.restart();
        }
    }

    /// Run forever on the fixed tick cadence.
    pub async fn run(mut self) {
        let mut ticks = tokio::time::interval(TICK_PERIOD);

        loop {
            ticks.tick().await;
            self.on_tick();
        }
    }
}
