//! Fabricated hardware, useful to run the server without a serial port,
//! GPIO pins, or a network link.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::debug;

use crate::gpio::{Level, OutputPin};
use crate::serial::{SerialCommand, SerialLink};
use crate::watchdog::{LinkState, Restart};

/// An in-memory serial line.
///
/// Presents the same [`SerialLink`] surface as a real port, with the far
/// end of the wire held by a [`MockSerialHandle`]: bytes injected there
/// appear as reads, and every command the server issues is observable.
pub struct MockSerial;

impl MockSerial {
    /// Spawn the mock driver.
    pub fn start() -> (SerialLink, MockSerialHandle) {
        let (command_sender, mut command_receiver) = futures::channel::mpsc::unbounded();
        let (broadcast_sender, _) = broadcast::channel(1024);
        let (observed_sender, observed_receiver) = mpsc::unbounded_channel();
        let (inject_sender, mut inject_receiver) = mpsc::unbounded_channel::<Vec<u8>>();

        let broadcast_sender_task = broadcast_sender.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = command_receiver.next() => match command {
                        Some(command) => {
                            if observed_sender.send(command).is_err() {
                                debug!("Command observer gone");
                            }
                        }
                        None => break,
                    },
                    injected = inject_receiver.recv() => match injected {
                        Some(chunk) => {
                            // No subscribers is fine- that is the
                            // nobody-listening-to-the-wire case.
                            let _ = broadcast_sender_task.send(chunk);
                        }
                        None => break,
                    },
                }
            }

            debug!("Mock serial driver stopped");
        });

        let link = SerialLink::from_parts("mock".into(), command_sender, broadcast_sender, handle);

        (
            link,
            MockSerialHandle {
                commands: observed_receiver,
                wire: inject_sender,
            },
        )
    }
}

/// The far end of a [`MockSerial`] wire.
pub struct MockSerialHandle {
    /// Commands the server issued against the line, in order.
    pub commands: mpsc::UnboundedReceiver<SerialCommand>,

    wire: mpsc::UnboundedSender<Vec<u8>>,
}

impl MockSerialHandle {
    /// Make `bytes` appear as a chunk read from the wire.
    pub fn inject(&self, bytes: &[u8]) {
        self.wire
            .send(bytes.to_vec())
            .expect("Mock serial driver should be alive");
    }
}

/// A level transition observed on a [`RecordingPin`].
#[derive(Debug, Clone, Copy)]
pub struct PinEvent {
    /// The level the pin was driven to.
    pub level: Level,

    /// When it was driven there.
    pub at: Instant,
}

/// An output pin which records every transition with a timestamp.
#[derive(Debug)]
pub struct RecordingPin {
    events: mpsc::UnboundedSender<PinEvent>,
}

impl RecordingPin {
    /// Create the pin and the receiving end of its transition log.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PinEvent>) {
        let (events, log) = mpsc::unbounded_channel();
        (Self { events }, log)
    }

    fn record(&self, level: Level) {
        // The observer may have hung up; the pin itself cannot fail.
        let _ = self.events.send(PinEvent {
            level,
            at: Instant::now(),
        });
    }
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> std::io::Result<()> {
        self.record(Level::Low);
        Ok(())
    }

    fn set_high(&mut self) -> std::io::Result<()> {
        self.record(Level::High);
        Ok(())
    }
}

/// A restart collaborator which counts invocations instead of
/// terminating anything.
#[derive(Debug, Default)]
pub struct MockRestart {
    count: AtomicUsize,
    notify: Notify,
}

impl MockRestart {
    /// How many times a restart has been requested.
    pub fn restarts(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until a restart is requested.
    pub async fn wait(&self) {
        self.notify.notified().await
    }
}

impl Restart for MockRestart {
    fn restart(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

/// A link which always reports an acquired address,
/// keeping the watchdog quiet.
#[derive(Debug)]
pub struct AlwaysUp;

impl LinkState for AlwaysUp {
    fn address_acquired(&self) -> bool {
        true
    }
}
