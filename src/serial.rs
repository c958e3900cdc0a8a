use bytes::Bytes;
use futures::{channel::mpsc, SinkExt, StreamExt};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{BytesCodec, Decoder};
use tracing::{error, info, info_span, trace, warn, Instrument};

use crate::error::Error;

/// The fixed line rate. The whole setup is 115200 8N1, no flow control.
pub const BAUD_RATE: u32 = 115_200;

/// What can be asked of the serial line.
///
/// A write on its own may sit in the transmit buffer; a flush pushes it
/// out. The bridge always issues the two back to back so peer bytes hit
/// the wire before anything else happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialCommand {
    /// Put these bytes in the transmit buffer.
    Write(Vec<u8>),

    /// Push the transmit buffer onto the wire.
    Flush,
}

/// A handle to a running serial line.
///
/// The port itself is owned by a background task; this handle hands out
/// the command sender (for writing) and broadcast subscriptions (for
/// reading).
#[derive(Debug)]
pub struct SerialLink {
    path: String,
    commands: mpsc::UnboundedSender<SerialCommand>,
    incoming: broadcast::Sender<Vec<u8>>,
    _handle: JoinHandle<()>,
}

impl SerialLink {
    /// Open the serial port at `path` and spawn its driver task.
    ///
    /// The line is configured as 115200 8N1 with no flow control;
    /// if the port cannot be opened that way the whole startup fails.
    pub fn open(path: &str) -> Result<Self, Error> {
        info!(%path, baud = BAUD_RATE, "Opening serial port");

        let serial_stream = tokio_serial::new(path, BAUD_RATE)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|source| Error::SerialOpen {
                path: path.to_string(),
                source,
            })?;

        // Sink: send things (to serial port), stream: receive things (from serial port).
        // BytesCodec yields whatever the port has, unframed- the bridge is
        // a raw passthrough and must not impose line semantics.
        let (mut sink, stream) = BytesCodec::new().framed(serial_stream).split();

        enum Event {
            Command(SerialCommand),
            FromWire(Result<bytes::BytesMut, std::io::Error>),
        }

        let stream = stream.map(Event::FromWire);

        let (command_sender, command_receiver) = mpsc::unbounded();
        let command_receiver = command_receiver.map(Event::Command);

        // Outsiders observe the wire through this broadcast.
        let (broadcast_sender, _) = broadcast::channel(1024);
        let broadcast_sender_task = broadcast_sender.clone();

        let tty_span = info_span!("tty", %path);

        let handle = tokio::spawn(
            async move {
                let mut events = futures::stream::select(stream, command_receiver);

                loop {
                    match events.select_next_some().await {
                        Event::Command(SerialCommand::Write(bytes)) => {
                            if let Err(e) = sink.feed(Bytes::from(bytes)).await {
                                error!(?e, "Serial port error in write, exiting");
                                break;
                            }
                        }
                        Event::Command(SerialCommand::Flush) => {
                            if let Err(e) = sink.flush().await {
                                error!(?e, "Serial port error in flush, exiting");
                                break;
                            }
                        }
                        Event::FromWire(Ok(chunk)) => {
                            trace!(
                                "Chunk from port: `{:?}`",
                                &chunk[..chunk.len().min(32)]
                            );

                            match broadcast_sender_task.send(chunk.to_vec()) {
                                Ok(listeners) => {
                                    trace!("Broadcasted chunk to {listeners} listener(s)")
                                }
                                Err(e) => {
                                    warn!("Send error in broadcast: {e:?}")
                                }
                            }
                        }
                        Event::FromWire(Err(e)) => {
                            error!(?e, "Serial port error, exiting");
                            break;
                        }
                    }
                }
            }
            .instrument(tty_span),
        );

        Ok(Self {
            path: path.to_string(),
            commands: command_sender,
            incoming: broadcast_sender,
            _handle: handle,
        })
    }

    /// Assemble a link from an already running driver task.
    /// This is how the mock driver presents itself as a serial line.
    pub(crate) fn from_parts(
        path: String,
        commands: mpsc::UnboundedSender<SerialCommand>,
        incoming: broadcast::Sender<Vec<u8>>,
        handle: JoinHandle<()>,
    ) -> Self {
        Self {
            path,
            commands,
            incoming,
            _handle: handle,
        }
    }

    /// The device path this link is attached to.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// A sender for issuing [`SerialCommand`]s against the line.
    pub(crate) fn commands(&self) -> mpsc::UnboundedSender<SerialCommand> {
        self.commands.clone()
    }

    /// Subscribe to byte chunks read from the line.
    /// Only chunks read after subscribing are seen.
    pub fn incoming(&self) -> broadcast::Receiver<Vec<u8>> {
        self.incoming.subscribe()
    }
}
