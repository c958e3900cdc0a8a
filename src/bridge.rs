//! The bridge engine keeps the serial line and all TCP peers
//! byte-synchronized: no framing, no transformation, no loss under
//! normal operation.
//!
//! The engine is one task owning all of its state. Events arrive on a
//! single channel and each handler runs to completion before the next
//! event is looked at, so there is never concurrent mutation of the
//! peer registry or the line buffer.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::peer::PeerId;
use crate::serial::SerialCommand;

/// What can happen to the bridge.
#[derive(Debug)]
pub(crate) enum BridgeEvent {
    /// A chunk of bytes was read from the serial line.
    SerialData(Vec<u8>),

    /// A peer finished connecting; its outbound channel is registered.
    PeerConnected {
        id: PeerId,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    },

    /// A peer sent bytes.
    PeerData { id: PeerId, bytes: Vec<u8> },

    /// A peer went away.
    PeerDisconnected { id: PeerId },
}

/// A handle for feeding events to a running [`BridgeEngine`].
#[derive(Debug, Clone)]
pub(crate) struct BridgeHandle(mpsc::UnboundedSender<BridgeEvent>);

impl BridgeHandle {
    /// Spawn an engine writing to the given serial command sender.
    pub(crate) fn new(serial: futures::channel::mpsc::UnboundedSender<SerialCommand>) -> Self {
        let (events_sender, events_receiver) = mpsc::unbounded_channel();

        let mut engine = BridgeEngine::new(events_receiver, serial);
        tokio::spawn(async move { engine.run().await });

        BridgeHandle(events_sender)
    }

    pub(crate) fn serial_data(&self, chunk: Vec<u8>) {
        self.send(BridgeEvent::SerialData(chunk));
    }

    pub(crate) fn peer_connected(&self, id: PeerId, outbound: mpsc::UnboundedSender<Vec<u8>>) {
        self.send(BridgeEvent::PeerConnected { id, outbound });
    }

    pub(crate) fn peer_data(&self, id: PeerId, bytes: Vec<u8>) {
        self.send(BridgeEvent::PeerData { id, bytes });
    }

    pub(crate) fn peer_disconnected(&self, id: PeerId) {
        self.send(BridgeEvent::PeerDisconnected { id });
    }

    fn send(&self, event: BridgeEvent) {
        self.0.send(event).expect("Engine should be alive");
    }
}

pub(crate) struct BridgeEngine {
    /// Events for the engine to handle.
    events: mpsc::UnboundedReceiver<BridgeEvent>,

    /// Where bytes headed for the serial line go.
    serial: futures::channel::mpsc::UnboundedSender<SerialCommand>,

    /// Live peers. Ids are handed out in increasing order, so iteration
    /// is registration order.
    peers: BTreeMap<PeerId, mpsc::UnboundedSender<Vec<u8>>>,

    /// Bytes read from the serial line since the last broadcast.
    /// Always empty between events.
    line_buffer: Vec<u8>,
}

impl BridgeEngine {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<BridgeEvent>,
        serial: futures::channel::mpsc::UnboundedSender<SerialCommand>,
    ) -> Self {
        Self {
            events,
            serial,
            peers: BTreeMap::new(),
            line_buffer: Vec::new(),
        }
    }

    pub(crate) async fn run(&mut self) {
        while let Some(event) = self.events.recv().await {
            match event {
                BridgeEvent::SerialData(chunk) => self.on_serial_data(&chunk),
                BridgeEvent::PeerConnected { id, outbound } => self.on_peer_connect(id, outbound),
                BridgeEvent::PeerData { id, bytes } => self.on_peer_data(id, bytes),
                BridgeEvent::PeerDisconnected { id } => self.on_peer_disconnect(id),
            }
        }

        debug!("Event senders gone, engine stopping");
    }

    /// Serial line → all peers.
    ///
    /// Every live peer gets the same snapshot of the buffered bytes, and
    /// the buffer is emptied afterwards. With no peers connected the
    /// bytes are simply discarded.
    fn on_serial_data(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }

        self.line_buffer.extend_from_slice(chunk);

        for (id, outbound) in &self.peers {
            if outbound.send(self.line_buffer.clone()).is_err() {
                // Mid-disconnect; the deregistration event is on its way.
                trace!(%id, "Peer outbound closed, skipping");
            }
        }

        self.line_buffer.clear();
    }

    /// Peer → serial line, with the bytes also bounced back to the
    /// sending peer.
    ///
    /// The write is followed by an explicit flush so the bytes hit the
    /// wire before anything else is processed.
    fn on_peer_data(&mut self, id: PeerId, bytes: Vec<u8>) {
        let Some(outbound) = self.peers.get(&id) else {
            debug!(%id, "Data from unregistered peer, dropping");
            return;
        };

        if outbound.send(bytes.clone()).is_err() {
            trace!(%id, "Peer outbound closed, echo dropped");
        }

        if self
            .serial
            .unbounded_send(SerialCommand::Write(bytes))
            .is_err()
            || self.serial.unbounded_send(SerialCommand::Flush).is_err()
        {
            warn!("Serial line gone, peer bytes dropped");
        }
    }

    fn on_peer_connect(&mut self, id: PeerId, outbound: mpsc::UnboundedSender<Vec<u8>>) {
        debug!(%id, "Peer registered");

        // Ids are unique for the process lifetime, so a second insert
        // would be a bug on our part.
        assert!(self.peers.insert(id, outbound).is_none());
    }

    fn on_peer_disconnect(&mut self, id: PeerId) {
        debug!(%id, "Peer deregistered");

        assert!(self.peers.remove(&id).is_some());
    }
}
