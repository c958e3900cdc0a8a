use std::fmt::Display;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::bridge::BridgeHandle;

/// Identifies one accepted TCP peer for the lifetime of the process.
/// Handed out in increasing order by the accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct PeerId(pub(crate) u64);

impl Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Accept connections forever, registering each with the bridge and
/// spawning a task to pump its bytes.
pub(crate) async fn accept_loop(listener: TcpListener, bridge: BridgeHandle) {
    let mut next_id = 0_u64;

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let id = PeerId(next_id);
                next_id += 1;

                info!(%id, %addr, "Peer connected");

                let (outbound_sender, outbound_receiver) = mpsc::unbounded_channel();
                bridge.peer_connected(id, outbound_sender);

                tokio::spawn(
                    peer_task(id, stream, bridge.clone(), outbound_receiver)
                        .instrument(info_span!("peer", %id, %addr)),
                );
            }
            Err(e) => {
                warn!(?e, "Accept failed");
            }
        }
    }
}

/// Pump one peer: socket reads go to the bridge, broadcasts from the
/// bridge go to the socket. Ends on the first I/O failure or hangup,
/// deregistering the peer on the way out.
async fn peer_task(
    id: PeerId,
    stream: TcpStream,
    bridge: BridgeHandle,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut read_buffer = vec![0_u8; 2048];

    loop {
        tokio::select! {
            to_network = outbound.recv() => match to_network {
                Some(bytes) => {
                    if let Err(e) = writer.write_all(&bytes).await {
                        debug!(?e, "Write failed");
                        break;
                    }
                }
                // The engine dropped us.
                None => break,
            },
            from_network = reader.read(&mut read_buffer) => match from_network {
                Ok(0) => {
                    debug!("Peer hung up");
                    break;
                }
                Ok(n) => bridge.peer_data(id, read_buffer[..n].to_vec()),
                Err(e) => {
                    debug!(?e, "Read failed");
                    break;
                }
            },
        }
    }

    bridge.peer_disconnected(id);
    debug!("Peer task done");
}
