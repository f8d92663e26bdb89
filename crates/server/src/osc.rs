use std::{collections::VecDeque, sync::Arc};

use rosc::OscPacket;
use tokio::{net::UdpSocket, task::JoinHandle};
use tracing::warn;

use runtime::SessionHandle;

use crate::peers::{from_osc, Peers};

/// Receive loop for the OSC side: datagrams in, session events out.
/// Undecodable packets are dropped with a warning; the loop never stops
/// for them.
pub fn spawn_bridge(
    socket: Arc<UdpSocket>,
    peers: Arc<Peers>,
    session: SessionHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; rosc::decoder::MTU];
        loop {
            let (len, from) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(error) => {
                    warn!(%error, "osc receive failed");
                    continue;
                }
            };
            let packet = match rosc::decoder::decode_udp(&buf[..len]) {
                Ok((_, packet)) => packet,
                Err(error) => {
                    warn!(%from, ?error, "dropping undecodable osc packet");
                    continue;
                }
            };
            let source = peers.peer_for_addr(from);

            // Bundles flatten in order; timestamps are the transport's
            // concern, not the session's.
            let mut queue = VecDeque::from([packet]);
            while let Some(packet) = queue.pop_front() {
                match packet {
                    OscPacket::Message(message) => {
                        if !session.inbound(from_osc(message), source.clone()).await {
                            return;
                        }
                    }
                    OscPacket::Bundle(bundle) => queue.extend(bundle.content),
                }
            }
        }
    })
}
