use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use rosc::{encoder, OscMessage, OscPacket, OscType};
use tokio::{net::UdpSocket, sync::mpsc};
use tracing::debug;

use runtime::PeerRegistry;
use shared::{
    domain::PeerId,
    protocol::{ArgValue, Message, ServerFrame},
};

/// How to reach one connected peer.
#[derive(Clone)]
enum PeerLink {
    /// WebSocket control surface, fed through its connection task.
    Surface(mpsc::Sender<ServerFrame>),
    /// Static OSC destination from configuration.
    Osc(SocketAddr),
}

/// Registry of connected peers: WebSocket surfaces register and
/// unregister as they come and go, OSC destinations are registered once
/// from configuration.
pub struct Peers {
    links: RwLock<Vec<(PeerId, PeerLink)>>,
    osc_socket: Arc<UdpSocket>,
}

impl Peers {
    pub fn new(osc_socket: Arc<UdpSocket>) -> Self {
        Self {
            links: RwLock::new(Vec::new()),
            osc_socket,
        }
    }

    pub fn register_surface(&self, peer: PeerId, tx: mpsc::Sender<ServerFrame>) {
        let mut links = self.links.write().expect("peer links");
        links.retain(|(id, _)| id != &peer);
        links.push((peer, PeerLink::Surface(tx)));
    }

    pub fn register_osc(&self, peer: PeerId, addr: SocketAddr) {
        let mut links = self.links.write().expect("peer links");
        links.retain(|(id, _)| id != &peer);
        links.push((peer, PeerLink::Osc(addr)));
    }

    pub fn unregister(&self, peer: &PeerId) {
        self.links
            .write()
            .expect("peer links")
            .retain(|(id, _)| id != peer);
    }

    /// Identify an inbound datagram's sender among the configured OSC
    /// peers, so its own updates are not echoed back.
    pub fn peer_for_addr(&self, addr: SocketAddr) -> Option<PeerId> {
        self.links
            .read()
            .expect("peer links")
            .iter()
            .find_map(|(id, link)| match link {
                PeerLink::Osc(known) if *known == addr => Some(id.clone()),
                _ => None,
            })
    }

    fn link(&self, peer: &PeerId) -> Option<PeerLink> {
        self.links
            .read()
            .expect("peer links")
            .iter()
            .find_map(|(id, link)| (id == peer).then(|| link.clone()))
    }
}

#[async_trait]
impl PeerRegistry for Peers {
    fn list_peers(&self) -> Vec<PeerId> {
        self.links
            .read()
            .expect("peer links")
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    async fn send(&self, peer: &PeerId, message: &Message) -> anyhow::Result<()> {
        let link = self
            .link(peer)
            .ok_or_else(|| anyhow::anyhow!("peer {peer} is gone"))?;
        match link {
            PeerLink::Surface(tx) => {
                tx.send(ServerFrame::Control {
                    message: message.clone(),
                })
                .await
                .map_err(|_| anyhow::anyhow!("surface {peer} hung up"))?;
            }
            PeerLink::Osc(addr) => {
                let bytes = encode_osc(message)?;
                self.osc_socket.send_to(&bytes, addr).await?;
            }
        }
        Ok(())
    }
}

fn encode_osc(message: &Message) -> anyhow::Result<Vec<u8>> {
    let packet = OscPacket::Message(OscMessage {
        addr: message.address.clone(),
        args: message.args.iter().map(to_osc_type).collect(),
    });
    encoder::encode(&packet).map_err(|error| anyhow::anyhow!("osc encode failed: {error:?}"))
}

fn to_osc_type(arg: &ArgValue) -> OscType {
    match arg {
        ArgValue::Int(v) => OscType::Int(*v),
        ArgValue::Float(v) => OscType::Float(*v as f32),
        ArgValue::Str(v) => OscType::String(v.clone()),
        ArgValue::True => OscType::Bool(true),
        ArgValue::False => OscType::Bool(false),
    }
}

/// Map an inbound OSC message onto the protocol type. Argument kinds the
/// codec has no use for are dropped with a log line.
pub fn from_osc(message: OscMessage) -> Message {
    let mut args = Vec::with_capacity(message.args.len());
    for arg in message.args {
        match arg {
            OscType::Int(v) => args.push(ArgValue::Int(v)),
            OscType::Long(v) => args.push(ArgValue::Int(v as i32)),
            OscType::Float(v) => args.push(ArgValue::Float(f64::from(v))),
            OscType::Double(v) => args.push(ArgValue::Float(v)),
            OscType::String(v) => args.push(ArgValue::Str(v)),
            OscType::Bool(v) => args.push(ArgValue::from_bool(v)),
            other => debug!(?other, addr = %message.addr, "skipping unsupported osc argument"),
        }
    }
    Message::new(message.addr, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osc_arguments_map_onto_protocol_kinds() {
        let message = from_osc(OscMessage {
            addr: "/osc/freq".into(),
            args: vec![
                OscType::Int(1),
                OscType::Float(0.5),
                OscType::Double(7000.0),
                OscType::Bool(true),
                OscType::Nil,
            ],
        });
        assert_eq!(message.address, "/osc/freq");
        assert_eq!(
            message.args,
            vec![
                ArgValue::Int(1),
                ArgValue::Float(0.5),
                ArgValue::Float(7000.0),
                ArgValue::True,
            ]
        );
    }

    #[tokio::test]
    async fn surfaces_replace_their_link_on_reconnect() {
        let socket = Arc::new(
            UdpSocket::bind("127.0.0.1:0")
                .await
                .expect("bind udp socket"),
        );
        let peers = Peers::new(socket);
        let (first_tx, _first_rx) = mpsc::channel(1);
        let (second_tx, mut second_rx) = mpsc::channel(1);
        let id = PeerId::new("surface");
        peers.register_surface(id.clone(), first_tx);
        peers.register_surface(id.clone(), second_tx);
        assert_eq!(peers.list_peers().len(), 1);

        peers
            .send(&id, &Message::new("/sync", vec![]))
            .await
            .expect("send");
        assert!(second_rx.try_recv().is_ok());

        peers.unregister(&id);
        assert!(peers.list_peers().is_empty());
    }
}
