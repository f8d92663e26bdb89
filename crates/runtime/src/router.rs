use layout::{Layout, Widget};
use shared::{domain::PeerId, protocol::Message};
use tracing::warn;

use crate::{codec, transport::PeerRegistry};

/// Routing table compiled once from the depth-first widget list. Each
/// entry keeps its widget's compiled address pattern; matching a message
/// never re-parses a pattern.
pub struct Router {
    widgets: Vec<Widget>,
}

impl Router {
    pub fn new(layout: &Layout) -> Self {
        Self {
            widgets: layout.widgets().into_iter().cloned().collect(),
        }
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn widget(&self, index: usize) -> Option<&Widget> {
        self.widgets.get(index)
    }

    /// First widget carrying `id`, in insertion order.
    pub fn widget_by_id(&self, id: &shared::domain::WidgetId) -> Option<&Widget> {
        self.widgets.iter().find(|widget| &widget.id == id)
    }

    /// Every widget whose address admits the inbound address, in
    /// insertion order. Several matches mean mirrored controls; all of
    /// them receive the update.
    pub fn route(&self, address: &str) -> Vec<&Widget> {
        self.widgets
            .iter()
            .filter(|widget| codec::admits(widget, address))
            .collect()
    }
}

/// Per-target outcome of publishing one outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Sent { peer: PeerId },
    /// Declared target not present in the registry. Non-fatal: delivery
    /// continues to the remaining targets.
    UnknownTarget { peer: PeerId },
    Failed { peer: PeerId, error: String },
}

/// Deliver `message` to the declared targets, or to every known peer
/// when the target list is empty (broadcast). `exclude` suppresses the
/// echo back to the peer an update came from.
pub async fn publish(
    message: &Message,
    targets: &[PeerId],
    exclude: Option<&PeerId>,
    peers: &dyn PeerRegistry,
) -> Vec<Delivery> {
    let known = peers.list_peers();
    let mut recipients = Vec::new();
    let mut results = Vec::new();

    if targets.is_empty() {
        recipients.extend(known);
    } else {
        for target in targets {
            if known.contains(target) {
                recipients.push(target.clone());
            } else {
                warn!(peer = %target, address = %message.address, "unknown publish target");
                results.push(Delivery::UnknownTarget {
                    peer: target.clone(),
                });
            }
        }
    }

    for peer in recipients {
        if exclude == Some(&peer) {
            continue;
        }
        match peers.send(&peer, message).await {
            Ok(()) => results.push(Delivery::Sent { peer }),
            Err(error) => {
                warn!(peer = %peer, address = %message.address, %error, "delivery failed");
                results.push(Delivery::Failed {
                    peer,
                    error: error.to_string(),
                });
            }
        }
    }

    results
}
