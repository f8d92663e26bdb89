
pub(crate) mod support {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use layout::{Document, Layout, Widget};
    use shared::{domain::PeerId, protocol::Message};

    use crate::transport::PeerRegistry;

    /// In-memory peer registry double: records every delivery, can be
    /// told to fail for one peer.
    #[derive(Default)]
    pub struct RecordingPeers {
        peers: Vec<PeerId>,
        fail_for: Option<PeerId>,
        pub sent: Arc<Mutex<Vec<(PeerId, Message)>>>,
    }

    impl RecordingPeers {
        pub fn with_peers(names: &[&str]) -> Self {
            Self {
                peers: names.iter().map(|name| PeerId::new(*name)).collect(),
                ..Self::default()
            }
        }

        pub fn failing_for(mut self, name: &str) -> Self {
            self.fail_for = Some(PeerId::new(name));
            self
        }

        pub fn sent(&self) -> Vec<(PeerId, Message)> {
            self.sent.lock().expect("sent lock").clone()
        }
    }

    #[async_trait]
    impl PeerRegistry for RecordingPeers {
        fn list_peers(&self) -> Vec<PeerId> {
            self.peers.clone()
        }

        async fn send(&self, peer: &PeerId, message: &Message) -> anyhow::Result<()> {
            if self.fail_for.as_ref() == Some(peer) {
                anyhow::bail!("transport down");
            }
            self.sent
                .lock()
                .expect("sent lock")
                .push((peer.clone(), message.clone()));
            Ok(())
        }
    }

    pub fn layout(text: &str) -> Layout {
        Layout::compile(&Document::parse(text).expect("document")).expect("layout")
    }

    pub fn widget(layout: &Layout, id: &str) -> Widget {
        layout
            .find(&id.into())
            .unwrap_or_else(|| panic!("widget {id}"))
            .clone()
    }

    pub const CONSOLE: &str = r#"[
        {"label": "OSC", "widgets": [
            {"type": "knob", "id": "freq", "address": "/osc/freq",
             "range": {"min": 0, "max": 14000}, "origin": "auto",
             "precision": 2, "preArgs": [{"type": "i", "value": 1}]},
            {"type": "toggle", "id": "enabled", "address": "/osc/enabled",
             "precision": 0, "on": 1, "off": 0,
             "preArgs": [{"type": "i", "value": 1}]},
            {"type": "push", "id": "sync", "address": "/sync",
             "precision": 0, "on": 1, "off": 0, "norelease": true},
            {"type": "multifader", "id": "fm", "address": "/fm",
             "range": {"min": -1, "max": 1}, "origin": 0, "precision": 2,
             "strips": 8, "start": 1, "split": false,
             "preArgs": [{"type": "i", "value": 1}]},
            {"type": "multifader", "id": "sends", "address": "/sends",
             "range": {"min": 0, "max": 1}, "origin": 0, "precision": 2,
             "strips": 4, "start": 1, "split": true},
            {"type": "keyboard", "id": "keyboard", "address": "/note",
             "precision": 1, "keys": 24, "start": 60, "traversing": true,
             "on": 1, "off": 0, "split": false}
        ]}
    ]"#;
}
