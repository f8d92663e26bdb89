use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use layout::{Document, Layout};
use runtime::{PeerRegistry, Session, SessionEvent};
use shared::{
    domain::PeerId,
    protocol::{ArgValue, Message, Value},
};

/// A control-surface document in the shape real editors produce: pages,
/// nested tabs, mirrors across pages, packed strips, unknown styling
/// fields.
const DOCUMENT: &str = r#"[
    {
        "label": "KEYB",
        "widgets": [
            {"type": "keyboard", "id": "keyboard", "label": false,
             "left": 0, "top": 0, "width": "100%", "height": "100%",
             "color": "auto", "precision": 1, "address": "/note",
             "preArgs": [], "target": [], "keys": 24, "start": 60,
             "traversing": true, "on": 1, "off": 0, "split": false}
        ]
    },
    {
        "label": "OSC",
        "widgets": [],
        "tabs": [
            {
                "label": "1",
                "widgets": [
                    {"type": "knob", "id": "freq", "label": "Frequency",
                     "range": {"min": 0, "max": 14000}, "origin": "auto",
                     "value": 0, "logScale": false, "precision": 2,
                     "address": "/osc/freq",
                     "preArgs": [{"type": "i", "value": 1}], "target": []},
                    {"type": "multifader", "id": "fm", "address": "/fm",
                     "preArgs": [{"type": "i", "value": 1}], "origin": 0,
                     "strips": 8, "start": 1, "traversing": true,
                     "range": {"min": -1, "max": 1}, "value": "",
                     "logScale": false, "precision": 2, "split": false,
                     "target": []},
                    {"type": "keyboard", "id": "keyboard", "label": false,
                     "precision": 1, "address": "/note", "preArgs": [],
                     "target": [], "keys": 18, "start": 60,
                     "traversing": true, "on": 1, "off": 0, "split": false},
                    {"type": "push", "id": "sync", "label": "Sync",
                     "on": 1, "off": 0, "norelease": false, "precision": 0,
                     "address": "/sync", "preArgs": [],
                     "target": ["engine"]}
                ]
            },
            {"label": "2"}
        ]
    },
    {"label": "ENV"}
]"#;

#[derive(Default)]
struct MemoryPeers {
    peers: Vec<PeerId>,
    sent: Arc<Mutex<Vec<(PeerId, Message)>>>,
}

impl MemoryPeers {
    fn new(names: &[&str]) -> Self {
        Self {
            peers: names.iter().map(|name| PeerId::new(*name)).collect(),
            sent: Arc::default(),
        }
    }

    fn sent(&self) -> Vec<(PeerId, Message)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl PeerRegistry for MemoryPeers {
    fn list_peers(&self) -> Vec<PeerId> {
        self.peers.clone()
    }

    async fn send(&self, peer: &PeerId, message: &Message) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((peer.clone(), message.clone()));
        Ok(())
    }
}

#[tokio::test]
async fn a_whole_surface_session_end_to_end() {
    let document = Document::parse(DOCUMENT).expect("document");
    let layout = Layout::compile(&document).expect("layout");
    let peers = Arc::new(MemoryPeers::new(&["surface", "engine"]));
    let session = Session::spawn(&layout, peers.clone());
    let handle = session.handle();

    // State recall starts from the document: four logical controls, the
    // two keyboards folded into one mirror slot.
    let recall = handle.snapshot().await.expect("snapshot");
    assert_eq!(recall.len(), 4);

    // A surface turns the frequency knob to mid-position.
    assert!(
        handle
            .submit(SessionEvent::SetPosition {
                widget_id: "freq".into(),
                cell: None,
                position: 0.5,
            })
            .await
    );

    // The engine reports all eight modulation strips in one packed
    // message.
    let mut args = vec![ArgValue::Int(1)];
    args.extend((0..8).map(|i| ArgValue::Float(f64::from(i) * 0.1)));
    assert!(
        handle
            .inbound(Message::new("/fm", args), Some("engine".into()))
            .await
    );

    // A note arrives addressed to the keyboard mirrors.
    assert!(
        handle
            .inbound(
                Message::new("/note", vec![ArgValue::Int(62), ArgValue::Float(1.0)]),
                None,
            )
            .await
    );

    let state = handle.snapshot().await.expect("snapshot");
    let value_of = |id: &str| {
        state
            .iter()
            .find(|entry| entry.widget_id.as_str() == id)
            .unwrap_or_else(|| panic!("widget {id}"))
            .value
            .clone()
    };
    assert_eq!(value_of("freq"), Value::Scalar(7000.0));
    let Value::Vector(fm) = value_of("fm") else {
        panic!("fm holds a vector");
    };
    assert_eq!(fm.len(), 8);
    assert_eq!(fm[7], 0.7);
    let Value::Vector(keys) = value_of("keyboard") else {
        panic!("keyboard holds a vector");
    };
    assert_eq!(keys[2], 1.0);

    // The knob turn broadcast to both peers; the packed strip update
    // relayed everywhere but back to the engine.
    let sent = peers.sent();
    let freq_recipients: Vec<&str> = sent
        .iter()
        .filter(|(_, message)| message.address == "/osc/freq")
        .map(|(peer, _)| peer.as_str())
        .collect();
    assert_eq!(freq_recipients, ["surface", "engine"]);
    let fm_recipients: Vec<&str> = sent
        .iter()
        .filter(|(_, message)| message.address == "/fm")
        .map(|(peer, _)| peer.as_str())
        .collect();
    assert_eq!(fm_recipients, ["surface"]);

    // Declared targets win over broadcast.
    assert!(
        handle
            .submit(SessionEvent::Press {
                widget_id: "sync".into(),
                cell: None,
            })
            .await
    );
    handle.snapshot().await.expect("snapshot");
    let sent = peers.sent();
    let sync_recipients: Vec<&str> = sent
        .iter()
        .filter(|(_, message)| message.address == "/sync")
        .map(|(peer, _)| peer.as_str())
        .collect();
    assert_eq!(sync_recipients, ["engine"]);

    session.shutdown().await;
    assert!(!handle.inbound(Message::new("/sync", vec![]), None).await);
}
