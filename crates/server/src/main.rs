use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use layout::{Document, Layout};
use runtime::{Session, SessionHandle};
use shared::{
    domain::PeerId,
    protocol::{ClientFrame, ServerFrame},
};

mod config;
mod osc;
mod peers;

use config::load_settings;
use peers::Peers;

#[derive(Clone)]
struct AppState {
    session: SessionHandle,
    peers: Arc<Peers>,
    document: Arc<Document>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let document = Document::load(&settings.layout_path).map_err(|error| {
        error!(
            path = %settings.layout_path,
            %error,
            "cannot load layout document"
        );
        error
    })?;
    // A structurally bad document is fatal: the session does not start.
    let layout = Layout::compile(&document)?;

    let osc_socket = Arc::new(tokio::net::UdpSocket::bind(&settings.osc_bind).await?);
    info!(osc_bind = %settings.osc_bind, "osc transport bound");
    let peers = Arc::new(Peers::new(osc_socket.clone()));
    for (name, addr) in &settings.osc_peers {
        match addr.parse() {
            Ok(addr) => peers.register_osc(PeerId::new(name.clone()), addr),
            Err(error) => {
                warn!(peer = %name, %addr, %error, "skipping osc peer with a bad address");
            }
        }
    }

    let session = Session::spawn(&layout, peers.clone());
    let handle = session.handle();
    osc::spawn_bridge(osc_socket, peers.clone(), handle.clone());

    let state = AppState {
        session: handle,
        peers,
        document: Arc::new(document),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "surface server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/layout", get(get_layout))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_layout(State(state): State<Arc<AppState>>) -> Json<Document> {
    Json((*state.document).clone())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message as WsMessage;

    let (mut sender, mut receiver) = socket.split();

    // Handshake: the surface names itself, or gets a minted id.
    let peer_id = loop {
        match receiver.next().await {
            Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Hello { peer_id }) => {
                    break peer_id.map(PeerId::new).unwrap_or_else(PeerId::random);
                }
                Ok(_) | Err(_) => {
                    let frame = ServerFrame::Error {
                        message: "say hello first".into(),
                    };
                    if let Ok(text) = serde_json::to_string(&frame) {
                        if sender.send(WsMessage::Text(text)).await.is_err() {
                            return;
                        }
                    }
                }
            },
            Some(Ok(_)) => continue,
            _ => return,
        }
    };

    let (tx, mut rx) = mpsc::channel::<ServerFrame>(64);
    state.peers.register_surface(peer_id.clone(), tx.clone());
    info!(peer = %peer_id, "surface connected");

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(_) => continue,
            };
            if sender.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Welcome, then full state recall.
    let _ = tx
        .send(ServerFrame::Welcome {
            peer_id: peer_id.clone(),
        })
        .await;
    if let Some(values) = state.session.snapshot().await {
        let _ = tx.send(ServerFrame::StateSnapshot { values }).await;
    }

    while let Some(Ok(message)) = receiver.next().await {
        let WsMessage::Text(text) = message else {
            continue;
        };
        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::Control { message }) => {
                if !state
                    .session
                    .inbound(message, Some(peer_id.clone()))
                    .await
                {
                    break;
                }
            }
            Ok(ClientFrame::Hello { .. }) => {}
            Err(error) => {
                warn!(peer = %peer_id, %error, "bad client frame");
            }
        }
    }

    state.peers.unregister(&peer_id);
    info!(peer = %peer_id, "surface disconnected");
    send_task.abort();
}
