use std::{collections::HashMap, sync::Arc};

use layout::{Layout, Widget, WidgetKind};
use shared::{
    domain::{PeerId, WidgetId},
    protocol::{Message, Value, WidgetValue},
};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    codec::{self, DecodeOutcome, Update},
    router::{self, Router},
    store::{SessionStore, StateChange},
    transport::PeerRegistry,
    value,
};

const QUEUE_DEPTH: usize = 256;

/// One unit of session work. Local surface interaction and inbound
/// network messages funnel into the same ordered queue; each event runs
/// decode, normalize, store, notify, and publish to completion before
/// the next one is pulled.
#[derive(Debug)]
pub enum SessionEvent {
    /// Inbound protocol message, with the peer it came from when known.
    Inbound {
        message: Message,
        source: Option<PeerId>,
    },
    /// Absolute value for a logical control (state recall, scripting).
    SetValue { widget_id: WidgetId, value: Value },
    /// Unit position input from a knob or fader, per cell for strips.
    SetPosition {
        widget_id: WidgetId,
        cell: Option<usize>,
        position: f64,
    },
    /// Pointer down on a control or cell.
    Press {
        widget_id: WidgetId,
        cell: Option<usize>,
    },
    /// Pointer up.
    Release {
        widget_id: WidgetId,
        cell: Option<usize>,
    },
    /// Pointer moved into a cell mid-gesture. Traversing widgets emit
    /// once per newly entered cell, never per pointer sample.
    Drag {
        widget_id: WidgetId,
        cell: usize,
        position: Option<f64>,
    },
    /// Read back the full state table.
    Snapshot {
        reply: oneshot::Sender<Vec<WidgetValue>>,
    },
}

/// Cloneable producer half of the session queue.
#[derive(Clone)]
pub struct SessionHandle {
    queue: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Enqueue an event; false once the session is gone.
    pub async fn submit(&self, event: SessionEvent) -> bool {
        self.queue.send(event).await.is_ok()
    }

    pub async fn inbound(&self, message: Message, source: Option<PeerId>) -> bool {
        self.submit(SessionEvent::Inbound { message, source }).await
    }

    pub async fn snapshot(&self) -> Option<Vec<WidgetValue>> {
        let (reply, rx) = oneshot::channel();
        if !self.submit(SessionEvent::Snapshot { reply }).await {
            return None;
        }
        rx.await.ok()
    }
}

/// A running interpreter for one layout: router, store, and the worker
/// draining the event queue.
pub struct Session {
    queue: mpsc::Sender<SessionEvent>,
    stop: oneshot::Sender<()>,
    events: broadcast::Sender<StateChange>,
    task: JoinHandle<()>,
}

impl Session {
    pub fn spawn(layout: &Layout, peers: Arc<dyn PeerRegistry>) -> Self {
        let router = Router::new(layout);
        let store = SessionStore::new(router.widgets());
        let events = store.sender();
        let (queue, queue_rx) = mpsc::channel(QUEUE_DEPTH);
        let (stop, stop_rx) = oneshot::channel();
        let worker = SessionWorker {
            router,
            store,
            peers,
            gesture_cell: HashMap::new(),
        };
        let task = tokio::spawn(worker.run(queue_rx, stop_rx));
        Self {
            queue,
            stop,
            events,
            task,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            queue: self.queue.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// Stop the session. The event in flight finishes, publish included;
    /// everything still queued is discarded without executing.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        let _ = self.task.await;
    }
}

/// What part of a widget's value an event touched, deciding the outbound
/// encoding.
#[derive(Debug, Clone, Copy)]
enum Emit {
    Whole,
    Cell(usize),
}

struct SessionWorker {
    router: Router,
    store: SessionStore,
    peers: Arc<dyn PeerRegistry>,
    /// Last cell entered per widget during the current gesture.
    gesture_cell: HashMap<WidgetId, usize>,
}

impl SessionWorker {
    async fn run(
        mut self,
        mut queue: mpsc::Receiver<SessionEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                event = queue.recv() => match event {
                    Some(event) => self.process(event).await,
                    None => break,
                },
            }
        }
        // Teardown: drain and discard whatever is still queued.
        queue.close();
        while queue.try_recv().is_ok() {}
    }

    async fn process(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Inbound { message, source } => {
                self.handle_inbound(message, source).await;
            }
            SessionEvent::SetValue { widget_id, value } => {
                let Some(widget) = self.lookup(&widget_id) else {
                    return;
                };
                if self.store.set(&widget.id, value).is_some() {
                    self.forward(&widget, Emit::Whole, None).await;
                }
            }
            SessionEvent::SetPosition {
                widget_id,
                cell,
                position,
            } => {
                let Some(widget) = self.lookup(&widget_id) else {
                    return;
                };
                let raw = value::value_from_position(position, &widget.range, widget.scale);
                match (widget.is_vector(), cell) {
                    (false, _) => {
                        if self.store.set(&widget.id, Value::Scalar(raw)).is_some() {
                            self.forward(&widget, Emit::Whole, None).await;
                        }
                    }
                    (true, Some(index)) if index < widget.cell_count() => {
                        if self.store.set_cell(&widget.id, index, raw).is_some() {
                            self.forward(&widget, Emit::Cell(index), None).await;
                        }
                    }
                    (true, _) => {
                        warn!(widget = %widget.id, "position event on a strip widget needs a cell");
                    }
                }
            }
            SessionEvent::Press { widget_id, cell } => {
                let Some(widget) = self.lookup(&widget_id) else {
                    return;
                };
                self.press(&widget, cell).await;
            }
            SessionEvent::Release { widget_id, cell } => {
                let Some(widget) = self.lookup(&widget_id) else {
                    return;
                };
                self.release(&widget, cell).await;
            }
            SessionEvent::Drag {
                widget_id,
                cell,
                position,
            } => {
                let Some(widget) = self.lookup(&widget_id) else {
                    return;
                };
                self.drag(&widget, cell, position).await;
            }
            SessionEvent::Snapshot { reply } => {
                let _ = reply.send(self.store.snapshot());
            }
        }
    }

    fn lookup(&self, id: &WidgetId) -> Option<Widget> {
        let widget = self.router.widget_by_id(id).cloned();
        if widget.is_none() {
            warn!(widget = %id, "event for unknown widget id");
        }
        widget
    }

    async fn handle_inbound(&mut self, message: Message, source: Option<PeerId>) {
        let matched: Vec<Widget> = self
            .router
            .route(&message.address)
            .into_iter()
            .cloned()
            .collect();
        if matched.is_empty() {
            // Expected outcome for messages addressed elsewhere.
            debug!(address = %message.address, "inbound message matched no widget");
            return;
        }
        // Mirrors sharing the address all take the update within this
        // one event, before the next event is pulled.
        for widget in &matched {
            match codec::decode(widget, &message) {
                Ok(DecodeOutcome::NoMatch) => {}
                Err(error) => {
                    warn!(widget = %widget.id, address = %message.address, %error,
                        "dropping inbound message");
                }
                Ok(DecodeOutcome::Update(update)) => {
                    if let Some(emit) = self.apply(widget, update) {
                        self.forward(widget, emit, source.as_ref()).await;
                    }
                }
            }
        }
    }

    fn apply(&mut self, widget: &Widget, update: Update) -> Option<Emit> {
        match update {
            Update::Scalar(v) => self
                .store
                .set(&widget.id, Value::Scalar(v))
                .map(|_| Emit::Whole),
            Update::Vector(cells) => self
                .store
                .set(&widget.id, Value::Vector(cells))
                .map(|_| Emit::Whole),
            Update::Cell { index, value } => self
                .store
                .set_cell(&widget.id, index, value)
                .map(|_| Emit::Cell(index)),
        }
    }

    async fn press(&mut self, widget: &Widget, cell: Option<usize>) {
        match &widget.kind {
            WidgetKind::Toggle { on, off } => {
                let on_n = value::normalize(*on, &widget.range, widget.precision);
                let current = self
                    .store
                    .get(&widget.id)
                    .and_then(Value::as_scalar)
                    .unwrap_or(on_n);
                let next = if current == on_n { *off } else { *on };
                if self.store.set(&widget.id, Value::Scalar(next)).is_some() {
                    self.forward(widget, Emit::Whole, None).await;
                }
            }
            WidgetKind::Push { on, .. } => {
                if self.store.set(&widget.id, Value::Scalar(*on)).is_some() {
                    self.forward(widget, Emit::Whole, None).await;
                }
            }
            WidgetKind::Multitoggle { on, off, .. } => {
                let Some(index) = cell.filter(|index| *index < widget.cell_count()) else {
                    warn!(widget = %widget.id, "press on a matrix widget needs a cell");
                    return;
                };
                let on_n = value::normalize(*on, &widget.range, widget.precision);
                let current = self
                    .store
                    .get(&widget.id)
                    .and_then(|value| value.cell(index))
                    .unwrap_or_else(|| value::normalize(*off, &widget.range, widget.precision));
                let next = if current == on_n { *off } else { *on };
                self.gesture_cell.insert(widget.id.clone(), index);
                if self.store.set_cell(&widget.id, index, next).is_some() {
                    self.forward(widget, Emit::Cell(index), None).await;
                }
            }
            WidgetKind::Keyboard { on, .. } => {
                let Some(index) = cell.filter(|index| *index < widget.cell_count()) else {
                    warn!(widget = %widget.id, "press on a keyboard needs a key");
                    return;
                };
                self.gesture_cell.insert(widget.id.clone(), index);
                if self.store.set_cell(&widget.id, index, *on).is_some() {
                    self.forward(widget, Emit::Cell(index), None).await;
                }
            }
            WidgetKind::Knob { .. } | WidgetKind::Multifader { .. } => {
                debug!(widget = %widget.id, "press ignored; positions drive this widget");
            }
        }
    }

    async fn release(&mut self, widget: &Widget, cell: Option<usize>) {
        match &widget.kind {
            WidgetKind::Push { off, norelease, .. } => {
                self.store.set(&widget.id, Value::Scalar(*off));
                // norelease: the off transition stays local, subscribers
                // still observe it.
                if !*norelease {
                    self.forward(widget, Emit::Whole, None).await;
                }
            }
            WidgetKind::Keyboard { off, .. } => {
                let released = cell.or_else(|| self.gesture_cell.remove(&widget.id));
                let Some(index) = released.filter(|index| *index < widget.cell_count()) else {
                    return;
                };
                self.gesture_cell.remove(&widget.id);
                if self.store.set_cell(&widget.id, index, *off).is_some() {
                    self.forward(widget, Emit::Cell(index), None).await;
                }
            }
            WidgetKind::Toggle { .. }
            | WidgetKind::Knob { .. }
            | WidgetKind::Multifader { .. }
            | WidgetKind::Multitoggle { .. } => {
                self.gesture_cell.remove(&widget.id);
            }
        }
    }

    async fn drag(&mut self, widget: &Widget, cell: usize, position: Option<f64>) {
        if !widget.kind.traversing() {
            debug!(widget = %widget.id, "drag ignored; widget is not traversing");
            return;
        }
        if cell >= widget.cell_count() {
            return;
        }
        let previous = self.gesture_cell.get(&widget.id).copied();
        let entered = previous != Some(cell);
        match &widget.kind {
            WidgetKind::Multifader { .. } => {
                let Some(position) = position else {
                    return;
                };
                self.gesture_cell.insert(widget.id.clone(), cell);
                let raw = value::value_from_position(position, &widget.range, widget.scale);
                if self.store.set_cell(&widget.id, cell, raw).is_some() {
                    self.forward(widget, Emit::Cell(cell), None).await;
                }
            }
            WidgetKind::Multitoggle { .. } => {
                if entered {
                    self.press(widget, Some(cell)).await;
                }
            }
            WidgetKind::Keyboard { on, off, .. } => {
                if !entered {
                    return;
                }
                // One emission per newly entered key: the key being left
                // releases, the new one sounds.
                let on = *on;
                let off = *off;
                if let Some(left) = previous {
                    if self.store.set_cell(&widget.id, left, off).is_some() {
                        self.forward(widget, Emit::Cell(left), None).await;
                    }
                }
                self.gesture_cell.insert(widget.id.clone(), cell);
                if self.store.set_cell(&widget.id, cell, on).is_some() {
                    self.forward(widget, Emit::Cell(cell), None).await;
                }
            }
            WidgetKind::Knob { .. } | WidgetKind::Toggle { .. } | WidgetKind::Push { .. } => {}
        }
    }

    /// Encode the widget's stored value and deliver it to the declared
    /// targets (or broadcast), skipping the peer an update came from.
    async fn forward(&self, widget: &Widget, emit: Emit, exclude: Option<&PeerId>) {
        let Some(current) = self.store.get(&widget.id) else {
            return;
        };
        let messages = match emit {
            Emit::Whole => codec::encode(widget, current),
            Emit::Cell(index) => {
                let packed = widget.is_vector()
                    && !widget.split
                    && !matches!(widget.kind, WidgetKind::Keyboard { .. });
                if packed {
                    codec::encode(widget, current)
                } else {
                    let cell = current.cell(index).unwrap_or(widget.origin);
                    vec![codec::encode_cell(widget, index, cell)]
                }
            }
        };
        for message in &messages {
            router::publish(message, &widget.targets, exclude, self.peers.as_ref()).await;
        }
    }
}
