use std::collections::HashMap;

use layout::{Range, Widget};
use shared::{
    domain::WidgetId,
    protocol::{Value, WidgetValue},
};
use tokio::sync::broadcast;
use tracing::warn;

use crate::value;

/// Broadcast on every store mutation. Every current subscriber observes
/// every `set` exactly once.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub widget_id: WidgetId,
    pub value: Value,
    pub previous: Option<Value>,
}

struct Slot {
    range: Range,
    precision: u32,
    default_cell: f64,
    value: Value,
}

/// Process-wide table of widget id to current value: the single point of
/// truth. Every write passes through normalization, so stored values
/// always honor the range/precision invariant. Mirrored widgets (shared
/// id) share one slot.
pub struct SessionStore {
    slots: HashMap<WidgetId, Slot>,
    order: Vec<WidgetId>,
    events: broadcast::Sender<StateChange>,
}

impl SessionStore {
    pub fn new(widgets: &[Widget]) -> Self {
        let (events, _) = broadcast::channel(256);
        let mut slots = HashMap::new();
        let mut order = Vec::new();
        for widget in widgets {
            if slots.contains_key(&widget.id) {
                // Linked mirror: the first registration owns the slot.
                continue;
            }
            let initial = widget
                .initial
                .clone()
                .unwrap_or_else(|| widget.default_value());
            let default_cell = widget
                .kind
                .on_off()
                .map(|(_, off)| off)
                .unwrap_or(widget.origin);
            slots.insert(
                widget.id.clone(),
                Slot {
                    range: widget.range.clone(),
                    precision: widget.precision,
                    default_cell,
                    value: value::normalize_value(&initial, &widget.range, widget.precision),
                },
            );
            order.push(widget.id.clone());
        }
        Self {
            slots,
            order,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    pub(crate) fn sender(&self) -> broadcast::Sender<StateChange> {
        self.events.clone()
    }

    pub fn get(&self, id: &WidgetId) -> Option<&Value> {
        self.slots.get(id).map(|slot| &slot.value)
    }

    /// Widget id to value table in registration order, for state recall.
    pub fn snapshot(&self) -> Vec<WidgetValue> {
        self.order
            .iter()
            .filter_map(|id| {
                self.slots.get(id).map(|slot| WidgetValue {
                    widget_id: id.clone(),
                    value: slot.value.clone(),
                })
            })
            .collect()
    }

    /// Normalize and store a whole value, returning the previous one.
    pub fn set(&mut self, id: &WidgetId, value: Value) -> Option<Value> {
        let Some(slot) = self.slots.get_mut(id) else {
            warn!(widget = %id, "set on unknown widget id");
            return None;
        };
        let normalized = value::normalize_value(&value, &slot.range, slot.precision);
        let previous = std::mem::replace(&mut slot.value, normalized.clone());
        let _ = self.events.send(StateChange {
            widget_id: id.clone(),
            value: normalized,
            previous: Some(previous.clone()),
        });
        Some(previous)
    }

    /// Normalize and store one cell of a vector value. The slot grows to
    /// fit when a larger mirror writes past the registered cell count.
    pub fn set_cell(&mut self, id: &WidgetId, index: usize, raw: f64) -> Option<Value> {
        let Some(slot) = self.slots.get_mut(id) else {
            warn!(widget = %id, "set on unknown widget id");
            return None;
        };
        let cell = value::normalize(raw, &slot.range, slot.precision);
        let previous = slot.value.clone();
        let mut cells = match &slot.value {
            Value::Scalar(current) => vec![*current],
            Value::Vector(current) => current.clone(),
        };
        if index >= cells.len() {
            cells.resize(index + 1, slot.default_cell);
        }
        cells[index] = cell;
        slot.value = match &slot.value {
            Value::Scalar(_) if index == 0 => Value::Scalar(cell),
            _ => Value::Vector(cells),
        };
        let _ = self.events.send(StateChange {
            widget_id: id.clone(),
            value: slot.value.clone(),
            previous: Some(previous.clone()),
        });
        Some(previous)
    }
}
