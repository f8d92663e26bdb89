use layout::{Widget, WidgetKind};
use shared::{
    error::CodecError,
    protocol::{ArgValue, Message, Value},
};

use crate::value;

/// A decoded inbound update. Values are raw; the session store performs
/// the single normalization pass when it applies them.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Scalar(f64),
    Vector(Vec<f64>),
    Cell { index: usize, value: f64 },
}

/// Outcome of matching one message against one widget. `NoMatch` is the
/// expected result for messages addressed elsewhere, never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    NoMatch,
    Update(Update),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressHit {
    Whole,
    Cell(usize),
}

fn match_address(widget: &Widget, address: &str) -> Option<AddressHit> {
    match widget.address.match_capture(address) {
        Some(None) => Some(AddressHit::Whole),
        Some(Some(token)) => {
            if widget.is_vector() {
                widget.cell_for_token(token).map(AddressHit::Cell)
            } else {
                Some(AddressHit::Whole)
            }
        }
        None => {
            if widget.is_vector() && widget.split {
                let token = widget.address.match_cell_suffix(address)?;
                widget.cell_for_token(token).map(AddressHit::Cell)
            } else {
                None
            }
        }
    }
}

/// Whether an inbound address concerns this widget at all. Patterns were
/// compiled at load time; nothing is re-parsed here besides the inbound
/// address itself.
pub fn admits(widget: &Widget, address: &str) -> bool {
    match_address(widget, address).is_some()
}

fn value_arg(widget: &Widget, value: f64) -> ArgValue {
    if widget.precision == 0 {
        ArgValue::Int(value.round_ties_even() as i32)
    } else {
        ArgValue::Float(value)
    }
}

fn args_with(widget: &Widget, values: &[f64]) -> Vec<ArgValue> {
    let mut args = widget.pre_args.clone();
    args.extend(values.iter().map(|value| value_arg(widget, *value)));
    args
}

fn cell_or_default(widget: &Widget, cells: &[f64], index: usize) -> f64 {
    cells.get(index).copied().unwrap_or_else(|| {
        widget
            .kind
            .on_off()
            .map(|(_, off)| off)
            .unwrap_or(widget.origin)
    })
}

/// Build the outbound message(s) for a widget's full value. Every cell is
/// normalized before encoding, so emitted arguments always honor the
/// range/precision invariant.
pub fn encode(widget: &Widget, current: &Value) -> Vec<Message> {
    let cells: Vec<f64> = current
        .cells()
        .iter()
        .map(|cell| value::normalize(*cell, &widget.range, widget.precision))
        .collect();
    match &widget.kind {
        WidgetKind::Knob { .. } | WidgetKind::Toggle { .. } | WidgetKind::Push { .. } => {
            let scalar = cell_or_default(widget, &cells, 0);
            vec![Message::new(
                widget.address.expand(None),
                args_with(widget, &[scalar]),
            )]
        }
        WidgetKind::Keyboard { .. } => (0..widget.cell_count())
            .map(|index| encode_cell(widget, index, cell_or_default(widget, &cells, index)))
            .collect(),
        WidgetKind::Multifader { .. } | WidgetKind::Multitoggle { .. } => {
            if widget.split {
                (0..widget.cell_count())
                    .map(|index| {
                        Message::new(
                            widget.address.expand(Some(&widget.cell_token(index))),
                            args_with(widget, &[cell_or_default(widget, &cells, index)]),
                        )
                    })
                    .collect()
            } else {
                let mut packed = Vec::with_capacity(widget.cell_count());
                for index in 0..widget.cell_count() {
                    packed.push(cell_or_default(widget, &cells, index));
                }
                vec![Message::new(
                    widget.address.expand(None),
                    args_with(widget, &packed),
                )]
            }
        }
    }
}

/// Message for a single cell transition: split addressing, traversing
/// emissions, and key presses.
pub fn encode_cell(widget: &Widget, index: usize, raw: f64) -> Message {
    let cell = value::normalize(raw, &widget.range, widget.precision);
    match &widget.kind {
        WidgetKind::Keyboard { start, .. } if !widget.split => {
            let mut args = widget.pre_args.clone();
            args.push(ArgValue::Int(start + index as i32));
            args.push(value_arg(widget, cell));
            Message::new(widget.address.expand(None), args)
        }
        WidgetKind::Keyboard { .. }
        | WidgetKind::Multifader { .. }
        | WidgetKind::Multitoggle { .. } => Message::new(
            widget.address.expand(Some(&widget.cell_token(index))),
            args_with(widget, &[cell]),
        ),
        WidgetKind::Knob { .. } | WidgetKind::Toggle { .. } | WidgetKind::Push { .. } => {
            Message::new(widget.address.expand(None), args_with(widget, &[cell]))
        }
    }
}

fn decode_two_state(rest: &[ArgValue], on: f64, off: f64) -> DecodeOutcome {
    match rest {
        [arg] => match arg.as_f64() {
            Some(v) if v == on => DecodeOutcome::Update(Update::Scalar(on)),
            Some(v) if v == off => DecodeOutcome::Update(Update::Scalar(off)),
            // Toggles map exactly two states; anything else is not ours.
            _ => DecodeOutcome::NoMatch,
        },
        _ => DecodeOutcome::NoMatch,
    }
}

fn decode_scalar(rest: &[ArgValue]) -> DecodeOutcome {
    match rest {
        [arg] => arg
            .as_f64()
            .map(|v| DecodeOutcome::Update(Update::Scalar(v)))
            .unwrap_or(DecodeOutcome::NoMatch),
        _ => DecodeOutcome::NoMatch,
    }
}

fn decode_cell(index: usize, rest: &[ArgValue]) -> DecodeOutcome {
    match rest {
        [arg] => arg
            .as_f64()
            .map(|v| DecodeOutcome::Update(Update::Cell { index, value: v }))
            .unwrap_or(DecodeOutcome::NoMatch),
        _ => DecodeOutcome::NoMatch,
    }
}

fn decode_two_state_cell(index: usize, rest: &[ArgValue], on: f64, off: f64) -> DecodeOutcome {
    match decode_two_state(rest, on, off) {
        DecodeOutcome::Update(Update::Scalar(v)) => {
            DecodeOutcome::Update(Update::Cell { index, value: v })
        }
        _ => DecodeOutcome::NoMatch,
    }
}

/// Match one inbound message against one widget. Declared `preArgs` act
/// as a routing discriminant: the message must lead with exactly those
/// literals, which are stripped before the value is read.
pub fn decode(widget: &Widget, message: &Message) -> Result<DecodeOutcome, CodecError> {
    let Some(hit) = match_address(widget, &message.address) else {
        return Ok(DecodeOutcome::NoMatch);
    };

    let pre = &widget.pre_args;
    if message.args.len() < pre.len() || message.args[..pre.len()] != pre[..] {
        return Ok(DecodeOutcome::NoMatch);
    }
    let rest = &message.args[pre.len()..];

    let outcome = match (&widget.kind, hit) {
        (WidgetKind::Knob { .. }, AddressHit::Whole) => decode_scalar(rest),
        (WidgetKind::Toggle { on, off }, AddressHit::Whole)
        | (WidgetKind::Push { on, off, .. }, AddressHit::Whole) => {
            decode_two_state(rest, *on, *off)
        }
        (WidgetKind::Multifader { .. }, AddressHit::Cell(index)) => decode_cell(index, rest),
        (WidgetKind::Multifader { .. }, AddressHit::Whole) => {
            if widget.split {
                DecodeOutcome::NoMatch
            } else {
                return decode_packed(widget, rest, None);
            }
        }
        (WidgetKind::Multitoggle { on, off, .. }, AddressHit::Cell(index)) => {
            decode_two_state_cell(index, rest, *on, *off)
        }
        (WidgetKind::Multitoggle { on, off, .. }, AddressHit::Whole) => {
            if widget.split {
                DecodeOutcome::NoMatch
            } else {
                return decode_packed(widget, rest, Some((*on, *off)));
            }
        }
        (WidgetKind::Keyboard { .. }, AddressHit::Cell(index)) => decode_cell(index, rest),
        (WidgetKind::Keyboard { .. }, AddressHit::Whole) => {
            // (note, velocity) pair addressing.
            if rest.len() != 2 {
                return Err(CodecError::ArityMismatch {
                    expected: 2,
                    actual: rest.len(),
                });
            }
            match (rest[0].as_f64(), rest[1].as_f64()) {
                (Some(note), Some(velocity)) => widget
                    .cell_for_note(note as i32)
                    .map(|index| {
                        DecodeOutcome::Update(Update::Cell {
                            index,
                            value: velocity,
                        })
                    })
                    .unwrap_or(DecodeOutcome::NoMatch),
                _ => DecodeOutcome::NoMatch,
            }
        }
        (
            WidgetKind::Knob { .. } | WidgetKind::Toggle { .. } | WidgetKind::Push { .. },
            AddressHit::Cell(_),
        ) => DecodeOutcome::NoMatch,
    };
    Ok(outcome)
}

fn decode_packed(
    widget: &Widget,
    rest: &[ArgValue],
    two_state: Option<(f64, f64)>,
) -> Result<DecodeOutcome, CodecError> {
    let expected = widget.cell_count();
    if rest.len() != expected {
        return Err(CodecError::ArityMismatch {
            expected,
            actual: rest.len(),
        });
    }
    let mut cells = Vec::with_capacity(expected);
    for arg in rest {
        let Some(v) = arg.as_f64() else {
            return Ok(DecodeOutcome::NoMatch);
        };
        if let Some((on, off)) = two_state {
            if v != on && v != off {
                return Ok(DecodeOutcome::NoMatch);
            }
        }
        cells.push(v);
    }
    Ok(DecodeOutcome::Update(Update::Vector(cells)))
}
