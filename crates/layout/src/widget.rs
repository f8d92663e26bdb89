use serde_json::Value as Json;
use tracing::warn;

use shared::{
    domain::{PeerId, WidgetId},
    error::{LayoutError, RangeError},
    protocol::{ArgValue, Value},
};

use crate::{
    address::AddressPattern,
    document::{RawBase, RawExtent, RawOrigin, RawRange, RawWidget},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
    pub min_label: Option<String>,
    pub max_label: Option<String>,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            min_label: None,
            max_label: None,
        }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// How a unit UI position maps onto the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Linear,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extent {
    Px(f64),
    Percent(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frame {
    pub left: Option<Extent>,
    pub top: Option<Extent>,
    pub width: Option<Extent>,
    pub height: Option<Extent>,
}

/// Type-specific widget parameters. Dispatch is always an exhaustive
/// match on this enum.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetKind {
    Knob {
        snap: bool,
        spring: bool,
        angle: Option<f64>,
    },
    Toggle {
        on: f64,
        off: f64,
    },
    Push {
        on: f64,
        off: f64,
        norelease: bool,
    },
    Multifader {
        strips: u32,
        start: i32,
        traversing: bool,
        snap: bool,
    },
    Multitoggle {
        cols: u32,
        rows: u32,
        start: i32,
        traversing: bool,
        on: f64,
        off: f64,
    },
    Keyboard {
        keys: u32,
        start: i32,
        traversing: bool,
        on: f64,
        off: f64,
    },
}

impl WidgetKind {
    pub fn cell_count(&self) -> usize {
        match self {
            Self::Knob { .. } | Self::Toggle { .. } | Self::Push { .. } => 1,
            Self::Multifader { strips, .. } => *strips as usize,
            Self::Multitoggle { cols, rows, .. } => (*cols as usize) * (*rows as usize),
            Self::Keyboard { keys, .. } => *keys as usize,
        }
    }

    /// Matrix-shaped widgets own an ordered grid of independent cells.
    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            Self::Multifader { .. } | Self::Multitoggle { .. } | Self::Keyboard { .. }
        )
    }

    /// First cell token: strip/matrix index base, or the lowest note.
    pub fn start(&self) -> Option<i32> {
        match self {
            Self::Knob { .. } | Self::Toggle { .. } | Self::Push { .. } => None,
            Self::Multifader { start, .. }
            | Self::Multitoggle { start, .. }
            | Self::Keyboard { start, .. } => Some(*start),
        }
    }

    pub fn traversing(&self) -> bool {
        match self {
            Self::Knob { .. } | Self::Toggle { .. } | Self::Push { .. } => false,
            Self::Multifader { traversing, .. }
            | Self::Multitoggle { traversing, .. }
            | Self::Keyboard { traversing, .. } => *traversing,
        }
    }

    /// The two mapped states of on/off-shaped widgets.
    pub fn on_off(&self) -> Option<(f64, f64)> {
        match self {
            Self::Toggle { on, off }
            | Self::Push { on, off, .. }
            | Self::Multitoggle { on, off, .. }
            | Self::Keyboard { on, off, .. } => Some((*on, *off)),
            Self::Knob { .. } | Self::Multifader { .. } => None,
        }
    }
}

/// Immutable schema for one control, compiled from the document at load
/// time. Only the value in the session store mutates afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub id: WidgetId,
    pub kind: WidgetKind,
    pub address: AddressPattern,
    pub pre_args: Vec<ArgValue>,
    pub range: Range,
    /// Resolved at load; `"auto"` becomes `range.min`.
    pub origin: f64,
    pub precision: u32,
    pub scale: Scale,
    pub split: bool,
    /// Declared destination peers; empty means broadcast.
    pub targets: Vec<PeerId>,
    pub frame: Frame,
    pub initial: Option<Value>,
}

impl Widget {
    pub fn cell_count(&self) -> usize {
        self.kind.cell_count()
    }

    pub fn is_vector(&self) -> bool {
        self.kind.is_vector()
    }

    /// Address token for a cell: its index offset by the widget's start
    /// (a note number for keyboards).
    pub fn cell_token(&self, index: usize) -> String {
        let start = self.kind.start().unwrap_or(0);
        (start + index as i32).to_string()
    }

    pub fn cell_for_token(&self, token: &str) -> Option<usize> {
        let start = self.kind.start().unwrap_or(0);
        let number: i32 = token.parse().ok()?;
        let index = number.checked_sub(start)?;
        if index < 0 || index as usize >= self.cell_count() {
            return None;
        }
        Some(index as usize)
    }

    pub fn cell_for_note(&self, note: i32) -> Option<usize> {
        self.cell_for_token(&note.to_string())
    }

    /// Value a widget holds before any interaction or recall: the off
    /// state for on/off widgets, the resolved origin otherwise.
    pub fn default_value(&self) -> Value {
        let cell = match self.kind.on_off() {
            Some((_, off)) => off,
            None => self.origin,
        };
        if self.is_vector() {
            Value::Vector(vec![cell; self.cell_count()])
        } else {
            Value::Scalar(cell)
        }
    }

    pub(crate) fn compile(raw: &RawWidget) -> Result<Self, LayoutError> {
        match raw {
            RawWidget::Knob {
                base,
                range,
                origin,
                log_scale,
                snap,
                spring,
                angle,
            } => {
                let id = required_id(base)?;
                let range = resolve_range(&id, range)?;
                let origin = resolve_origin(&id, origin, &range)?;
                let scale = resolve_scale(&id, *log_scale, &range);
                Self::build(
                    base,
                    id,
                    WidgetKind::Knob {
                        snap: *snap,
                        spring: *spring,
                        angle: *angle,
                    },
                    range,
                    origin,
                    scale,
                    false,
                )
            }
            RawWidget::Toggle { base, on, off } => {
                let id = required_id(base)?;
                let range = on_off_range(*on, *off);
                Self::build(
                    base,
                    id,
                    WidgetKind::Toggle { on: *on, off: *off },
                    range,
                    *off,
                    Scale::Linear,
                    false,
                )
            }
            RawWidget::Push {
                base,
                on,
                off,
                norelease,
            } => {
                let id = required_id(base)?;
                let range = on_off_range(*on, *off);
                Self::build(
                    base,
                    id,
                    WidgetKind::Push {
                        on: *on,
                        off: *off,
                        norelease: *norelease,
                    },
                    range,
                    *off,
                    Scale::Linear,
                    false,
                )
            }
            RawWidget::Multifader {
                base,
                range,
                origin,
                log_scale,
                strips,
                start,
                traversing,
                snap,
                split,
            } => {
                let id = required_id(base)?;
                if *strips == 0 {
                    return Err(LayoutError::EmptyGrid { widget: id });
                }
                let range = resolve_range(&id, range)?;
                let origin = resolve_origin(&id, origin, &range)?;
                let scale = resolve_scale(&id, *log_scale, &range);
                Self::build(
                    base,
                    id,
                    WidgetKind::Multifader {
                        strips: *strips,
                        start: *start,
                        traversing: *traversing,
                        snap: *snap,
                    },
                    range,
                    origin,
                    scale,
                    *split,
                )
            }
            RawWidget::Multitoggle {
                base,
                matrix,
                start,
                traversing,
                on,
                off,
                split,
            } => {
                let id = required_id(base)?;
                let [cols, rows] = *matrix;
                if cols == 0 || rows == 0 {
                    return Err(LayoutError::EmptyGrid { widget: id });
                }
                let range = on_off_range(*on, *off);
                Self::build(
                    base,
                    id,
                    WidgetKind::Multitoggle {
                        cols,
                        rows,
                        start: *start,
                        traversing: *traversing,
                        on: *on,
                        off: *off,
                    },
                    range,
                    *off,
                    Scale::Linear,
                    *split,
                )
            }
            RawWidget::Keyboard {
                base,
                keys,
                start,
                traversing,
                on,
                off,
                split,
            } => {
                let id = required_id(base)?;
                if *keys == 0 {
                    return Err(LayoutError::EmptyGrid { widget: id });
                }
                let range = on_off_range(*on, *off);
                Self::build(
                    base,
                    id,
                    WidgetKind::Keyboard {
                        keys: *keys,
                        start: *start,
                        traversing: *traversing,
                        on: *on,
                        off: *off,
                    },
                    range,
                    *off,
                    Scale::Linear,
                    *split,
                )
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        base: &RawBase,
        id: String,
        kind: WidgetKind,
        range: Range,
        origin: f64,
        scale: Scale,
        split: bool,
    ) -> Result<Self, LayoutError> {
        let address = AddressPattern::compile(&id, &base.address)?;
        let frame = resolve_frame(&id, base)?;
        let cell_count = kind.cell_count();
        let initial = initial_value(&id, &base.value, cell_count);
        Ok(Self {
            id: WidgetId::new(id),
            kind,
            address,
            pre_args: base.pre_args.clone(),
            range,
            origin,
            precision: base.precision,
            scale,
            split,
            targets: base.target.iter().map(PeerId::new).collect(),
            frame,
            initial,
        })
    }
}

fn required_id(base: &RawBase) -> Result<String, LayoutError> {
    base.id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| LayoutError::MissingId {
            address: base.address.clone(),
        })
}

fn resolve_range(widget: &str, raw: &RawRange) -> Result<Range, LayoutError> {
    let (min, min_label) = raw.min.resolve(widget)?;
    let (max, max_label) = raw.max.resolve(widget)?;
    if min > max {
        return Err(LayoutError::InvertedRange {
            widget: widget.to_string(),
            min,
            max,
        });
    }
    Ok(Range {
        min,
        max,
        min_label,
        max_label,
    })
}

fn resolve_origin(widget: &str, raw: &RawOrigin, range: &Range) -> Result<f64, LayoutError> {
    match raw {
        RawOrigin::At(value) => Ok(range.clamp(*value)),
        RawOrigin::Keyword(keyword) if keyword == "auto" => Ok(range.min),
        RawOrigin::Keyword(keyword) => Err(LayoutError::BadOrigin {
            widget: widget.to_string(),
            origin: keyword.clone(),
        }),
    }
}

fn resolve_scale(widget: &str, log_scale: bool, range: &Range) -> Scale {
    if !log_scale {
        return Scale::Linear;
    }
    if range.min > 0.0 && range.max > 0.0 {
        return Scale::Log;
    }
    let error = RangeError::NotPositive {
        min: range.min,
        max: range.max,
    };
    warn!(widget, %error, "falling back to linear scaling");
    Scale::Linear
}

fn resolve_frame(widget: &str, base: &RawBase) -> Result<Frame, LayoutError> {
    Ok(Frame {
        left: resolve_extent(widget, base.left.as_ref())?,
        top: resolve_extent(widget, base.top.as_ref())?,
        width: resolve_extent(widget, base.width.as_ref())?,
        height: resolve_extent(widget, base.height.as_ref())?,
    })
}

fn resolve_extent(widget: &str, raw: Option<&RawExtent>) -> Result<Option<Extent>, LayoutError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw {
        RawExtent::Px(value) => Ok(Some(Extent::Px(*value))),
        RawExtent::Text(text) => {
            let trimmed = text.trim();
            let parsed = match trimmed.strip_suffix('%') {
                Some(percent) => percent.trim().parse().map(Extent::Percent),
                None => trimmed.parse().map(Extent::Px),
            };
            parsed.map(Some).map_err(|_| LayoutError::BadExtent {
                widget: widget.to_string(),
                extent: text.clone(),
            })
        }
    }
}

/// The document's `value` field: a number, an array of one number per
/// cell, or anything else (empty string, null) meaning "no initial".
fn initial_value(widget: &str, raw: &Json, cell_count: usize) -> Option<Value> {
    match raw {
        Json::Number(number) => number.as_f64().map(Value::Scalar),
        Json::Array(items) => {
            let cells: Option<Vec<f64>> = items.iter().map(Json::as_f64).collect();
            match cells {
                Some(cells) if cells.len() == cell_count => Some(Value::Vector(cells)),
                Some(cells) => {
                    warn!(
                        widget,
                        expected = cell_count,
                        actual = cells.len(),
                        "initial value has the wrong cell count, ignoring"
                    );
                    None
                }
                None => None,
            }
        }
        _ => None,
    }
}

fn on_off_range(on: f64, off: f64) -> Range {
    Range::new(on.min(off), on.max(off))
}
