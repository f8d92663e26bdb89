use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use shared::{error::LayoutError, protocol::ArgValue};

pub type Extra = Map<String, Json>;

/// Parsed layout document: an ordered sequence of pages. The document is
/// pure configuration; unknown fields ride through each node's `extra`
/// map untouched so newer documents keep loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    pub pages: Vec<RawPage>,
}

impl Document {
    pub fn parse(text: &str) -> Result<Self, LayoutError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }
}

/// A page or tab. `label` is the only required field; tabs nest
/// recursively and child geometry is independent per node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPage {
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub widgets: Vec<RawWidget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tabs: Vec<RawPage>,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_on() -> f64 {
    1.0
}

fn default_split() -> bool {
    true
}

fn default_note_start() -> i32 {
    60
}

/// The closed widget variant set, dispatched by the document's `type`
/// tag at parse time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RawWidget {
    Knob {
        #[serde(flatten)]
        base: RawBase,
        range: RawRange,
        #[serde(default)]
        origin: RawOrigin,
        #[serde(default, rename = "logScale")]
        log_scale: bool,
        #[serde(default)]
        snap: bool,
        #[serde(default)]
        spring: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        angle: Option<f64>,
    },
    Toggle {
        #[serde(flatten)]
        base: RawBase,
        #[serde(default = "default_on")]
        on: f64,
        #[serde(default)]
        off: f64,
    },
    Push {
        #[serde(flatten)]
        base: RawBase,
        #[serde(default = "default_on")]
        on: f64,
        #[serde(default)]
        off: f64,
        #[serde(default)]
        norelease: bool,
    },
    Multifader {
        #[serde(flatten)]
        base: RawBase,
        range: RawRange,
        #[serde(default)]
        origin: RawOrigin,
        #[serde(default, rename = "logScale")]
        log_scale: bool,
        strips: u32,
        #[serde(default)]
        start: i32,
        #[serde(default)]
        traversing: bool,
        #[serde(default)]
        snap: bool,
        #[serde(default = "default_split")]
        split: bool,
    },
    Multitoggle {
        #[serde(flatten)]
        base: RawBase,
        matrix: [u32; 2],
        #[serde(default)]
        start: i32,
        #[serde(default)]
        traversing: bool,
        #[serde(default = "default_on")]
        on: f64,
        #[serde(default)]
        off: f64,
        #[serde(default = "default_split")]
        split: bool,
    },
    Keyboard {
        #[serde(flatten)]
        base: RawBase,
        keys: u32,
        #[serde(default = "default_note_start")]
        start: i32,
        #[serde(default)]
        traversing: bool,
        #[serde(default = "default_on")]
        on: f64,
        #[serde(default)]
        off: f64,
        #[serde(default)]
        split: bool,
    },
}

impl RawWidget {
    pub fn base(&self) -> &RawBase {
        match self {
            Self::Knob { base, .. }
            | Self::Toggle { base, .. }
            | Self::Push { base, .. }
            | Self::Multifader { base, .. }
            | Self::Multitoggle { base, .. }
            | Self::Keyboard { base, .. } => base,
        }
    }
}

/// Fields common to every widget variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub address: String,
    #[serde(default, rename = "preArgs")]
    pub pre_args: Vec<ArgValue>,
    #[serde(default)]
    pub target: Vec<String>,
    #[serde(default)]
    pub precision: u32,
    #[serde(default, skip_serializing_if = "Json::is_null")]
    pub value: Json,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<RawExtent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<RawExtent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<RawExtent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<RawExtent>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Geometry extent: an absolute number of pixels or a `"NN%"` string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawExtent {
    Px(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRange {
    pub min: RawBound,
    pub max: RawBound,
}

/// A range bound: a plain number, or a single-entry object labelling the
/// number for display (`"max": {"2π": 6.2832}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawBound {
    Number(f64),
    Labelled(Map<String, Json>),
}

impl RawBound {
    /// The numeric bound plus its display label, if any.
    pub fn resolve(&self, widget: &str) -> Result<(f64, Option<String>), LayoutError> {
        match self {
            Self::Number(value) => Ok((*value, None)),
            Self::Labelled(entries) => {
                let mut iter = entries.iter();
                match (iter.next(), iter.next()) {
                    (Some((label, Json::Number(value))), None) => value
                        .as_f64()
                        .map(|value| (value, Some(label.clone())))
                        .ok_or_else(|| LayoutError::BadBound {
                            widget: widget.to_string(),
                        }),
                    _ => Err(LayoutError::BadBound {
                        widget: widget.to_string(),
                    }),
                }
            }
        }
    }
}

/// Bipolar anchor: a numeric origin, or `"auto"` meaning range.min.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawOrigin {
    At(f64),
    Keyword(String),
}

impl Default for RawOrigin {
    fn default() -> Self {
        Self::Keyword("auto".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOB: &str = r#"{
        "type": "knob",
        "id": "freq",
        "left": 0,
        "top": 0,
        "width": 90,
        "height": "50%",
        "color": "auto",
        "range": {"min": 0, "max": 14000},
        "origin": "auto",
        "value": 0,
        "logScale": false,
        "precision": 2,
        "address": "/osc/freq",
        "preArgs": [{"type": "i", "value": 1}],
        "target": []
    }"#;

    #[test]
    fn parses_a_knob_with_pre_args() {
        let widget: RawWidget = serde_json::from_str(KNOB).expect("parse");
        let RawWidget::Knob { base, range, .. } = &widget else {
            panic!("expected knob, got {widget:?}");
        };
        assert_eq!(base.id.as_deref(), Some("freq"));
        assert_eq!(base.pre_args, vec![ArgValue::Int(1)]);
        assert_eq!(range.min.resolve("freq").expect("min").0, 0.0);
        assert_eq!(range.max.resolve("freq").expect("max").0, 14000.0);
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let widget: RawWidget = serde_json::from_str(KNOB).expect("parse");
        assert_eq!(
            widget.base().extra.get("color"),
            Some(&Json::String("auto".to_string()))
        );
        let text = serde_json::to_string(&widget).expect("serialize");
        let reparsed: RawWidget = serde_json::from_str(&text).expect("reparse");
        assert_eq!(
            reparsed.base().extra.get("color"),
            Some(&Json::String("auto".to_string()))
        );
    }

    #[test]
    fn labelled_bounds_resolve_to_their_number() {
        let bound: RawBound = serde_json::from_str(r#"{"2π": 6.2832}"#).expect("parse");
        let (value, label) = bound.resolve("phase").expect("resolve");
        assert_eq!(value, 6.2832);
        assert_eq!(label.as_deref(), Some("2π"));
    }

    #[test]
    fn labelled_bounds_with_extra_entries_are_rejected() {
        let bound: RawBound = serde_json::from_str(r#"{"a": 1, "b": 2}"#).expect("parse");
        assert!(bound.resolve("phase").is_err());
    }

    #[test]
    fn pages_keep_unknown_fields_and_nested_tabs() {
        let text = r#"[
            {"label": "OSC", "theme": "dark", "tabs": [{"label": "1"}, {"label": "2"}]},
            {"label": "ENV"}
        ]"#;
        let document = Document::parse(text).expect("parse");
        assert_eq!(document.pages.len(), 2);
        assert_eq!(document.pages[0].tabs.len(), 2);
        assert_eq!(
            document.pages[0].extra.get("theme"),
            Some(&Json::String("dark".to_string()))
        );
    }
}
