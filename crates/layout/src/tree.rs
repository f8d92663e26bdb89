use std::collections::HashMap;

use shared::{domain::WidgetId, error::LayoutError};

use crate::{
    document::{Document, RawPage},
    widget::Widget,
};

/// A compiled page or tab: label, its widgets, then nested tabs.
#[derive(Debug, Clone)]
pub struct Page {
    pub label: String,
    pub widgets: Vec<Widget>,
    pub tabs: Vec<Page>,
}

impl Page {
    fn compile(raw: &RawPage) -> Result<Self, LayoutError> {
        let widgets = raw
            .widgets
            .iter()
            .map(Widget::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let tabs = raw
            .tabs
            .iter()
            .map(Page::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            label: raw.label.clone(),
            widgets,
            tabs,
        })
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Widget>) {
        out.extend(self.widgets.iter());
        for tab in &self.tabs {
            tab.collect(out);
        }
    }
}

/// The compiled layout tree. Shape is immutable for the session; only
/// widget values change, and those live in the session store.
#[derive(Debug, Clone)]
pub struct Layout {
    pub pages: Vec<Page>,
}

impl Layout {
    pub fn compile(document: &Document) -> Result<Self, LayoutError> {
        let pages = document
            .pages
            .iter()
            .map(Page::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let layout = Self { pages };
        layout.validate()?;
        Ok(layout)
    }

    /// All widgets in depth-first document order: a node's own widgets,
    /// then its tabs. This order is the router's insertion order.
    pub fn widgets(&self) -> Vec<&Widget> {
        let mut out = Vec::new();
        for page in &self.pages {
            page.collect(&mut out);
        }
        out
    }

    /// First widget carrying `id` in depth-first order. Widgets sharing
    /// an id are linked mirrors of one logical control.
    pub fn find(&self, id: &WidgetId) -> Option<&Widget> {
        self.widgets().into_iter().find(|widget| &widget.id == id)
    }

    fn validate(&self) -> Result<(), LayoutError> {
        let widgets = self.widgets();

        // Two widgets on the same literal address must agree on range and
        // precision, otherwise inbound updates would be ambiguous. The
        // document is rejected instead of silently picking one.
        let mut by_address: HashMap<&str, &Widget> = HashMap::new();
        for widget in &widgets {
            if !widget.address.is_literal() {
                continue;
            }
            match by_address.get(widget.address.raw()) {
                Some(first) if first.range != widget.range || first.precision != widget.precision => {
                    return Err(LayoutError::ConflictingAddress {
                        address: widget.address.raw().to_string(),
                        first: first.id.to_string(),
                        second: widget.id.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    by_address.insert(widget.address.raw(), widget);
                }
            }
        }

        // Widgets sharing an id share one store slot; their value
        // semantics must line up.
        let mut by_id: HashMap<&WidgetId, &Widget> = HashMap::new();
        for widget in &widgets {
            match by_id.get(&widget.id) {
                Some(first) if first.range != widget.range || first.precision != widget.precision => {
                    return Err(LayoutError::ConflictingMirror {
                        id: widget.id.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    by_id.insert(&widget.id, widget);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(text: &str) -> Result<Layout, LayoutError> {
        Layout::compile(&Document::parse(text).expect("document"))
    }

    #[test]
    fn widgets_iterate_depth_first() {
        let layout = compile(
            r#"[
                {"label": "A", "widgets": [
                    {"type": "push", "id": "a1", "address": "/a1"}
                ]},
                {"label": "B", "widgets": [
                    {"type": "push", "id": "b1", "address": "/b1"}
                ], "tabs": [
                    {"label": "B1", "widgets": [
                        {"type": "push", "id": "b2", "address": "/b2"}
                    ]},
                    {"label": "B2", "widgets": [
                        {"type": "push", "id": "b3", "address": "/b3"}
                    ]}
                ]}
            ]"#,
        )
        .expect("layout");
        let order: Vec<&str> = layout
            .widgets()
            .iter()
            .map(|widget| widget.id.as_str())
            .collect();
        assert_eq!(order, ["a1", "b1", "b2", "b3"]);
    }

    #[test]
    fn identical_literal_addresses_with_matching_semantics_are_mirrors() {
        let layout = compile(
            r#"[
                {"label": "A", "widgets": [
                    {"type": "toggle", "id": "x", "address": "/mute", "on": 1, "off": 0},
                    {"type": "toggle", "id": "y", "address": "/mute", "on": 1, "off": 0}
                ]}
            ]"#,
        );
        assert!(layout.is_ok());
    }

    #[test]
    fn conflicting_literal_addresses_are_rejected() {
        let result = compile(
            r#"[
                {"label": "A", "widgets": [
                    {"type": "knob", "id": "x", "address": "/freq",
                     "range": {"min": 0, "max": 100}, "precision": 2},
                    {"type": "knob", "id": "y", "address": "/freq",
                     "range": {"min": 0, "max": 200}, "precision": 2}
                ]}
            ]"#,
        );
        assert!(matches!(
            result,
            Err(LayoutError::ConflictingAddress { .. })
        ));
    }

    #[test]
    fn shared_ids_must_agree_on_range_and_precision() {
        let result = compile(
            r#"[
                {"label": "A", "widgets": [
                    {"type": "knob", "id": "amp", "address": "/a",
                     "range": {"min": 0, "max": 1}, "precision": 2}
                ]},
                {"label": "B", "widgets": [
                    {"type": "knob", "id": "amp", "address": "/b",
                     "range": {"min": 0, "max": 1}, "precision": 4}
                ]}
            ]"#,
        );
        assert!(matches!(result, Err(LayoutError::ConflictingMirror { .. })));
    }

    #[test]
    fn compiles_the_reference_document_shape() {
        let layout = compile(
            r#"[
                {"label": "KEYB", "widgets": [
                    {"type": "keyboard", "id": "keyboard", "address": "/note",
                     "precision": 1, "keys": 24, "start": 60, "traversing": true,
                     "on": 1, "off": 0, "split": false}
                ]},
                {"label": "OSC", "widgets": [], "tabs": [
                    {"label": "1", "widgets": [
                        {"type": "knob", "id": "freq", "address": "/osc/freq",
                         "range": {"min": 0, "max": 14000}, "origin": "auto",
                         "precision": 2, "preArgs": [{"type": "i", "value": 1}]},
                        {"type": "keyboard", "id": "keyboard", "address": "/note",
                         "precision": 1, "keys": 18, "start": 60, "traversing": true,
                         "on": 1, "off": 0, "split": false}
                    ]},
                    {"label": "2"}
                ]},
                {"label": "ENV"}
            ]"#,
        )
        .expect("layout");
        assert_eq!(layout.widgets().len(), 3);
        // The two keyboards are mirrors of one logical control even
        // though their key counts differ.
        let keyboard = layout.find(&"keyboard".into()).expect("keyboard");
        assert_eq!(keyboard.cell_count(), 24);
    }
}
