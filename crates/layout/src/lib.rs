pub mod address;
pub mod document;
pub mod tree;
pub mod widget;

pub use address::AddressPattern;
pub use document::Document;
pub use tree::{Layout, Page};
pub use widget::{Extent, Frame, Range, Scale, Widget, WidgetKind};
