use thiserror::Error;

/// Message-level decode failures. These drop the offending message with a
/// warning and never interrupt the event queue.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("expected {expected} packed arguments, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },
}

/// Range/scale combinations that cannot be honored. Non-fatal: the widget
/// falls back to linear scaling.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RangeError {
    #[error("logarithmic scale needs strictly positive bounds, got {min}..{max}")]
    NotPositive { min: f64, max: f64 },
}

/// Structural problems in a layout document. Fatal at load time: the
/// session does not start.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("failed to read layout document: {0}")]
    Io(#[from] std::io::Error),
    #[error("layout document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("widget {widget} has an inverted range: min {min} > max {max}")]
    InvertedRange { widget: String, min: f64, max: f64 },
    #[error("widget {widget} has an empty or malformed address {address:?}")]
    BadAddress { widget: String, address: String },
    #[error("widget at address {address} is missing an id")]
    MissingId { address: String },
    #[error("widget {widget}: range bound must be a number or a single labelled number")]
    BadBound { widget: String },
    #[error("widget {widget}: origin must be a number or \"auto\", got {origin:?}")]
    BadOrigin { widget: String, origin: String },
    #[error("widget {widget}: geometry extent {extent:?} is neither a number nor a percentage")]
    BadExtent { widget: String, extent: String },
    #[error("widget {widget} has no cells: matrix dimensions and key counts must be at least 1")]
    EmptyGrid { widget: String },
    #[error(
        "widgets {first} and {second} declare the literal address {address} with different range or precision"
    )]
    ConflictingAddress {
        address: String,
        first: String,
        second: String,
    },
    #[error("widgets sharing the id {id} disagree on range or precision")]
    ConflictingMirror { id: String },
}
