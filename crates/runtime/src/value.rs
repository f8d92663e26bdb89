use layout::{Range, Scale};
use shared::protocol::Value;

/// Round to `precision` fractional digits, half to even, so repeated
/// round-trips through the codec are idempotent.
pub fn quantize(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round_ties_even() / scale
}

/// Clamp into the range and quantize. Quantization can step past a bound
/// finer than the precision grid; the trailing clamp keeps the range
/// invariant either way.
pub fn normalize(value: f64, range: &Range, precision: u32) -> f64 {
    range.clamp(quantize(range.clamp(value), precision))
}

pub fn normalize_value(value: &Value, range: &Range, precision: u32) -> Value {
    match value {
        Value::Scalar(v) => Value::Scalar(normalize(*v, range, precision)),
        Value::Vector(cells) => Value::Vector(
            cells
                .iter()
                .map(|cell| normalize(*cell, range, precision))
                .collect(),
        ),
    }
}

/// Map a unit UI position onto the range: linear interpolation, or an
/// exponential sweep for log-scaled widgets. Log scale requires strictly
/// positive bounds, which load-time compilation already enforced.
pub fn value_from_position(position: f64, range: &Range, scale: Scale) -> f64 {
    let position = if position.is_finite() {
        position.clamp(0.0, 1.0)
    } else {
        0.0
    };
    match scale {
        Scale::Linear => range.min + position * range.span(),
        Scale::Log => range.min * (range.max / range.min).powf(position),
    }
}
