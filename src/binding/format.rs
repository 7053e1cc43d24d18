//! Pure display formatting for bound fields.
//!
//! Nothing here touches an element; the binder turns these strings into
//! element updates.

use serde_json::Value;

use super::{FieldBinding, Format};

/// Label shown when the LTV signal strength reports its out-of-range
/// sentinel.
pub const OUT_OF_RANGE_LABEL: &str = "NOT IN RANGE";

/// Field whose sentinel value replaces the numeric display.
const SIGNAL_STRENGTH_PATH: &str = "ltv.signal.strength";
const SIGNAL_STRENGTH_SENTINEL: f64 = 1.00;

/// Convert a count of seconds to zero-padded `HH:MM:SS`.
///
/// Hours keep accumulating past 24 (no day wraparound). Fractional seconds
/// are floored; negative or non-finite input renders as `00:00:00`.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

/// Boolean to the procedure status labels.
pub fn format_status(done: bool) -> &'static str {
    if done { "Complete" } else { "Incomplete" }
}

/// Fixed-point rendering of a number.
pub fn format_number(value: f64, decimals: usize) -> String {
    format!("{value:.decimals$}")
}

/// Replacement label for fields that report a sentinel instead of a reading.
pub fn sentinel_override(path: &str, value: Option<&Value>) -> Option<&'static str> {
    if path != SIGNAL_STRENGTH_PATH {
        return None;
    }
    let reading = value?.as_f64()?;
    (reading == SIGNAL_STRENGTH_SENTINEL).then_some(OUT_OF_RANGE_LABEL)
}

/// Render a resolved value as element text for a display binding.
///
/// Missing and `null` values render as the empty string and suppress the
/// unit suffix.
pub fn format_value(binding: &FieldBinding, value: Option<&Value>) -> String {
    let rendered = match value {
        None | Some(Value::Null) => return String::new(),
        Some(Value::Number(n)) => {
            let n = n.as_f64().unwrap_or_default();
            match binding.format {
                Format::Time => format_time(n),
                _ => format_number(n, binding.decimals),
            }
        }
        Some(Value::Bool(b)) => match binding.format {
            Format::Status => format_status(*b).to_string(),
            _ => b.to_string(),
        },
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    match &binding.units {
        Some(units) if !units.is_empty() => format!("{rendered} {units}"),
        _ => rendered,
    }
}
