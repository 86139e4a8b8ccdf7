use indicatif::{HumanBytes, HumanDuration};
use std::time::Duration;

pub fn size(bytes: u64) -> String {
    HumanBytes(bytes).to_string()
}

/// Formats a best-effort size; `None` means it couldn't be measured.
pub fn size_or_unknown(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => size(bytes),
        None => "???".to_string(),
    }
}

pub fn duration(d: Duration) -> String {
    HumanDuration(d).to_string()
}

/// Converts a signed chrono delta, clamping negative values to zero.
pub fn to_std(delta: chrono::Duration) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}
