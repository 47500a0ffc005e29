use std::time::{SystemTime, UNIX_EPOCH};

pub mod health;
pub mod room;
pub mod validation;
pub mod ws;

/// Absolute UNIX timestamp in fractional seconds, as sent to clients.
pub fn to_epoch_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    }
}
