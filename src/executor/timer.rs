use crate::error::EngineError;
use crate::value::{Map, Value};
use std::time::Duration;

/// Reads `duration` (seconds) and `repeats` from a timer action.
pub(crate) fn prepare(spec: &Map) -> Result<(Duration, bool), EngineError> {
    let seconds = match spec.get("duration") {
        Some(Value::Int(n)) => *n as f64,
        Some(Value::Float(n)) => *n,
        Some(other) => {
            return Err(EngineError::InvalidTimer(format!(
                "invalid duration {}",
                other.to_json_string()
            )));
        }
        None => return Err(EngineError::InvalidTimer("missing duration".to_string())),
    };
    let delay = Duration::try_from_secs_f64(seconds)
        .map_err(|_| EngineError::InvalidTimer(format!("invalid duration {seconds}")))?;
    let repeats = spec.get("repeats").and_then(Value::as_bool).unwrap_or(false);
    Ok((delay, repeats))
}
