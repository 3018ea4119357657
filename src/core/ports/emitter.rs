use log::Level;
use serde_json::Value;

/// Sink for lifecycle events raised by the runner and collectors.
pub trait EmitterPort: Send + Sync {
    fn emit(&self, level: Level, channel: &str, payload: &Value);
}
