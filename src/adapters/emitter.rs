#[cfg(test)]
use std::sync::Mutex;

use log::Level;
use serde_json::Value;

use crate::core::ports::emitter::EmitterPort;

pub struct LogEmitter {
    target: String,
}

impl LogEmitter {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Default for LogEmitter {
    fn default() -> Self {
        Self::new("agent_os")
    }
}

impl EmitterPort for LogEmitter {
    fn emit(&self, level: Level, channel: &str, payload: &Value) {
        log::log!(target: self.target.as_str(), level, "{channel} {payload}");
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub level: Level,
    pub channel: String,
    pub payload: Value,
}

/// Keeps every event in memory.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<EmittedEvent>>,
}

#[cfg(test)]
impl RecordingEmitter {
    pub fn events(&self) -> Vec<EmittedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn channels(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.channel)
            .collect()
    }
}

#[cfg(test)]
impl EmitterPort for RecordingEmitter {
    fn emit(&self, level: Level, channel: &str, payload: &Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(EmittedEvent {
                level,
                channel: channel.to_string(),
                payload: payload.clone(),
            });
        }
    }
}
