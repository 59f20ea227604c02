//! Websocket operation control-channel schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "kebab-case")]
pub enum ControlMessage {
    WindowResize { width: u32, height: u32 },
    Signal { signal: u32 },
}

impl ControlMessage {
    pub fn from_json(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}
