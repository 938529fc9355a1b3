//! Control channel messages.

use serde::{Deserialize, Serialize};

/// Message type that makes a waiting generation take over immediately.
pub const TAKE_OVER: &str = "TAKE_OVER";

/// A message posted to the proxy by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ControlMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    pub fn take_over() -> Self {
        Self::new(TAKE_OVER)
    }

    pub fn is_take_over(&self) -> bool {
        self.kind == TAKE_OVER
    }
}
