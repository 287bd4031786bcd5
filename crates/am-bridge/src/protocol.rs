use am_core::types::{AgentTaskStatusMessage, BroadcastPayload};
use serde::{Deserialize, Serialize};

/// Messages carried on the event bus and forwarded verbatim to WebSocket
/// subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum BridgeMessage {
    /// Lifecycle transition of an agent task.
    TaskStatus(AgentTaskStatusMessage),
    /// Free-form project event relayed from a `websocket:broadcast` task.
    Broadcast(BroadcastPayload),
}

impl BridgeMessage {
    pub fn project_guid(&self) -> &str {
        match self {
            BridgeMessage::TaskStatus(m) => &m.project_guid,
            BridgeMessage::Broadcast(b) => &b.project_guid,
        }
    }

    pub fn as_task_status(&self) -> Option<&AgentTaskStatusMessage> {
        match self {
            BridgeMessage::TaskStatus(m) => Some(m),
            BridgeMessage::Broadcast(_) => None,
        }
    }
}

impl From<AgentTaskStatusMessage> for BridgeMessage {
    fn from(msg: AgentTaskStatusMessage) -> Self {
        BridgeMessage::TaskStatus(msg)
    }
}

impl From<BroadcastPayload> for BridgeMessage {
    fn from(payload: BroadcastPayload) -> Self {
        BridgeMessage::Broadcast(payload)
    }
}
