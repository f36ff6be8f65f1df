//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the document viewer in the
//! browser and the API server.

use ambassador_core::AccrualEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The customer opened a document. Starts the viewing timer.
    Open {
        document_id: String,
        base_points: u32,
    },

    /// The customer closed the viewer.
    Close,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the viewing session started, with the thresholds it will use.
    SessionOpened {
        session_id: Uuid,
        document_id: String,
        duration50: u32,
        duration100: u32,
        milestone50_enabled: bool,
    },

    /// Sent once per second while the document is being watched.
    Progress {
        elapsed_seconds: u32,
        earned_points: u32,
    },

    /// The 50% milestone was reached. Sent at most once per session.
    Milestone50Reached { earned_points: u32 },

    /// The 100% milestone was reached. Sent at most once per session.
    Milestone100Reached { earned_points: u32 },

    /// The outcome of the session's point submission.
    SubmitResult { success: bool, detail: String },

    /// The document was credited recently and cannot earn points yet.
    CooldownActive {
        document_id: String,
        remaining_seconds: u64,
    },

    /// The viewing session ended.
    SessionClosed {
        elapsed_seconds: u32,
        earned_points: u32,
    },

    /// Reports an error to the client, which should display an error message.
    Error { message: String },
}

impl From<AccrualEvent> for ServerMessage {
    fn from(event: AccrualEvent) -> Self {
        match event {
            AccrualEvent::Milestone50Reached { earned_points } => {
                ServerMessage::Milestone50Reached { earned_points }
            }
            AccrualEvent::Milestone100Reached { earned_points } => {
                ServerMessage::Milestone100Reached { earned_points }
            }
            AccrualEvent::SubmitResult { success, detail } => {
                ServerMessage::SubmitResult { success, detail }
            }
        }
    }
}
