//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-connection viewer state.

use crate::adapters::ThresholdStore;
use crate::config::Config;
use crate::web::viewing_task::ViewerCommand;
use ambassador_core::AccrualEngine;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: AccrualEngine,
    pub thresholds: Arc<dyn ThresholdStore>,
    pub config: Arc<Config>,
}

/// The customer a request acts for, inserted by the `require_customer` middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerId(pub String);

//=========================================================================================
// ViewerState (Specific to One WebSocket Connection)
//=========================================================================================

/// The viewing session currently running on a connection.
pub struct ActiveViewing {
    pub session_id: Uuid,
    pub document_id: String,
    pub commands: mpsc::Sender<ViewerCommand>,
    pub task: JoinHandle<()>,
}

/// The state for a single, active WebSocket connection. At most one document is
/// open at a time.
pub struct ViewerState {
    pub customer_id: String,
    pub active: Option<ActiveViewing>,
}

impl ViewerState {
    pub fn new(customer_id: String) -> Self {
        Self {
            customer_id,
            active: None,
        }
    }

    /// Drops the handle of a session whose task has already finished.
    pub fn reap_finished(&mut self) {
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.task.is_finished())
        {
            self.active = None;
        }
    }
}
