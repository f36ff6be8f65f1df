pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod viewing_task;
pub mod ws_handler;

// Re-export the handlers the binary needs to build the web server router.
pub use middleware::{require_admin, require_customer};
pub use rest::{
    document_status_handler, get_thresholds_handler, health_handler, list_ledger_handler,
    reset_ledger_handler, update_thresholds_handler,
};
pub use ws_handler::ws_handler;
