//! crates/ambassador_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the point accrual engine.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the database, the remote point API and the system clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Submission, SubmissionAck, ThresholdConfig, ViewedDocumentEntry};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Remote service rejected the request: {0}")]
    Rejected(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Supplies the viewing-time thresholds. Read once per viewing session.
#[async_trait]
pub trait ThresholdSource: Send + Sync {
    async fn threshold_config(&self) -> PortResult<ThresholdConfig>;
}

/// The persisted record of when each document was last credited to a customer.
#[async_trait]
pub trait ViewingLedger: Send + Sync {
    async fn last_viewed(
        &self,
        customer_id: &str,
        document_id: &str,
    ) -> PortResult<Option<DateTime<Utc>>>;

    async fn set_last_viewed(
        &self,
        customer_id: &str,
        document_id: &str,
        at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn entries(&self, customer_id: &str) -> PortResult<Vec<ViewedDocumentEntry>>;

    /// Removes every entry of the customer. Used on logout.
    async fn clear(&self, customer_id: &str) -> PortResult<()>;
}

/// The remote endpoint that awards points for a viewing session.
///
/// Callers invoke it at most once per session; deduplication of retries is the
/// gateway's own concern.
#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    async fn submit_viewing(&self, submission: &Submission) -> PortResult<SubmissionAck>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
