//! crates/ambassador_core/src/engine.rs
//!
//! Ties the viewing session to its ports: opening a session behind the cooldown
//! gate, and delivering a session's single submission to the point API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info, warn};

use crate::accrual::{AccrualEvent, ViewingSession};
use crate::cooldown::{self, Reviewability};
use crate::domain::{DocumentDescriptor, Submission, SubmissionAck, ThresholdConfig};
use crate::ports::{Clock, PortError, SubmissionGateway, ThresholdSource, ViewingLedger};

/// Errors returned when a viewing session cannot be opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccrualError {
    #[error("Document {document_id} is not reviewable for another {remaining_seconds}s")]
    CooldownActive {
        document_id: String,
        remaining_seconds: u64,
    },
    #[error("Points for document {document_id} are still being submitted")]
    SubmissionPending { document_id: String },
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Port error: {0}")]
    Port(#[from] PortError),
}

/// The result of delivering a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The point API accepted the submission.
    Delivered {
        ack: SubmissionAck,
        ledger_updated: bool,
    },
    /// The point API call failed. It is not retried.
    Failed { detail: String },
}

impl SubmitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmitOutcome::Delivered { .. })
    }

    /// The presentation event for this outcome.
    pub fn to_event(&self, submission: &Submission) -> AccrualEvent {
        match self {
            SubmitOutcome::Delivered { ledger_updated, .. } => {
                let mut detail = format!("{} points awarded", submission.effective_points);
                if !ledger_updated {
                    detail.push_str(" (viewing history not saved)");
                }
                AccrualEvent::SubmitResult {
                    success: true,
                    detail,
                }
            }
            SubmitOutcome::Failed { detail } => AccrualEvent::SubmitResult {
                success: false,
                detail: detail.clone(),
            },
        }
    }
}

/// `(customer_id, document_id)` of a submission that has not finished yet.
type DeliveryKey = (String, String);

/// The ports a viewing session needs, injected once at startup.
#[derive(Clone)]
pub struct AccrualEngine {
    thresholds: Arc<dyn ThresholdSource>,
    ledger: Arc<dyn ViewingLedger>,
    gateway: Arc<dyn SubmissionGateway>,
    clock: Arc<dyn Clock>,
    fallback_thresholds: ThresholdConfig,
    in_flight: Arc<Mutex<HashMap<DeliveryKey, usize>>>,
}

/// A submission handed to the point API whose ledger update has not landed yet.
///
/// While it exists, `open` refuses the same customer and document. The claim is
/// released when the delivery finishes or the value is dropped.
pub struct PendingDelivery {
    engine: AccrualEngine,
    submission: Submission,
}

impl PendingDelivery {
    /// Delivers the submission and releases the claim.
    pub async fn finish(self) -> SubmitOutcome {
        self.engine.send_and_record(&self.submission).await
    }
}

impl Drop for PendingDelivery {
    fn drop(&mut self) {
        let key = (
            self.submission.customer_id.clone(),
            self.submission.document_id.clone(),
        );
        let mut in_flight = self.engine.in_flight();
        if let Some(count) = in_flight.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                in_flight.remove(&key);
            }
        }
    }
}

impl AccrualEngine {
    pub fn new(
        thresholds: Arc<dyn ThresholdSource>,
        ledger: Arc<dyn ViewingLedger>,
        gateway: Arc<dyn SubmissionGateway>,
        clock: Arc<dyn Clock>,
        fallback_thresholds: ThresholdConfig,
    ) -> Self {
        Self {
            thresholds,
            ledger,
            gateway,
            clock,
            fallback_thresholds,
            in_flight: Arc::default(),
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<DeliveryKey, usize>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a submission for this document is still being delivered.
    pub fn is_delivering(&self, customer_id: &str, document_id: &str) -> bool {
        self.in_flight()
            .contains_key(&(customer_id.to_string(), document_id.to_string()))
    }

    pub fn ledger(&self) -> &Arc<dyn ViewingLedger> {
        &self.ledger
    }

    /// Reads the thresholds, falling back to the built-in defaults when the
    /// configuration store is unavailable.
    pub async fn current_thresholds(&self) -> ThresholdConfig {
        match self.thresholds.threshold_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!("Threshold config unavailable, using defaults: {}", e);
                self.fallback_thresholds
            }
        }
    }

    /// Whether the customer may currently earn points for the document.
    pub async fn reviewability(
        &self,
        customer_id: &str,
        document_id: &str,
    ) -> Result<Reviewability, PortError> {
        let thresholds = self.current_thresholds().await;
        let last_viewed = self.ledger.last_viewed(customer_id, document_id).await?;
        Ok(cooldown::check(
            last_viewed,
            self.clock.now(),
            thresholds.cooldown_secs,
        ))
    }

    /// Opens a viewing session, refusing documents that are still in cooldown.
    pub async fn open(
        &self,
        customer_id: &str,
        document: DocumentDescriptor,
    ) -> Result<ViewingSession, AccrualError> {
        if customer_id.trim().is_empty() {
            return Err(AccrualError::InvalidDocument(
                "customer id must not be empty".to_string(),
            ));
        }
        if document.document_id.trim().is_empty() {
            return Err(AccrualError::InvalidDocument(
                "document id must not be empty".to_string(),
            ));
        }
        if document.base_points == 0 {
            return Err(AccrualError::InvalidDocument(format!(
                "document {} has no points to award",
                document.document_id
            )));
        }

        if self.is_delivering(customer_id, &document.document_id) {
            return Err(AccrualError::SubmissionPending {
                document_id: document.document_id,
            });
        }

        let thresholds = self.current_thresholds().await;
        let last_viewed = self
            .ledger
            .last_viewed(customer_id, &document.document_id)
            .await?;

        if let Reviewability::Locked { remaining_seconds } =
            cooldown::check(last_viewed, self.clock.now(), thresholds.cooldown_secs)
        {
            return Err(AccrualError::CooldownActive {
                document_id: document.document_id,
                remaining_seconds,
            });
        }

        let session = ViewingSession::new(customer_id.to_string(), document, thresholds);
        info!(
            "Opened viewing session {} for document {}",
            session.id(),
            session.document().document_id
        );
        Ok(session)
    }

    /// Claims the submission's document until the delivery finishes.
    ///
    /// Call this synchronously, before handing the delivery to another task.
    pub fn begin_delivery(&self, submission: Submission) -> PendingDelivery {
        *self
            .in_flight()
            .entry((
                submission.customer_id.clone(),
                submission.document_id.clone(),
            ))
            .or_insert(0) += 1;
        PendingDelivery {
            engine: self.clone(),
            submission,
        }
    }

    /// Sends the submission to the point API and, on success, records the viewing
    /// in the ledger. Never retries.
    pub async fn deliver(&self, submission: &Submission) -> SubmitOutcome {
        self.begin_delivery(submission.clone()).finish().await
    }

    async fn send_and_record(&self, submission: &Submission) -> SubmitOutcome {
        match self.gateway.submit_viewing(submission).await {
            Ok(ack) => {
                let ledger_updated = match self
                    .ledger
                    .set_last_viewed(
                        &submission.customer_id,
                        &submission.document_id,
                        self.clock.now(),
                    )
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        error!(
                            "Points awarded for document {} but the ledger update failed: {}",
                            submission.document_id, e
                        );
                        false
                    }
                };
                info!(
                    "Submitted {} points for document {} (rate {:?})",
                    submission.effective_points, submission.document_id, submission.time_rate
                );
                SubmitOutcome::Delivered {
                    ack,
                    ledger_updated,
                }
            }
            Err(e) => {
                error!(
                    "Point submission for document {} failed: {}",
                    submission.document_id, e
                );
                SubmitOutcome::Failed {
                    detail: e.to_string(),
                }
            }
        }
    }
}
