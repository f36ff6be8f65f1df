pub mod accrual;
pub mod cooldown;
pub mod domain;
pub mod engine;
pub mod ports;

pub use accrual::{AccrualEvent, SessionPhase, Step, ViewingSession};
pub use cooldown::Reviewability;
pub use domain::{
    DocumentDescriptor, Submission, SubmissionAck, ThresholdConfig, TimeRate, ViewedDocumentEntry,
};
pub use engine::{AccrualEngine, AccrualError, PendingDelivery, SubmitOutcome};
pub use ports::{
    Clock, PortError, PortResult, SubmissionGateway, SystemClock, ThresholdSource, ViewingLedger,
};
