//! crates/ambassador_core/src/accrual.rs
//!
//! The per-document viewing session: converts elapsed viewing time into points and
//! guarantees a single submission per session.
//!
//! The session is a plain synchronous state machine. It never performs I/O; every
//! transition returns the submission to deliver (if any) and the events the
//! presentation layer should see. Because `submit` is a `&mut self` method the
//! check-and-set of the submitted state cannot interleave with another caller.

use uuid::Uuid;

use crate::domain::{DocumentDescriptor, Submission, ThresholdConfig, TimeRate};

/// Where a viewing session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Counting seconds. No submission has been issued yet.
    Watching { milestone50_reached: bool },
    /// A submission has been issued for this rate. No further ticks are counted.
    Submitted { rate: TimeRate },
    /// Terminal.
    Closed,
}

/// Outbound notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualEvent {
    /// Carries the half-tier points, even when 100% is crossed on the same tick.
    Milestone50Reached { earned_points: u32 },
    Milestone100Reached { earned_points: u32 },
    SubmitResult { success: bool, detail: String },
}

/// What a single transition produced.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Step {
    pub events: Vec<AccrualEvent>,
    pub submission: Option<Submission>,
}

#[derive(Debug, Clone)]
pub struct ViewingSession {
    id: Uuid,
    customer_id: String,
    document: DocumentDescriptor,
    thresholds: ThresholdConfig,
    elapsed_seconds: u32,
    phase: SessionPhase,
}

impl ViewingSession {
    /// Starts a session. The thresholds are normalized and fixed for the session's lifetime.
    pub fn new(customer_id: String, document: DocumentDescriptor, thresholds: ThresholdConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            document,
            thresholds: thresholds.normalized(),
            elapsed_seconds: 0,
            phase: SessionPhase::Watching {
                milestone50_reached: false,
            },
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn document(&self) -> &DocumentDescriptor {
        &self.document
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn time_rate(&self) -> TimeRate {
        self.thresholds.rate_for(self.elapsed_seconds)
    }

    /// Points unlocked so far: 0, half, or all of the base points.
    pub fn earned_points(&self) -> u32 {
        self.time_rate().apply(self.document.base_points)
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self.phase, SessionPhase::Submitted { .. })
    }

    pub fn is_closed(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    /// Advances the session by one second.
    ///
    /// Crossing the 100% threshold submits immediately; this is the only automatic
    /// submission trigger.
    pub fn tick(&mut self) -> Step {
        let SessionPhase::Watching { milestone50_reached } = self.phase else {
            return Step::default();
        };

        self.elapsed_seconds = self.elapsed_seconds.saturating_add(1);
        let mut step = Step::default();

        if self.thresholds.milestone50_enabled
            && !milestone50_reached
            && self.elapsed_seconds >= self.thresholds.duration50
        {
            self.phase = SessionPhase::Watching {
                milestone50_reached: true,
            };
            step.events.push(AccrualEvent::Milestone50Reached {
                earned_points: TimeRate::Half.apply(self.document.base_points),
            });
        }

        if self.elapsed_seconds >= self.thresholds.duration100 {
            step.events.push(AccrualEvent::Milestone100Reached {
                earned_points: self.earned_points(),
            });
            step.submission = self.submit();
        }

        step
    }

    /// Issues the submission for the current rate, at most once per session.
    ///
    /// Returns `None` when a submission was already issued, when the session is
    /// closed, or when no rewarded threshold has been crossed yet.
    pub fn submit(&mut self) -> Option<Submission> {
        if !matches!(self.phase, SessionPhase::Watching { .. }) {
            return None;
        }

        let rate = self.time_rate();
        if rate == TimeRate::None {
            return None;
        }

        self.phase = SessionPhase::Submitted { rate };
        Some(Submission {
            customer_id: self.customer_id.clone(),
            document_id: self.document.document_id.clone(),
            elapsed_seconds: self.elapsed_seconds,
            time_rate: rate,
            base_points: self.document.base_points,
            effective_points: rate.apply(self.document.base_points),
        })
    }

    /// Ends the session, submitting first if a rewarded threshold was crossed and
    /// nothing has been submitted yet.
    pub fn close(&mut self) -> Option<Submission> {
        let submission = self.submit();
        self.phase = SessionPhase::Closed;
        submission
    }
}
