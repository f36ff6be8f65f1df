//! crates/ambassador_core/src/domain.rs
//!
//! Defines the pure, core data structures for the point accrual engine.
//! These structs are independent of any database or transport format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document (or video) the customer wants to view for points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub document_id: String,
    /// Maximum points awardable for a full viewing.
    pub base_points: u32,
}

/// Viewing-time thresholds supplied by the admin configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Seconds required to reach the 50% milestone.
    pub duration50: u32,
    /// Seconds required to reach the 100% milestone.
    pub duration100: u32,
    /// When false only the 100% milestone exists and no partial credit is given.
    pub milestone50_enabled: bool,
    /// Seconds a document stays locked after being credited.
    pub cooldown_secs: u32,
}

impl ThresholdConfig {
    /// Returns a copy where `duration50` never exceeds `duration100`.
    ///
    /// Stored configs are not guaranteed to be valid, so a session always runs
    /// on the normalized form to keep the earned points monotonic.
    pub fn normalized(self) -> Self {
        Self {
            duration50: self.duration50.min(self.duration100),
            ..self
        }
    }

    /// Checks the config an admin is about to store.
    pub fn validate(&self) -> Result<(), String> {
        if self.duration100 == 0 {
            return Err("duration100 must be at least one second".to_string());
        }
        if self.milestone50_enabled && self.duration50 == 0 {
            return Err("duration50 must be at least one second".to_string());
        }
        if self.milestone50_enabled && self.duration50 > self.duration100 {
            return Err(format!(
                "duration50 ({}) must not exceed duration100 ({})",
                self.duration50, self.duration100
            ));
        }
        Ok(())
    }

    /// The fraction of base points unlocked after `elapsed_seconds` of viewing.
    pub fn rate_for(&self, elapsed_seconds: u32) -> TimeRate {
        if elapsed_seconds >= self.duration100 {
            TimeRate::Full
        } else if self.milestone50_enabled && elapsed_seconds >= self.duration50 {
            TimeRate::Half
        } else {
            TimeRate::None
        }
    }
}

/// The fraction of base points awarded for the time spent viewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRate {
    None,
    Half,
    Full,
}

impl TimeRate {
    pub fn as_f64(self) -> f64 {
        match self {
            TimeRate::None => 0.0,
            TimeRate::Half => 0.5,
            TimeRate::Full => 1.0,
        }
    }

    /// `floor(base_points * rate)` in integer arithmetic.
    pub fn apply(self, base_points: u32) -> u32 {
        match self {
            TimeRate::None => 0,
            TimeRate::Half => base_points / 2,
            TimeRate::Full => base_points,
        }
    }
}

/// The record of when a customer was last credited for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewedDocumentEntry {
    pub customer_id: String,
    pub document_id: String,
    pub last_viewed_at: DateTime<Utc>,
}

/// The tuple sent to the remote point API for one viewing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub customer_id: String,
    pub document_id: String,
    pub elapsed_seconds: u32,
    pub time_rate: TimeRate,
    pub base_points: u32,
    pub effective_points: u32,
}

/// Acknowledgement returned by the point API on success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionAck {
    pub reference: Option<String>,
}
