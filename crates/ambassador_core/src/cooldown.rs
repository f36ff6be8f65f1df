//! crates/ambassador_core/src/cooldown.rs
//!
//! Decides whether a previously credited document may be credited again.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Reviewability {
    Reviewable,
    Locked { remaining_seconds: u64 },
}

impl Reviewability {
    pub fn is_reviewable(&self) -> bool {
        matches!(self, Reviewability::Reviewable)
    }
}

/// A document is reviewable once at least `cooldown_secs` have passed since it was
/// last credited. Documents that were never credited are always reviewable.
pub fn check(
    last_viewed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown_secs: u32,
) -> Reviewability {
    let Some(last_viewed_at) = last_viewed_at else {
        return Reviewability::Reviewable;
    };

    let cooldown = Duration::seconds(i64::from(cooldown_secs));
    let elapsed = now.signed_duration_since(last_viewed_at);
    if elapsed >= cooldown {
        return Reviewability::Reviewable;
    }

    // A timestamp in the future never locks for longer than one full cooldown.
    let remaining = (cooldown - elapsed).min(cooldown);
    let remaining_ms = remaining.num_milliseconds().max(0) as u64;
    Reviewability::Locked {
        remaining_seconds: remaining_ms.div_ceil(1000),
    }
}
