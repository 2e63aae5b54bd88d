//! Condition management helpers following Kubernetes API conventions
//!
//! The agent maintains a single `Synced` condition summarising the last
//! reconciliation pass.

use chrono::Utc;

use crate::crd::Condition;

pub const CONDITION_TYPE_SYNCED: &str = "Synced";

pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";
pub const CONDITION_STATUS_UNKNOWN: &str = "Unknown";

pub const REASON_SYNC_SUCCEEDED: &str = "SyncSucceeded";
pub const REASON_SYNC_FAILED: &str = "SyncFailed";

const SYNCED_MESSAGE: &str = "Managed cluster info is synced";

/// Outcome of one probe of a reconciliation pass
///
/// A probe that found nothing to report (for example no enterprise platform
/// object) succeeded; only real failures carry an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub probe: &'static str,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn ok(probe: &'static str) -> Self {
        Self { probe, error: None }
    }

    pub fn failed(probe: &'static str, error: impl std::fmt::Display) -> Self {
        Self {
            probe,
            error: Some(error.to_string()),
        }
    }
}

/// Status, reason and message of the Synced condition
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncVerdict {
    pub status: &'static str,
    pub reason: &'static str,
    pub message: String,
}

/// Fold probe outcomes into one Synced verdict
///
/// Failures are reported in probe order as `probe: error`, joined by `; `.
pub fn aggregate(outcomes: &[ProbeOutcome]) -> SyncVerdict {
    let failures: Vec<String> = outcomes
        .iter()
        .filter_map(|o| o.error.as_ref().map(|e| format!("{}: {}", o.probe, e)))
        .collect();

    if failures.is_empty() {
        SyncVerdict {
            status: CONDITION_STATUS_TRUE,
            reason: REASON_SYNC_SUCCEEDED,
            message: SYNCED_MESSAGE.to_string(),
        }
    } else {
        SyncVerdict {
            status: CONDITION_STATUS_FALSE,
            reason: REASON_SYNC_FAILED,
            message: failures.join("; "),
        }
    }
}

/// Update or add a condition to the conditions list
///
/// The transition time only moves when the status value changes; reason
/// and message are always overwritten. Duplicate entries of the same type
/// are dropped.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) {
    let now = Utc::now().to_rfc3339();

    let mut seen = false;
    conditions.retain(|c| {
        if c.type_ != type_ {
            return true;
        }
        let keep = !seen;
        seen = true;
        keep
    });

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.last_transition_time = now;
        }
        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.observed_generation = observed_generation;
    } else {
        conditions.push(Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            last_transition_time: now,
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation,
        });
    }
}

/// Record `verdict` as the Synced condition
pub fn set_synced(
    conditions: &mut Vec<Condition>,
    verdict: &SyncVerdict,
    observed_generation: Option<i64>,
) {
    set_condition(
        conditions,
        CONDITION_TYPE_SYNCED,
        verdict.status,
        verdict.reason,
        &verdict.message,
        observed_generation,
    );
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Status of the Synced condition, `Unknown` before the first pass
pub fn synced_status(conditions: &[Condition]) -> &str {
    find_condition(conditions, CONDITION_TYPE_SYNCED)
        .map(|c| c.status.as_str())
        .unwrap_or(CONDITION_STATUS_UNKNOWN)
}
