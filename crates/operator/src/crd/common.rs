use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const CONDITION_READY: &str = "Ready";

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

/// A status condition, shaped like the orchestrator's own conditions
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    pub reason: String,
    pub message: String,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: String,
}

impl Condition {
    pub fn new(
        condition_type: &str,
        status: &str,
        reason: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: now.to_rfc3339(),
        }
    }
}

/// Insert or replace the condition of the same type.
///
/// The previous `lastTransitionTime` is kept when the condition's status did
/// not change, so re-asserting an unchanged condition is a no-op.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}
