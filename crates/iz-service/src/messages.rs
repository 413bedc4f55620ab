//! Message protocol between the UI surfaces and the background service
//!
//! Requests are JSON objects keyed by an `action` string. Every response
//! is a JSON object; failures use `{success: false, error}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use iz_core::types::{Rule, RuleType};

use crate::error::ServiceError;

/// Actions the background service answers.
pub const KNOWN_ACTIONS: &[&str] = &[
    "getRules",
    "updateRules",
    "toggleInterception",
    "getMatchingRules",
    "getStats",
    "getRuleCount",
    "recordInterception",
    "syncRules",
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    GetRules,
    UpdateRules {
        rules: Vec<Rule>,
    },
    ToggleInterception,
    GetMatchingRules {
        url: String,
        #[serde(default, rename = "type")]
        rule_type: Option<RuleType>,
    },
    GetStats,
    GetRuleCount,
    RecordInterception {
        url: String,
        #[serde(rename = "ruleId")]
        rule_id: String,
    },
    SyncRules,
}

impl Request {
    /// Parse a raw message. Unknown actions are told apart from known
    /// actions with a malformed payload.
    pub fn parse(message: Value) -> Result<Self, ServiceError> {
        let action = message.get("action").and_then(Value::as_str).unwrap_or_default();
        if !KNOWN_ACTIONS.contains(&action) {
            log::warn!("unknown message action '{action}'");
            return Err(ServiceError::UnknownAction);
        }
        serde_json::from_value(message).map_err(|e| ServiceError::InvalidRequest(e.to_string()))
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::GetRules => "getRules",
            Self::UpdateRules { .. } => "updateRules",
            Self::ToggleInterception => "toggleInterception",
            Self::GetMatchingRules { .. } => "getMatchingRules",
            Self::GetStats => "getStats",
            Self::GetRuleCount => "getRuleCount",
            Self::RecordInterception { .. } => "recordInterception",
            Self::SyncRules => "syncRules",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RulesResponse {
    pub rules: Vec<Rule>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateResponse {
    pub success: bool,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToggleResponse {
    pub success: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchingRulesResponse {
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// `{success: false, error}` for a failed request.
pub fn error_response(error: &ServiceError) -> Value {
    json!({ "success": false, "error": error.to_string() })
}
