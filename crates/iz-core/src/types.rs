//! Core type definitions for Interzept
//!
//! These types are the persisted rule model shared by the UI, the
//! background process and the platform rule compiler. Field names follow
//! the JSON the extension stores, so a rule exported by the UI
//! deserializes here unchanged.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Status reported by a fabricated response when the rule sets none.
pub const DEFAULT_RESPONSE_CODE: u16 = 200;
/// Payload substituted when the rule sets none.
pub const DEFAULT_RESPONSE_BODY: &str = "{}";
/// Content type used when `responseHeaders` carries no `Content-Type`.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

// =============================================================================
// Rule Types
// =============================================================================

/// Kind of interception a rule performs.
///
/// Only `Overrides` has an effect today. `Redirect` and `Headers` are kept
/// in the model so the UI can store them, but nothing installs or acts on
/// them until their semantics are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    /// Substitute a fabricated response
    Overrides,
    /// Rewrite the request URL (not implemented)
    Redirect,
    /// Add, modify or remove headers (not implemented)
    Headers,
}

impl RuleType {
    /// Whether rules of this type produce any interception effect.
    pub fn is_implemented(self) -> bool {
        matches!(self, Self::Overrides)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overrides => "overrides",
            Self::Redirect => "redirect",
            Self::Headers => "headers",
        }
    }

    /// Parse the persisted type name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "overrides" => Some(Self::Overrides),
            "redirect" => Some(Self::Redirect),
            "headers" => Some(Self::Headers),
            _ => None,
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Headers
// =============================================================================

/// A header on a fabricated response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub name: String,
    pub value: String,
}

impl ResponseHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Operation applied by a `headers` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderOp {
    Add,
    Modify,
    Remove,
}

/// A header mutation for `headers` rules (stored, never applied).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeaderOperation {
    pub name: String,
    #[serde(default)]
    pub value: String,
    pub operation: HeaderOp,
}

// =============================================================================
// Rule
// =============================================================================

/// A user-authored interception directive.
///
/// `id` is the human-facing identity and never changes once assigned.
/// `platform_id` is the identity of the installed platform rule; it is
/// filled in by reconciliation and persisted so later passes keep it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Vec<ResponseHeader>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<HeaderOperation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<u32>,
}

impl Rule {
    /// Create an enabled rule with no response fields set.
    pub fn new(id: impl Into<String>, name: impl Into<String>, rule_type: RuleType, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rule_type,
            enabled: true,
            source: source.into(),
            destination: None,
            response_code: None,
            response_body: None,
            response_headers: None,
            headers: None,
            description: None,
            platform_id: None,
        }
    }

    /// Status code to report, defaulting to 200.
    pub fn response_code(&self) -> u16 {
        self.response_code.unwrap_or(DEFAULT_RESPONSE_CODE)
    }

    /// Response payload, defaulting to `{}`.
    pub fn response_body(&self) -> &str {
        self.response_body.as_deref().unwrap_or(DEFAULT_RESPONSE_BODY)
    }

    /// Response headers in order, defaulting to a single JSON content type.
    pub fn response_headers(&self) -> Cow<'_, [ResponseHeader]> {
        match &self.response_headers {
            Some(headers) => Cow::Borrowed(headers.as_slice()),
            None => Cow::Owned(vec![ResponseHeader::new("Content-Type", DEFAULT_CONTENT_TYPE)]),
        }
    }

    /// Case-insensitive `Content-Type` lookup.
    pub fn content_type(&self) -> &str {
        self.response_headers
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("content-type"))
            .map(|h| h.value.trim())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Whether this rule may install or fire at all.
    pub fn is_active(&self) -> bool {
        self.enabled && self.rule_type.is_implemented()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_defaults() {
        let rule = Rule::new("r1", "Users", RuleType::Overrides, "*/api/users");
        assert_eq!(rule.response_code(), 200);
        assert_eq!(rule.response_body(), "{}");
        assert_eq!(rule.content_type(), "application/json");
        assert_eq!(rule.response_headers().len(), 1);
        assert_eq!(rule.response_headers()[0].name, "Content-Type");
    }

    #[test]
    fn test_content_type_lookup_ignores_case() {
        let mut rule = Rule::new("r1", "Users", RuleType::Overrides, "*");
        rule.response_headers = Some(vec![
            ResponseHeader::new("X-Mock", "1"),
            ResponseHeader::new("content-TYPE", "text/plain"),
        ]);
        assert_eq!(rule.content_type(), "text/plain");

        rule.response_headers = Some(vec![ResponseHeader::new("X-Mock", "1")]);
        assert_eq!(rule.content_type(), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_serde_uses_extension_field_names() {
        let json = r#"{
            "id": "1700000000000",
            "name": "Users",
            "type": "overrides",
            "enabled": true,
            "source": "*/api/users",
            "responseCode": 201,
            "responseBody": "{\"ok\":true}",
            "responseHeaders": [{"name": "Content-Type", "value": "application/json"}]
        }"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.rule_type, RuleType::Overrides);
        assert_eq!(rule.response_code, Some(201));
        assert_eq!(rule.platform_id, None);

        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["type"], "overrides");
        assert_eq!(value["responseCode"], 201);
        assert!(value.get("platformId").is_none());
        assert!(value.get("destination").is_none());
    }

    #[test]
    fn test_only_overrides_are_implemented() {
        assert!(RuleType::Overrides.is_implemented());
        assert!(!RuleType::Redirect.is_implemented());
        assert!(!RuleType::Headers.is_implemented());

        let mut rule = Rule::new("r1", "Redirect", RuleType::Redirect, "*");
        assert!(!rule.is_active());
        rule.rule_type = RuleType::Overrides;
        rule.enabled = false;
        assert!(!rule.is_active());
    }

    #[test]
    fn test_rule_type_names() {
        for ty in [RuleType::Overrides, RuleType::Redirect, RuleType::Headers] {
            assert_eq!(RuleType::from_name(ty.as_str()), Some(ty));
        }
        assert_eq!(RuleType::from_name("block"), None);
    }
}
