//! Starter rules offered by the editor.

use crate::types::{ResponseHeader, Rule, RuleType, DEFAULT_CONTENT_TYPE};

const NEW_RULE_BODY: &str = "{\n  \"success\": true,\n  \"data\": {}\n}";

/// A named starting point for a new override rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub id: &'static str,
    pub name: &'static str,
    pub source: &'static str,
    pub response_body: &'static str,
    pub description: &'static str,
}

pub const TEMPLATES: &[Template] = &[
    Template {
        id: "api-mock",
        name: "API Mock Response",
        source: "https://api.example.com/*",
        response_body: "{\n  \"success\": true,\n  \"data\": {\n    \"message\": \"Mocked response\"\n  }\n}",
        description: "Mock API responses for testing",
    },
    Template {
        id: "json-override",
        name: "JSON Override",
        source: "*://jsonplaceholder.typicode.com/posts/*",
        response_body: "{\n  \"id\": 999,\n  \"title\": \"Overridden Post\",\n  \"body\": \"This response was intercepted\",\n  \"userId\": 1\n}",
        description: "Override JSON responses",
    },
    Template {
        id: "error-simulation",
        name: "Error Simulation",
        source: "https://api.example.com/error/*",
        response_body: "{\n  \"error\": true,\n  \"message\": \"Simulated API error\",\n  \"code\": 500\n}",
        description: "Simulate API errors",
    },
    Template {
        id: "custom",
        name: "Custom Override",
        source: "",
        response_body: "{\n  \"custom\": true\n}",
        description: "Create from scratch",
    },
];

/// Look up a built-in template.
pub fn template(id: &str) -> Option<&'static Template> {
    TEMPLATES.iter().find(|t| t.id == id)
}

impl Template {
    /// Instantiate as an enabled `overrides` rule.
    pub fn to_rule(&self, id: impl Into<String>) -> Rule {
        let mut rule = Rule::new(id, self.name, RuleType::Overrides, self.source);
        rule.response_code = Some(200);
        rule.response_body = Some(self.response_body.to_string());
        rule.response_headers = Some(vec![ResponseHeader::new("Content-Type", DEFAULT_CONTENT_TYPE)]);
        rule.description = Some(self.description.to_string());
        rule
    }
}

/// The rule the editor starts from when "New Rule" is chosen.
pub fn new_override_rule(id: impl Into<String>) -> Rule {
    let mut rule = Rule::new(id, "New Rule", RuleType::Overrides, "");
    rule.response_code = Some(200);
    rule.response_body = Some(NEW_RULE_BODY.to_string());
    rule.response_headers = Some(vec![ResponseHeader::new("Content-Type", DEFAULT_CONTENT_TYPE)]);
    rule.description = Some(String::new());
    rule
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::matches;

    #[test]
    fn test_templates_have_unique_ids() {
        let mut ids: Vec<&str> = TEMPLATES.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), TEMPLATES.len());
    }

    #[test]
    fn test_template_bodies_are_json() {
        for t in TEMPLATES {
            serde_json::from_str::<serde_json::Value>(t.response_body)
                .unwrap_or_else(|e| panic!("{} body is not JSON: {e}", t.id));
        }
    }

    #[test]
    fn test_template_patterns() {
        let mock = template("json-override").unwrap().to_rule("t1");
        assert!(matches("https://jsonplaceholder.typicode.com/posts/1", &mock.source));
        assert!(mock.is_active());

        // "custom" starts blank and must not match anything until edited
        let custom = template("custom").unwrap().to_rule("t2");
        assert!(!matches("https://example.com/", &custom.source));

        assert!(template("missing").is_none());
    }

    #[test]
    fn test_new_rule_defaults() {
        let rule = new_override_rule("1700000000000");
        assert_eq!(rule.name, "New Rule");
        assert!(rule.enabled);
        assert_eq!(rule.source, "");
        assert_eq!(rule.response_code(), 200);
        assert_eq!(rule.content_type(), "application/json");
        assert!(rule.response_body().contains("\"success\": true"));
    }
}
