//! Rule import and export
//!
//! Exports are a pretty-printed JSON array of rules. Imports are lenient
//! per entry: anything that is not a usable rule is dropped and counted,
//! and only a document that is not a JSON array fails outright.

use std::collections::HashSet;

use serde_json::Value;

use iz_core::types::Rule;

/// Error importing a rule document.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid format: expected array of rules")]
    NotAnArray,
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub rules: Vec<Rule>,
    pub imported_count: usize,
    pub discarded: usize,
}

/// Serialize rules as a pretty-printed JSON array.
pub fn export_rules(rules: &[Rule]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(rules)
}

/// Parse an exported rule document.
pub fn import_rules(json: &str) -> Result<ImportReport, ImportError> {
    import_value(serde_json::from_str(json)?)
}

/// Import from an already parsed document.
pub fn import_value(document: Value) -> Result<ImportReport, ImportError> {
    let Value::Array(entries) = document else {
        return Err(ImportError::NotAnArray);
    };

    let mut report = ImportReport::default();
    let mut seen_ids = HashSet::new();

    for (index, entry) in entries.into_iter().enumerate() {
        if !has_required_fields(&entry) {
            log::warn!("import: entry {index} lacks a string id, name or type; discarded");
            report.discarded += 1;
            continue;
        }

        let rule: Rule = match serde_json::from_value(entry) {
            Ok(rule) => rule,
            Err(e) => {
                log::warn!("import: entry {index} is not a valid rule ({e}); discarded");
                report.discarded += 1;
                continue;
            }
        };

        if !seen_ids.insert(rule.id.clone()) {
            log::warn!("import: duplicate rule id '{}' at entry {index}; discarded", rule.id);
            report.discarded += 1;
            continue;
        }

        report.rules.push(rule);
    }

    report.imported_count = report.rules.len();
    Ok(report)
}

fn has_required_fields(entry: &Value) -> bool {
    ["id", "name", "type"]
        .iter()
        .all(|key| entry.get(key).is_some_and(Value::is_string))
}

#[cfg(test)]
mod tests {
    use iz_core::types::RuleType;

    use super::*;

    #[test]
    fn test_discards_entry_missing_type() {
        let json = r#"[
            {"id": "1", "name": "Users", "type": "overrides", "enabled": true, "source": "*/api/users"},
            {"id": "2", "name": "No type", "enabled": true, "source": "*/api/posts"}
        ]"#;

        let report = import_rules(json).unwrap();
        assert_eq!(report.imported_count, 1);
        assert_eq!(report.discarded, 1);
        assert_eq!(report.rules[0].id, "1");
    }

    #[test]
    fn test_rejects_wrong_field_types() {
        let json = r#"[
            {"id": 7, "name": "Numeric id", "type": "overrides"},
            {"id": "8", "name": null, "type": "overrides"},
            {"id": "9", "name": "Bad type", "type": "block"},
            {"id": "10", "name": "Bad code", "type": "overrides", "responseCode": "two hundred"},
            "not an object",
            {"id": "11", "name": "Ok", "type": "headers"}
        ]"#;

        let report = import_rules(json).unwrap();
        assert_eq!(report.imported_count, 1);
        assert_eq!(report.discarded, 5);
        assert_eq!(report.rules[0].rule_type, RuleType::Headers);
        assert!(!report.rules[0].enabled);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let json = r#"[
            {"id": "1", "name": "First", "type": "overrides"},
            {"id": "1", "name": "Second", "type": "overrides"}
        ]"#;
        let report = import_rules(json).unwrap();
        assert_eq!(report.imported_count, 1);
        assert_eq!(report.rules[0].name, "First");
    }

    #[test]
    fn test_document_errors() {
        assert!(matches!(import_rules("{\"id\": \"1\"}"), Err(ImportError::NotAnArray)));
        assert!(matches!(import_rules("[{"), Err(ImportError::Json(_))));
        assert_eq!(import_rules("[]").unwrap().imported_count, 0);
    }

    #[test]
    fn test_export_is_pretty_and_reimportable() {
        let mut rule = Rule::new("1", "Users", RuleType::Overrides, "*/api/users");
        rule.response_body = Some("{\"ok\":true}".to_string());
        rule.platform_id = Some(1000);

        let exported = export_rules(&[rule.clone()]).unwrap();
        assert!(exported.starts_with("[\n  {\n    \"id\": \"1\""));

        let report = import_rules(&exported).unwrap();
        assert_eq!(report.rules, vec![rule]);
    }
}
