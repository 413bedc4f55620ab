//! Rule Translator
//!
//! Turns a user [`Rule`] into the declarative rule the platform enforces.
//! The platform cannot rewrite a live response body, so an `overrides`
//! rule becomes a redirect to a `data:` URL carrying the body.
//!
//! The data URL cannot carry a status code: the page always sees a
//! successful load of the synthetic document. `responseCode` only takes
//! effect on the live-intercept path.

use std::fmt;

use iz_core::types::{Rule, RuleType};
use iz_core::url::build_data_url;

use crate::platform::{Action, Condition, PlatformRule, Redirect, ResourceType};

/// Why a rule produced no platform rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    /// The rule type has no implementation yet
    Unsupported(RuleType),
    EmptySource,
    /// The platform only accepts ASCII URL filters
    NonAsciiSource,
    /// `|` and `^` are filter operators on the platform and have no escape
    ReservedFilterChar(char),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("rule is disabled"),
            Self::Unsupported(ty) => write!(f, "'{ty}' rules are not supported yet"),
            Self::EmptySource => f.write_str("source pattern is empty"),
            Self::NonAsciiSource => f.write_str("source pattern contains non-ASCII characters"),
            Self::ReservedFilterChar(ch) => write!(f, "source pattern contains '{ch}', a platform filter operator"),
        }
    }
}

/// Translation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslateOptions {
    /// Resource types each platform rule applies to.
    pub resource_types: ResourceType,
}

impl Default for TranslateOptions {
    /// XHR/fetch only; navigations are left alone.
    fn default() -> Self {
        Self {
            resource_types: ResourceType::XMLHTTPREQUEST,
        }
    }
}

impl TranslateOptions {
    /// Also redirect top-level and frame navigations.
    pub fn with_frames() -> Self {
        Self {
            resource_types: ResourceType::XMLHTTPREQUEST | ResourceType::DOCUMENT,
        }
    }
}

/// Why `rule` would not be installed, or `None` if it would.
pub fn skip_reason(rule: &Rule) -> Option<SkipReason> {
    if !rule.enabled {
        return Some(SkipReason::Disabled);
    }
    if !rule.rule_type.is_implemented() {
        return Some(SkipReason::Unsupported(rule.rule_type));
    }
    if rule.source.is_empty() {
        return Some(SkipReason::EmptySource);
    }
    if !rule.source.is_ascii() {
        return Some(SkipReason::NonAsciiSource);
    }
    if let Some(ch) = rule.source.chars().find(|ch| RESERVED_FILTER_CHARS.contains(ch)) {
        return Some(SkipReason::ReservedFilterChar(ch));
    }
    None
}

/// Characters the platform reads as anchors or separators in a URL filter.
const RESERVED_FILTER_CHARS: [char; 2] = ['|', '^'];

/// Convert a wildcard source into a platform URL filter.
///
/// Platform filters match anywhere in the URL unless anchored with `|`,
/// while sources match the whole URL, so both ends are anchored unless
/// they already start or end with `*`. The platform has no one-character
/// wildcard; `?` is widened to `*`.
pub fn to_url_filter(source: &str) -> String {
    let mut filter = String::with_capacity(source.len() + 2);
    if !source.starts_with('*') {
        filter.push('|');
    }
    filter.extend(source.chars().map(|ch| if ch == '?' { '*' } else { ch }));
    if !source.ends_with('*') {
        filter.push('|');
    }
    filter
}

/// Translate `rule` under the given platform `id` and `priority`.
///
/// Returns `None` when the rule has no platform effect; see [`skip_reason`].
pub fn to_platform_rule(rule: &Rule, id: u32, priority: u32, options: &TranslateOptions) -> Option<PlatformRule> {
    if let Some(reason) = skip_reason(rule) {
        log::debug!("not installing rule '{}' ({}): {}", rule.name, rule.id, reason);
        return None;
    }

    Some(PlatformRule {
        id,
        priority,
        condition: Condition {
            url_filter: to_url_filter(&rule.source),
            resource_types: options.resource_types.names().into_iter().map(String::from).collect(),
        },
        action: Action::Redirect {
            redirect: Redirect {
                url: build_data_url(rule.content_type(), rule.response_body()),
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use iz_core::types::ResponseHeader;
    use iz_core::url::{decode_uri_component, split_data_url};

    use super::*;

    fn users_rule() -> Rule {
        let mut rule = Rule::new("users", "Users", RuleType::Overrides, "*/api/users");
        rule.response_body = Some("{\"ok\":true}".to_string());
        rule.response_code = Some(201);
        rule
    }

    #[test]
    fn test_override_becomes_data_url_redirect() {
        let platform = to_platform_rule(&users_rule(), 1000, 1, &TranslateOptions::default()).unwrap();

        assert_eq!(platform.id, 1000);
        assert_eq!(platform.condition.url_filter, "*/api/users|");
        assert_eq!(platform.condition.resource_types, ["xmlhttprequest"]);

        let url = platform.redirect_url().unwrap();
        let payload = url.strip_prefix("data:application/json,").unwrap();
        assert_eq!(decode_uri_component(payload).as_deref(), Some("{\"ok\":true}"));
    }

    #[test]
    fn test_response_code_is_not_carried() {
        // The data URL path always loads as a success; 201 is lost here
        let platform = to_platform_rule(&users_rule(), 1000, 1, &TranslateOptions::default()).unwrap();
        let json = serde_json::to_string(&platform).unwrap();
        assert!(!json.contains("201"));

        let (media_type, _) = split_data_url(platform.redirect_url().unwrap()).unwrap();
        assert_eq!(media_type, "application/json");
    }

    #[test]
    fn test_content_type_comes_from_headers() {
        let mut rule = users_rule();
        rule.response_headers = Some(vec![ResponseHeader::new("CONTENT-TYPE", "text/html")]);
        rule.response_body = Some("<h1>mock</h1>".to_string());

        let platform = to_platform_rule(&rule, 1000, 1, &TranslateOptions::default()).unwrap();
        assert_eq!(platform.redirect_url(), Some("data:text/html,%3Ch1%3Emock%3C%2Fh1%3E"));
    }

    #[test]
    fn test_default_body() {
        let rule = Rule::new("empty", "Empty", RuleType::Overrides, "https://x.com/a");
        let platform = to_platform_rule(&rule, 1000, 1, &TranslateOptions::default()).unwrap();
        assert_eq!(platform.redirect_url(), Some("data:application/json,%7B%7D"));
        assert_eq!(platform.condition.url_filter, "|https://x.com/a|");
    }

    #[test]
    fn test_frames_policy() {
        let platform = to_platform_rule(&users_rule(), 1000, 1, &TranslateOptions::with_frames()).unwrap();
        assert_eq!(platform.condition.resource_types, ["xmlhttprequest", "main_frame", "sub_frame"]);
    }

    #[test]
    fn test_inactive_rules_are_skipped() {
        let mut disabled = users_rule();
        disabled.enabled = false;
        assert!(to_platform_rule(&disabled, 1000, 1, &TranslateOptions::default()).is_none());
        assert_eq!(skip_reason(&disabled), Some(SkipReason::Disabled));

        for ty in [RuleType::Redirect, RuleType::Headers] {
            let mut rule = users_rule();
            rule.rule_type = ty;
            assert!(to_platform_rule(&rule, 1000, 1, &TranslateOptions::default()).is_none());
            assert_eq!(skip_reason(&rule), Some(SkipReason::Unsupported(ty)));
        }

        let blank = Rule::new("blank", "Blank", RuleType::Overrides, "");
        assert_eq!(skip_reason(&blank), Some(SkipReason::EmptySource));

        let unicode = Rule::new("jp", "JP", RuleType::Overrides, "https://例え.jp/*");
        assert_eq!(skip_reason(&unicode), Some(SkipReason::NonAsciiSource));

        assert_eq!(skip_reason(&users_rule()), None);
    }

    #[test]
    fn test_filter_operators_are_skipped() {
        let cases = [
            ("https://x.com/a|b", '|'),
            ("https://x.com/q?x=a^b", '^'),
            ("||ads.example.com/*", '|'),
        ];
        for (source, ch) in cases {
            let rule = Rule::new("op", "Operator", RuleType::Overrides, source);
            assert_eq!(skip_reason(&rule), Some(SkipReason::ReservedFilterChar(ch)));
            assert!(to_platform_rule(&rule, 1000, 1, &TranslateOptions::default()).is_none());
        }
        assert_eq!(
            SkipReason::ReservedFilterChar('^').to_string(),
            "source pattern contains '^', a platform filter operator"
        );
    }

    #[test]
    fn test_url_filter_anchoring() {
        assert_eq!(to_url_filter("https://api.example.com/*"), "|https://api.example.com/*");
        assert_eq!(to_url_filter("*/api/*"), "*/api/*");
        assert_eq!(to_url_filter("https://x.com/v?/users"), "|https://x.com/v*/users|");
    }

    #[test]
    fn test_skip_reason_messages() {
        assert_eq!(
            SkipReason::Unsupported(RuleType::Redirect).to_string(),
            "'redirect' rules are not supported yet"
        );
    }
}
