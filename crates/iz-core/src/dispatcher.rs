//! Interception Dispatcher
//!
//! This is the hot path - every intercepted request goes through here.
//! The result is a pure function of `(rules, url, type)`: enabled rules,
//! optionally narrowed to one type, whose pattern matches the URL, in
//! the order they were defined. The first element wins.

use crate::pattern::PatternCache;
use crate::types::{Rule, RuleType};

/// Matches URLs against a rule list, memoizing compiled patterns.
#[derive(Debug, Default)]
pub struct Dispatcher {
    patterns: PatternCache,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All enabled rules matching `url`, in definition order.
    pub fn find_matching_rules<'r>(
        &self,
        rules: &'r [Rule],
        url: &str,
        rule_type: Option<RuleType>,
    ) -> Vec<&'r Rule> {
        self.matching(rules, url, rule_type).collect()
    }

    /// The rule that decides the response for `url`, if any.
    pub fn first_match<'r>(&self, rules: &'r [Rule], url: &str, rule_type: Option<RuleType>) -> Option<&'r Rule> {
        self.matching(rules, url, rule_type).next()
    }

    fn matching<'r, 's>(
        &'s self,
        rules: &'r [Rule],
        url: &'s str,
        rule_type: Option<RuleType>,
    ) -> impl Iterator<Item = &'r Rule> + 's
    where
        'r: 's,
    {
        rules
            .iter()
            .filter(|rule| rule.enabled)
            .filter(move |rule| rule_type.map_or(true, |ty| rule.rule_type == ty))
            .filter(move |rule| self.patterns.matches(url, &rule.source))
    }

    /// Number of distinct patterns compiled so far.
    pub fn cached_patterns(&self) -> usize {
        self.patterns.len()
    }
}

/// Uncached convenience form of [`Dispatcher::find_matching_rules`].
pub fn find_matching_rules<'r>(rules: &'r [Rule], url: &str, rule_type: Option<RuleType>) -> Vec<&'r Rule> {
    Dispatcher::new().find_matching_rules(rules, url, rule_type)
}
