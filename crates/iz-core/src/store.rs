//! In-memory rule snapshot
//!
//! The background process keeps exactly one [`RuleStore`]. Readers take an
//! `Arc` snapshot and never observe a partially updated list: `replace`
//! swaps the whole vector in one assignment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::types::Rule;

/// Shared, wholesale-replaced rule list plus the interception switch.
#[derive(Debug)]
pub struct RuleStore {
    rules: RwLock<Arc<Vec<Rule>>>,
    enabled: AtomicBool,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore {
    /// Empty store with interception enabled.
    pub fn new() -> Self {
        Self::with_rules(Vec::new(), true)
    }

    pub fn with_rules(rules: Vec<Rule>, enabled: bool) -> Self {
        Self {
            rules: RwLock::new(Arc::new(rules)),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<Vec<Rule>> {
        match self.rules.read() {
            Ok(rules) => Arc::clone(&rules),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the whole rule list.
    pub fn replace(&self, rules: Vec<Rule>) {
        let next = Arc::new(rules);
        match self.rules.write() {
            Ok(mut rules) => *rules = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Number of enabled rules of an implemented type.
    pub fn active_count(&self) -> usize {
        self.load().iter().filter(|r| r.is_active()).count()
    }
}
