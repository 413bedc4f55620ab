//! Rule Set Reconciler
//!
//! Computes the single update that makes the installed platform rules
//! equal the translated enabled subset of the desired rules. Every
//! previously installed dynamic rule is removed and the full set is
//! re-added, so the end state never depends on what was there before.
//!
//! Planning is pure and happens before anything is written: if an ID
//! cannot be allocated the whole plan fails and the installed state is
//! left as it was.

use std::collections::{BTreeSet, HashSet};

use iz_core::types::Rule;

use crate::ids::{AllocError, IdAllocator, IdRange};
use crate::platform::PlatformRule;
use crate::translator::{skip_reason, to_platform_rule, SkipReason, TranslateOptions};

/// Error planning a rule set update.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("Cannot assign a platform ID to rule '{rule_id}': {source}")]
    Allocation {
        rule_id: String,
        #[source]
        source: AllocError,
    },
}

/// Platform ID given to a rule during planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAssignment {
    pub rule_id: String,
    pub platform_id: u32,
}

/// A rule that stays uninstalled, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRule {
    pub rule_id: String,
    pub reason: SkipReason,
}

/// The update to hand to the platform in one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_remove: BTreeSet<u32>,
    pub to_add: Vec<PlatformRule>,
    /// One entry per desired rule, in desired order.
    pub assignments: Vec<IdAssignment>,
    pub skipped: Vec<SkippedRule>,
}

impl ReconcilePlan {
    /// IDs installed once the plan is applied.
    pub fn installed_ids(&self) -> BTreeSet<u32> {
        self.to_add.iter().map(|r| r.id).collect()
    }

    /// Write the planned platform IDs back onto the rules they belong to.
    ///
    /// Returns the number of rules whose ID changed.
    pub fn apply_assignments(&self, rules: &mut [Rule]) -> usize {
        let mut changed = 0;
        for (rule, assignment) in rules.iter_mut().zip(&self.assignments) {
            if rule.id != assignment.rule_id {
                continue;
            }
            if rule.platform_id != Some(assignment.platform_id) {
                rule.platform_id = Some(assignment.platform_id);
                changed += 1;
            }
        }
        changed
    }
}

/// Plans rule set updates for one dynamic ID range and translation policy.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    range: IdRange,
    options: TranslateOptions,
}

impl Reconciler {
    pub fn new(range: IdRange, options: TranslateOptions) -> Self {
        Self { range, options }
    }

    pub fn range(&self) -> IdRange {
        self.range
    }

    /// Plan the update from `installed_ids` to `desired`.
    ///
    /// `reserved_ids` are platform IDs owned by rules Interzept does not
    /// manage (packaged or session rules); they are never handed out.
    /// Installed IDs are all being removed and so are free for reuse,
    /// which is what lets a rule keep its ID across passes.
    ///
    /// Rules earlier in `desired` get a strictly higher priority so the
    /// platform resolves overlaps the same way the dispatcher does.
    pub fn reconcile(
        &self,
        desired: &[Rule],
        installed_ids: &BTreeSet<u32>,
        reserved_ids: &HashSet<u32>,
    ) -> Result<ReconcilePlan, ReconcileError> {
        let mut allocator = IdAllocator::new(self.range);
        let mut taken: HashSet<u32> = reserved_ids.clone();

        let mut plan = ReconcilePlan {
            to_remove: installed_ids.clone(),
            ..ReconcilePlan::default()
        };

        let count = desired.len();
        for (index, rule) in desired.iter().enumerate() {
            let id = allocator
                .allocate(&taken, rule.platform_id)
                .map_err(|source| ReconcileError::Allocation {
                    rule_id: rule.id.clone(),
                    source,
                })?;
            taken.insert(id);
            plan.assignments.push(IdAssignment {
                rule_id: rule.id.clone(),
                platform_id: id,
            });

            let priority = (count - index) as u32;
            match to_platform_rule(rule, id, priority, &self.options) {
                Some(platform_rule) => plan.to_add.push(platform_rule),
                None => {
                    if let Some(reason) = skip_reason(rule) {
                        plan.skipped.push(SkippedRule {
                            rule_id: rule.id.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        log::info!(
            "planned rule update: remove {}, add {}, skipped {}",
            plan.to_remove.len(),
            plan.to_add.len(),
            plan.skipped.len()
        );
        Ok(plan)
    }
}

/// Plan with the default range and policy and no reserved IDs.
pub fn reconcile(desired: &[Rule], installed_ids: &BTreeSet<u32>) -> Result<ReconcilePlan, ReconcileError> {
    Reconciler::default().reconcile(desired, installed_ids, &HashSet::new())
}
