//! Interzept Rule Compiler
//!
//! This crate compiles Interzept rules into the declarative rule format the
//! browser's network layer enforces, and plans the dynamic rule updates
//! that keep the installed set in step with the user's rules.

pub mod ids;
pub mod platform;
pub mod reconciler;
pub mod rules_io;
pub mod translator;

pub use ids::{allocate, AllocError, IdAllocator, IdRange};
pub use platform::{Action, Condition, PlatformRule, ResourceType};
pub use reconciler::{reconcile, ReconcileError, ReconcilePlan, Reconciler};
pub use rules_io::{export_rules, import_rules, import_value, ImportError, ImportReport};
pub use translator::{skip_reason, to_platform_rule, SkipReason, TranslateOptions};
