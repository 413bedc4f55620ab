//! Interzept Core Library
//!
//! This crate provides the rule model and request matching engine for the
//! Interzept request interceptor, which answers matching browser requests
//! with user-defined mock responses.
//!
//! # Modules
//!
//! - `types`: The persisted rule model
//! - `pattern`: Wildcard pattern compilation and the pattern cache
//! - `dispatcher`: Ordered rule lookup for a request URL
//! - `store`: Wholesale-replaced in-memory rule snapshot
//! - `intercept`: Live-intercept fallback around a real transport
//! - `url`: Percent encoding and data URLs
//! - `templates`: Starter rules

pub mod dispatcher;
pub mod intercept;
pub mod pattern;
pub mod store;
pub mod templates;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use dispatcher::{find_matching_rules, Dispatcher};
pub use intercept::{FetchRequest, FetchResponse, InterceptStrategy, InterceptingTransport, RuleStoreStrategy, Transport};
pub use pattern::{matches, PatternCache, PatternError};
pub use store::RuleStore;
pub use types::{HeaderOp, HeaderOperation, ResponseHeader, Rule, RuleType};
