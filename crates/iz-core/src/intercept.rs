//! Live-intercept fallback
//!
//! The platform rule path cannot report a custom status code. Where the
//! host can wrap its own network primitive, the page-side shim routes each
//! request through an [`InterceptingTransport`]: a decorator over the real
//! [`Transport`] that asks an [`InterceptStrategy`] whether to answer with
//! a fabricated response instead.
//!
//! Wrapping is explicit: nothing is intercepted until [`install`] and the
//! inner transport is used untouched again after [`uninstall`].
//!
//! [`install`]: InterceptingTransport::install
//! [`uninstall`]: InterceptingTransport::uninstall

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::store::RuleStore;
use crate::types::{ResponseHeader, Rule, RuleType};

// =============================================================================
// Requests and Responses
// =============================================================================

/// An outgoing request as seen by the shim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
        }
    }
}

/// A response handed back to page code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<ResponseHeader>,
    pub body: String,
    /// Set when the response was fabricated from a rule.
    pub rule_id: Option<String>,
}

impl FetchResponse {
    /// Fabricate the response an `overrides` rule describes.
    pub fn from_rule(rule: &Rule) -> Self {
        let status = rule.response_code();
        Self {
            status,
            status_text: if status == 200 { "OK" } else { "Intercepted" }.to_string(),
            headers: rule.response_headers().into_owned(),
            body: rule.response_body().to_string(),
            rule_id: Some(rule.id.clone()),
        }
    }

    pub fn is_intercepted(&self) -> bool {
        self.rule_id.is_some()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// Decides whether a URL should be answered locally.
pub trait InterceptStrategy {
    fn should_intercept(&self, url: &str) -> Option<Rule>;
}

/// Strategy backed by the shared [`RuleStore`].
///
/// Only `overrides` rules are considered; other types have no live effect.
#[derive(Debug, Clone)]
pub struct RuleStoreStrategy {
    store: Arc<RuleStore>,
    dispatcher: Arc<Dispatcher>,
}

impl RuleStoreStrategy {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self::with_dispatcher(store, Arc::new(Dispatcher::new()))
    }

    pub fn with_dispatcher(store: Arc<RuleStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { store, dispatcher }
    }
}

impl InterceptStrategy for RuleStoreStrategy {
    fn should_intercept(&self, url: &str) -> Option<Rule> {
        if !self.store.is_enabled() {
            return None;
        }
        let rules = self.store.load();
        self.dispatcher
            .first_match(&rules, url, Some(RuleType::Overrides))
            .cloned()
    }
}

impl<S: InterceptStrategy + ?Sized> InterceptStrategy for Arc<S> {
    fn should_intercept(&self, url: &str) -> Option<Rule> {
        (**self).should_intercept(url)
    }
}

// =============================================================================
// Transport
// =============================================================================

/// The real network primitive being wrapped.
pub trait Transport {
    type Error;

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Self::Error>;
}

/// Decorates a [`Transport`] with rule-based interception.
#[derive(Debug)]
pub struct InterceptingTransport<T, S> {
    inner: T,
    strategy: S,
    installed: AtomicBool,
    intercepted: AtomicU64,
}

impl<T, S> InterceptingTransport<T, S>
where
    T: Transport,
    S: InterceptStrategy,
{
    /// Wrap `inner`. Interception starts uninstalled.
    pub fn new(inner: T, strategy: S) -> Self {
        Self {
            inner,
            strategy,
            installed: AtomicBool::new(false),
            intercepted: AtomicU64::new(0),
        }
    }

    /// Start answering matching requests locally. Idempotent.
    pub fn install(&self) {
        if !self.installed.swap(true, Ordering::AcqRel) {
            log::debug!("request interception installed");
        }
    }

    /// Restore pass-through behaviour. Idempotent.
    pub fn uninstall(&self) {
        if self.installed.swap(false, Ordering::AcqRel) {
            log::debug!("request interception uninstalled");
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Number of requests answered from a rule since creation.
    pub fn intercepted_count(&self) -> u64 {
        self.intercepted.load(Ordering::Relaxed)
    }

    pub fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, T::Error> {
        if self.is_installed() {
            if let Some(rule) = self.strategy.should_intercept(&request.url) {
                log::debug!("intercepting {} {} with rule '{}'", request.method, request.url, rule.name);
                self.intercepted.fetch_add(1, Ordering::Relaxed);
                return Ok(FetchResponse::from_rule(&rule));
            }
        }
        self.inner.fetch(request)
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T, S> Transport for InterceptingTransport<T, S>
where
    T: Transport,
    S: InterceptStrategy,
{
    type Error = T::Error;

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Self::Error> {
        InterceptingTransport::fetch(self, request)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct Upstream {
        calls: Cell<usize>,
    }

    impl Transport for Upstream {
        type Error = String;

        fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, String> {
            self.calls.set(self.calls.get() + 1);
            Ok(FetchResponse {
                status: 200,
                status_text: "OK".to_string(),
                headers: Vec::new(),
                body: format!("live:{}", request.url),
                rule_id: None,
            })
        }
    }

    fn users_rule() -> Rule {
        let mut rule = Rule::new("users", "Users", RuleType::Overrides, "*/api/users");
        rule.response_code = Some(201);
        rule.response_body = Some("{\"ok\":true}".to_string());
        rule.response_headers = Some(vec![
            ResponseHeader::new("Content-Type", "application/json"),
            ResponseHeader::new("X-Mocked", "yes"),
        ]);
        rule
    }

    fn transport(rules: Vec<Rule>) -> (Arc<RuleStore>, InterceptingTransport<Upstream, RuleStoreStrategy>) {
        let store = Arc::new(RuleStore::with_rules(rules, true));
        let upstream = Upstream { calls: Cell::new(0) };
        let transport = InterceptingTransport::new(upstream, RuleStoreStrategy::new(Arc::clone(&store)));
        (store, transport)
    }

    #[test]
    fn test_fabricates_status_headers_and_body() {
        let (_store, transport) = transport(vec![users_rule()]);
        transport.install();

        let response = transport.fetch(&FetchRequest::get("https://x.com/v1/api/users")).unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.status_text, "Intercepted");
        assert_eq!(response.body, "{\"ok\":true}");
        assert_eq!(response.header("x-mocked"), Some("yes"));
        assert_eq!(response.headers[0].name, "Content-Type");
        assert_eq!(response.rule_id.as_deref(), Some("users"));
        assert_eq!(transport.inner().calls.get(), 0);
        assert_eq!(transport.intercepted_count(), 1);
    }

    #[test]
    fn test_defaults_to_ok() {
        let rule = Rule::new("plain", "Plain", RuleType::Overrides, "*");
        let response = FetchResponse::from_rule(&rule);
        assert_eq!(response.status, 200);
        assert_eq!(response.status_text, "OK");
        assert_eq!(response.body, "{}");
        assert_eq!(response.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_passes_through_until_installed() {
        let (_store, transport) = transport(vec![users_rule()]);

        let response = transport.fetch(&FetchRequest::get("https://x.com/api/users")).unwrap();
        assert!(!response.is_intercepted());
        assert_eq!(transport.inner().calls.get(), 1);

        transport.install();
        assert!(transport.fetch(&FetchRequest::get("https://x.com/api/users")).unwrap().is_intercepted());

        transport.uninstall();
        assert!(!transport.is_installed());
        let response = transport.fetch(&FetchRequest::get("https://x.com/api/users")).unwrap();
        assert_eq!(response.body, "live:https://x.com/api/users");
        assert_eq!(transport.inner().calls.get(), 2);
    }

    #[test]
    fn test_unimplemented_types_pass_through() {
        let mut redirect = Rule::new("redirect", "Redirect", RuleType::Redirect, "*/api/users");
        redirect.destination = Some("https://mock.local/$1".to_string());
        let (_store, transport) = transport(vec![redirect]);
        transport.install();

        let response = transport.fetch(&FetchRequest::get("https://x.com/api/users")).unwrap();
        assert!(!response.is_intercepted());
        assert_eq!(transport.inner().calls.get(), 1);
    }

    #[test]
    fn test_store_switch_and_replacement_apply_immediately() {
        let (store, transport) = transport(vec![users_rule()]);
        transport.install();

        store.set_enabled(false);
        assert!(!transport.fetch(&FetchRequest::get("https://x.com/api/users")).unwrap().is_intercepted());

        store.set_enabled(true);
        store.replace(Vec::new());
        assert!(!transport.fetch(&FetchRequest::get("https://x.com/api/users")).unwrap().is_intercepted());

        store.replace(vec![users_rule()]);
        assert!(transport.fetch(&FetchRequest::get("https://x.com/api/users")).unwrap().is_intercepted());
    }
}
