//! Background service
//!
//! Owns the in-memory rule snapshot and is the only writer of the installed
//! platform rules. Rule set changes go through one queue: each holder of
//! `update_lock` reads storage, plans, persists, swaps the snapshot and
//! installs, in that order, before the next change starts. Waiters are
//! served in submission order.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use iz_compiler::{import_value, ImportError, ReconcilePlan, Reconciler};
use iz_core::intercept::RuleStoreStrategy;
use iz_core::types::{Rule, RuleType};
use iz_core::{Dispatcher, RuleStore};

use crate::config::ServiceConfig;
use crate::error::{PlatformError, ServiceError};
use crate::messages::{
    error_response, CountResponse, MatchingRulesResponse, Request, RulesResponse, SuccessResponse, ToggleResponse,
    UpdateResponse,
};
use crate::platform::PlatformRuleStore;
use crate::stats::{Stats, StatsRecorder};
use crate::storage::RuleStorage;

pub struct Background<S, P> {
    config: ServiceConfig,
    reconciler: Reconciler,
    store: Arc<RuleStore>,
    dispatcher: Arc<Dispatcher>,
    storage: S,
    platform: P,
    update_lock: tokio::sync::Mutex<()>,
    dirty: AtomicBool,
    stats: StatsRecorder,
}

impl<S, P> Background<S, P>
where
    S: RuleStorage,
    P: PlatformRuleStore,
{
    pub fn new(config: ServiceConfig, storage: S, platform: P) -> Result<Self, ServiceError> {
        config.validate()?;
        let reconciler = Reconciler::new(config.id_range()?, config.translate_options());
        Ok(Self {
            config,
            reconciler,
            store: Arc::new(RuleStore::new()),
            dispatcher: Arc::new(Dispatcher::new()),
            storage,
            platform,
            update_lock: tokio::sync::Mutex::new(()),
            dirty: AtomicBool::new(false),
            stats: StatsRecorder::new(),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The snapshot the dispatcher reads.
    pub fn store(&self) -> Arc<RuleStore> {
        Arc::clone(&self.store)
    }

    /// Live-intercept strategy backed by this service's snapshot.
    pub fn strategy(&self) -> RuleStoreStrategy {
        RuleStoreStrategy::with_dispatcher(self.store(), Arc::clone(&self.dispatcher))
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Whether the last platform update failed and the installed rules
    /// may not reflect the stored ones.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Load persisted rules and the switch, then install them.
    pub async fn start(&self) -> Result<usize, ServiceError> {
        log::info!("restoring rules from storage");
        self.sync_rules().await
    }

    // =========================================================================
    // Message handling
    // =========================================================================

    /// Answer one raw message. Never fails: errors become
    /// `{success: false, error}`.
    pub async fn handle(&self, message: Value) -> Value {
        let result = match Request::parse(message) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| error_response(&e))
    }

    pub async fn dispatch(&self, request: Request) -> Result<Value, ServiceError> {
        log::debug!("handling '{}'", request.action());
        match request {
            Request::GetRules => {
                let rules = self.load_rules().await?;
                let enabled = self.load_enabled().await?;
                to_json(&RulesResponse { rules, enabled })
            }
            Request::UpdateRules { rules } => {
                let count = self.update_rules(rules).await?;
                to_json(&UpdateResponse { success: true, count })
            }
            Request::ToggleInterception => {
                let enabled = self.toggle_interception().await?;
                to_json(&ToggleResponse { success: true, enabled })
            }
            Request::GetMatchingRules { url, rule_type } => to_json(&MatchingRulesResponse {
                rules: self.matching_rules(&url, rule_type),
            }),
            Request::GetStats => to_json(&self.stats()),
            Request::GetRuleCount => {
                let count = self.installed_rule_count().await?;
                to_json(&CountResponse { count })
            }
            Request::RecordInterception { url, rule_id } => {
                self.record_interception(&url, &rule_id);
                to_json(&SuccessResponse { success: true })
            }
            Request::SyncRules => {
                let count = self.sync_rules().await?;
                to_json(&UpdateResponse { success: true, count })
            }
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Replace the rule list, persist it and install it.
    ///
    /// Rules that arrive without a platform ID get the one stored under
    /// the same rule id, so editing a rule does not move it.
    pub async fn update_rules(&self, mut rules: Vec<Rule>) -> Result<usize, ServiceError> {
        let _queue = self.update_lock.lock().await;

        let stored = self.load_stored().await?;
        let known: HashMap<&str, u32> = stored
            .rules
            .iter()
            .filter_map(|r| r.platform_id.map(|id| (r.id.as_str(), id)))
            .collect();
        for rule in rules.iter_mut().filter(|r| r.platform_id.is_none()) {
            rule.platform_id = known.get(rule.id.as_str()).copied();
        }

        let enabled = self.load_enabled().await?;
        let pending = self.plan(rules, enabled).await?;
        self.apply(pending, WriteBack::Replace).await
    }

    /// Flip the interception switch, persist it and reinstall.
    ///
    /// The flag is only written once the new installed set has been
    /// planned; a planning failure leaves the switch where it was.
    pub async fn toggle_interception(&self) -> Result<bool, ServiceError> {
        let _queue = self.update_lock.lock().await;

        let enabled = !self.load_enabled().await?;
        let stored = self.load_stored().await?;
        let pending = self.plan(stored.rules, enabled).await?;

        self.storage.set(&self.config.enabled_key, Value::Bool(enabled)).await?;
        log::info!("interception {}", if enabled { "enabled" } else { "disabled" });

        if let Err(e) = self.apply(pending, WriteBack::Patch(stored.entries)).await {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(enabled)
    }

    /// Re-read storage and reinstall. Clears the dirty flag on success.
    ///
    /// Stored entries are never dropped here, even ones the rule reader
    /// cannot use; only newly assigned platform IDs are written back.
    pub async fn sync_rules(&self) -> Result<usize, ServiceError> {
        let _queue = self.update_lock.lock().await;

        if self.is_dirty() {
            log::info!("retrying platform rule update");
        }
        let enabled = self.load_enabled().await?;
        let stored = self.load_stored().await?;
        let pending = self.plan(stored.rules, enabled).await?;
        self.apply(pending, WriteBack::Patch(stored.entries)).await
    }

    /// Rules that would fire for `url`, in priority order. Empty while
    /// interception is disabled.
    pub fn matching_rules(&self, url: &str, rule_type: Option<RuleType>) -> Vec<Rule> {
        if !self.store.is_enabled() {
            return Vec::new();
        }
        let rules = self.store.load();
        self.dispatcher
            .find_matching_rules(&rules, url, rule_type)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn record_interception(&self, url: &str, rule_id: &str) {
        log::debug!("intercepted {url} with rule '{rule_id}'");
        self.stats.record(Utc::now());
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot(self.store.active_count())
    }

    pub async fn installed_rule_count(&self) -> Result<usize, ServiceError> {
        Ok(self.bounded(self.platform.dynamic_rules()).await?.len())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Read the installed state and plan the update to `rules`. Writes
    /// nothing. Caller holds the queue.
    async fn plan(&self, mut rules: Vec<Rule>, enabled: bool) -> Result<Pending, ServiceError> {
        let installed: BTreeSet<u32> = self
            .bounded(self.platform.dynamic_rules())
            .await?
            .iter()
            .map(|r| r.id)
            .collect();
        let reserved = self.bounded(self.platform.reserved_ids()).await?;

        let mut plan = self.reconciler.reconcile(&rules, &installed, &reserved)?;
        if !enabled {
            plan.to_add.clear();
        }
        log::debug!(
            "planned {} removals and {} installs ({:?})",
            plan.to_remove.len(),
            plan.to_add.len(),
            plan.installed_ids()
        );

        let changed = plan.apply_assignments(&mut rules);
        Ok(Pending {
            rules,
            plan,
            enabled,
            changed,
        })
    }

    /// Persist, publish and install a planned update.
    ///
    /// If persisting fails the snapshot is left as it was. If installing
    /// fails the service is marked dirty and the error is returned.
    async fn apply(&self, pending: Pending, write_back: WriteBack) -> Result<usize, ServiceError> {
        let Pending {
            rules,
            plan,
            enabled,
            changed,
        } = pending;

        match write_back {
            WriteBack::Replace => {
                let value = serde_json::to_value(&rules)?;
                self.storage.set(&self.config.rules_key, value).await?;
            }
            WriteBack::Patch(mut entries) if changed > 0 => {
                patch_platform_ids(&mut entries, &rules);
                self.storage.set(&self.config.rules_key, Value::Array(entries)).await?;
            }
            WriteBack::Patch(_) => {}
        }

        let count = rules.len();
        self.store.set_enabled(enabled);
        self.store.replace(rules);

        match self.bounded(self.platform.update_dynamic_rules(&plan.to_remove, &plan.to_add)).await {
            Ok(()) => {
                self.dirty.store(false, Ordering::Release);
                Ok(count)
            }
            Err(e) => {
                log::error!("platform rule update failed: {e}");
                self.dirty.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Run a platform call under the configured timeout.
    async fn bounded<T, F>(&self, call: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, PlatformError>>,
    {
        let limit = self.config.platform_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => {
                log::error!("platform call timed out after {limit:?}");
                Err(ServiceError::PlatformTimeout(limit))
            }
        }
    }

    async fn load_rules(&self) -> Result<Vec<Rule>, ServiceError> {
        Ok(self.load_stored().await?.rules)
    }

    async fn load_stored(&self) -> Result<StoredRules, ServiceError> {
        let Some(value) = self.storage.get(&self.config.rules_key).await? else {
            return Ok(StoredRules::default());
        };
        let Value::Array(entries) = value else {
            log::warn!("stored rules are not a list; starting empty");
            return Ok(StoredRules::default());
        };
        match import_value(Value::Array(entries.clone())) {
            Ok(report) => {
                if report.discarded > 0 {
                    log::warn!("ignored {} malformed stored rules", report.discarded);
                }
                Ok(StoredRules {
                    entries,
                    rules: report.rules,
                })
            }
            Err(ImportError::NotAnArray) => Ok(StoredRules::default()),
            Err(ImportError::Json(e)) => Err(ServiceError::Serialization(e)),
        }
    }

    async fn load_enabled(&self) -> Result<bool, ServiceError> {
        let value = self.storage.get(&self.config.enabled_key).await?;
        Ok(value.as_ref().and_then(Value::as_bool).unwrap_or(true))
    }
}

/// Rules as stored, plus the raw entries they were read from.
#[derive(Default)]
struct StoredRules {
    entries: Vec<Value>,
    rules: Vec<Rule>,
}

/// A planned update that has not touched any state yet.
struct Pending {
    rules: Vec<Rule>,
    plan: ReconcilePlan,
    enabled: bool,
    changed: usize,
}

/// How the rule list is written back when an update is applied.
enum WriteBack {
    /// The new list replaces what is stored.
    Replace,
    /// The stored entries stay as they are; assigned platform IDs are
    /// patched into them, and only if one changed.
    Patch(Vec<Value>),
}

/// Set `platformId` on the first stored entry for each rule id.
fn patch_platform_ids(entries: &mut [Value], rules: &[Rule]) {
    let mut assigned: HashMap<&str, u32> = rules
        .iter()
        .filter_map(|r| r.platform_id.map(|id| (r.id.as_str(), id)))
        .collect();
    for entry in entries.iter_mut() {
        let Some(object) = entry.as_object_mut() else {
            continue;
        };
        let Some(id) = object.get("id").and_then(Value::as_str) else {
            continue;
        };
        if let Some(platform_id) = assigned.remove(id) {
            object.insert("platformId".to_string(), Value::from(platform_id));
        }
    }
}

fn to_json<T: Serialize>(response: &T) -> Result<Value, ServiceError> {
    Ok(serde_json::to_value(response)?)
}
