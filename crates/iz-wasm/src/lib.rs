//! WebAssembly bindings for Interzept
//!
//! Exposes the pure core to the extension's JavaScript: the rule snapshot
//! and dispatcher used by the live-intercept shim, plus translation,
//! update planning and import/export for the background page.

use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

use serde_json::{json, Value};
use wasm_bindgen::prelude::*;

use iz_compiler::{
    export_rules as export_rule_list, import_rules as import_rule_list, to_platform_rule, IdRange, Reconciler,
    TranslateOptions,
};
use iz_core::intercept::{FetchResponse, InterceptStrategy, RuleStoreStrategy};
use iz_core::templates::{new_override_rule, template};
use iz_core::types::{Rule, RuleType};
use iz_core::{Dispatcher, RuleStore};

struct InterceptState {
    store: std::sync::Arc<RuleStore>,
    dispatcher: std::sync::Arc<Dispatcher>,
}

static INTERCEPT_STATE: OnceLock<InterceptState> = OnceLock::new();

fn state() -> &'static InterceptState {
    INTERCEPT_STATE.get_or_init(|| InterceptState {
        store: std::sync::Arc::new(RuleStore::new()),
        dispatcher: std::sync::Arc::new(Dispatcher::new()),
    })
}

fn to_js(value: &Value) -> Result<JsValue, JsValue> {
    js_sys::JSON::parse(&value.to_string())
}

fn parse_rules(rules_json: &str) -> Result<Vec<Rule>, String> {
    serde_json::from_str(rules_json).map_err(|e| format!("Invalid rules: {}", e))
}

fn translate_options(include_frames: bool) -> TranslateOptions {
    if include_frames {
        TranslateOptions::with_frames()
    } else {
        TranslateOptions::default()
    }
}

// =============================================================================
// Live intercept
// =============================================================================

/// Replace the rule snapshot. Returns the number of rules loaded.
#[wasm_bindgen]
pub fn set_rules(rules_json: &str) -> Result<u32, JsValue> {
    let rules = parse_rules(rules_json).map_err(|e| JsValue::from_str(&e))?;
    let count = rules.len() as u32;
    state().store.replace(rules);
    Ok(count)
}

#[wasm_bindgen]
pub fn set_enabled(enabled: bool) {
    state().store.set_enabled(enabled);
}

#[wasm_bindgen]
pub fn is_enabled() -> bool {
    state().store.is_enabled()
}

/// Enabled rules matching `url`, in priority order.
#[wasm_bindgen]
pub fn find_matching_rules(url: &str, rule_type: Option<String>) -> Result<JsValue, JsValue> {
    let value = matching_rules_value(url, rule_type.as_deref()).map_err(|e| JsValue::from_str(&e))?;
    to_js(&value)
}

/// The mock response for `url`, or `null` to let the request through.
#[wasm_bindgen]
pub fn should_intercept(url: &str) -> Result<JsValue, JsValue> {
    match intercept_value(url) {
        Some(value) => to_js(&value),
        None => Ok(JsValue::NULL),
    }
}

#[wasm_bindgen]
pub fn matches_pattern(url: &str, pattern: &str) -> bool {
    iz_core::matches(url, pattern)
}

fn matching_rules_value(url: &str, rule_type: Option<&str>) -> Result<Value, String> {
    let rule_type = match rule_type {
        Some(name) => Some(RuleType::from_name(name).ok_or_else(|| format!("Unknown rule type '{}'", name))?),
        None => None,
    };
    let state = state();
    let rules = state.store.load();
    let matching = state.dispatcher.find_matching_rules(&rules, url, rule_type);
    serde_json::to_value(matching).map_err(|e| e.to_string())
}

fn intercept_value(url: &str) -> Option<Value> {
    let state = state();
    let strategy = RuleStoreStrategy::with_dispatcher(state.store.clone(), state.dispatcher.clone());
    let rule = strategy.should_intercept(url)?;
    log::debug!("intercepting {} with rule '{}'", url, rule.id);
    Some(response_value(&FetchResponse::from_rule(&rule)))
}

fn response_value(response: &FetchResponse) -> Value {
    let headers: Vec<Value> = response
        .headers
        .iter()
        .map(|h| json!({ "name": h.name, "value": h.value }))
        .collect();
    json!({
        "status": response.status,
        "statusText": response.status_text,
        "headers": headers,
        "body": response.body,
        "ruleId": response.rule_id,
    })
}

// =============================================================================
// Translation and planning
// =============================================================================

/// Platform rule for one rule, or `null` if it would not be installed.
#[wasm_bindgen]
pub fn translate_rule(rule_json: &str, id: u32, priority: u32, include_frames: bool) -> Result<JsValue, JsValue> {
    let rule: Rule = serde_json::from_str(rule_json).map_err(|e| JsValue::from_str(&format!("Invalid rule: {}", e)))?;
    match to_platform_rule(&rule, id, priority, &translate_options(include_frames)) {
        Some(platform_rule) => {
            let value = serde_json::to_value(platform_rule).map_err(|e| JsValue::from_str(&e.to_string()))?;
            to_js(&value)
        }
        None => Ok(JsValue::NULL),
    }
}

/// Plan the dynamic rule update for `desired_json`.
///
/// The result carries `removeRuleIds`/`addRules` ready for the platform
/// call, the platform ID of every rule, and the rules left out.
#[wasm_bindgen]
pub fn plan_update(
    desired_json: &str,
    installed_ids: Vec<u32>,
    reserved_ids: Vec<u32>,
    include_frames: bool,
    id_start: Option<u32>,
    id_end: Option<u32>,
) -> Result<JsValue, JsValue> {
    let range = IdRange::new(
        id_start.unwrap_or(IdRange::DEFAULT.start),
        id_end.unwrap_or(IdRange::DEFAULT.end),
    )
    .map_err(|e| JsValue::from_str(&e.to_string()))?;
    let value = plan_value(desired_json, &installed_ids, &reserved_ids, range, include_frames)
        .map_err(|e| JsValue::from_str(&e))?;
    to_js(&value)
}

fn plan_value(
    desired_json: &str,
    installed_ids: &[u32],
    reserved_ids: &[u32],
    range: IdRange,
    include_frames: bool,
) -> Result<Value, String> {
    let desired = parse_rules(desired_json)?;
    let installed: BTreeSet<u32> = installed_ids.iter().copied().collect();
    let reserved: HashSet<u32> = reserved_ids.iter().copied().collect();

    let reconciler = Reconciler::new(range, translate_options(include_frames));
    let plan = reconciler
        .reconcile(&desired, &installed, &reserved)
        .map_err(|e| e.to_string())?;

    let assignments: Vec<Value> = plan
        .assignments
        .iter()
        .map(|a| json!({ "ruleId": a.rule_id, "platformId": a.platform_id }))
        .collect();
    let skipped: Vec<Value> = plan
        .skipped
        .iter()
        .map(|s| json!({ "ruleId": s.rule_id, "reason": s.reason.to_string() }))
        .collect();

    Ok(json!({
        "removeRuleIds": plan.to_remove,
        "addRules": plan.to_add,
        "assignments": assignments,
        "skipped": skipped,
    }))
}

// =============================================================================
// Import / export
// =============================================================================

/// Lenient import: `{rules, importedCount, discarded}`.
#[wasm_bindgen]
pub fn import_rules(json: &str) -> Result<JsValue, JsValue> {
    let value = import_value(json).map_err(|e| JsValue::from_str(&e))?;
    to_js(&value)
}

#[wasm_bindgen]
pub fn export_rules(rules_json: &str) -> Result<String, JsValue> {
    let rules = parse_rules(rules_json).map_err(|e| JsValue::from_str(&e))?;
    export_rule_list(&rules).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// A fresh rule from a built-in template, or the default new rule.
#[wasm_bindgen]
pub fn new_rule(id: &str, template_id: Option<String>) -> Result<JsValue, JsValue> {
    let rule = match template_id.as_deref() {
        Some(t) => template(t)
            .ok_or_else(|| JsValue::from_str(&format!("Unknown template '{}'", t)))?
            .to_rule(id),
        None => new_override_rule(id),
    };
    let value = serde_json::to_value(rule).map_err(|e| JsValue::from_str(&e.to_string()))?;
    to_js(&value)
}

fn import_value(json: &str) -> Result<Value, String> {
    let report = import_rule_list(json).map_err(|e| e.to_string())?;
    Ok(json!({
        "rules": report.rules,
        "importedCount": report.imported_count,
        "discarded": report.discarded,
    }))
}

// =============================================================================
// Logging
// =============================================================================

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[interzept] {}: {}", record.target(), record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::log_1(&line),
            log::Level::Debug | log::Level::Trace => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Route `log` output to the browser console. Unknown levels mean `info`.
#[wasm_bindgen]
pub fn init_logging(level: &str) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(parse_level(level));
}

fn parse_level(level: &str) -> log::LevelFilter {
    level.parse().unwrap_or(log::LevelFilter::Info)
}
