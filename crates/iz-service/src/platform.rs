//! Platform rule store
//!
//! The network layer's rule-management API: it holds the installed
//! dynamic rules and applies remove+add batches atomically. Interzept is
//! its only writer.

use std::collections::{BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use iz_compiler::platform::{PlatformRule, ResourceType, PLATFORM_ID_MAX, PLATFORM_ID_MIN};

use crate::error::PlatformError;

/// Dynamic rules the platform accepts at once.
pub const DYNAMIC_RULE_QUOTA: usize = 5000;

#[async_trait]
pub trait PlatformRuleStore: Send + Sync {
    /// Currently installed dynamic rules.
    async fn dynamic_rules(&self) -> Result<Vec<PlatformRule>, PlatformError>;

    /// IDs held by rules outside Interzept's control (packaged, session).
    async fn reserved_ids(&self) -> Result<HashSet<u32>, PlatformError>;

    /// Remove `remove_ids` and add `add_rules` as one atomic batch.
    async fn update_dynamic_rules(&self, remove_ids: &BTreeSet<u32>, add_rules: &[PlatformRule]) -> Result<(), PlatformError>;
}

/// Apply a batch to `current` the way the platform does: validate the
/// whole result first and leave `current` untouched on any error.
pub fn apply_batch(
    current: &[PlatformRule],
    reserved: &HashSet<u32>,
    remove_ids: &BTreeSet<u32>,
    add_rules: &[PlatformRule],
) -> Result<Vec<PlatformRule>, PlatformError> {
    let mut next: Vec<PlatformRule> = current
        .iter()
        .filter(|r| !remove_ids.contains(&r.id))
        .cloned()
        .collect();

    let mut ids: HashSet<u32> = next.iter().map(|r| r.id).collect();
    for rule in add_rules {
        if !(PLATFORM_ID_MIN..=PLATFORM_ID_MAX).contains(&rule.id) || reserved.contains(&rule.id) {
            return Err(PlatformError::InvalidId(rule.id));
        }
        if !ids.insert(rule.id) {
            return Err(PlatformError::DuplicateId(rule.id));
        }
        if let Some(name) = rule
            .condition
            .resource_types
            .iter()
            .find(|name| ResourceType::from_platform_name(name).is_none())
        {
            return Err(PlatformError::Rejected(format!(
                "rule {} has unknown resource type '{}'",
                rule.id, name
            )));
        }
    }

    let requested = next.len() + add_rules.len();
    if requested > DYNAMIC_RULE_QUOTA {
        return Err(PlatformError::QuotaExceeded {
            quota: DYNAMIC_RULE_QUOTA,
            requested,
        });
    }

    next.extend(add_rules.iter().cloned());
    Ok(next)
}

// =============================================================================
// Memory Platform
// =============================================================================

/// In-process platform, with knobs for simulating failures.
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    rules: Mutex<Vec<PlatformRule>>,
    reserved: HashSet<u32>,
    reject_with: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform that already holds packaged rules with these IDs.
    pub fn with_reserved(reserved: impl IntoIterator<Item = u32>) -> Self {
        Self {
            reserved: reserved.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Make every following update fail with `message`; `None` clears it.
    pub fn reject_updates(&self, message: Option<&str>) {
        if let Ok(mut reject) = self.reject_with.lock() {
            *reject = message.map(String::from);
        }
    }

    /// Stall every following update for `delay`.
    pub fn delay_updates(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.delay.lock() {
            *d = delay;
        }
    }

    pub fn installed(&self) -> Vec<PlatformRule> {
        self.rules.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn lock_rules(&self) -> Result<std::sync::MutexGuard<'_, Vec<PlatformRule>>, PlatformError> {
        self.rules
            .lock()
            .map_err(|_| PlatformError::Rejected("rule store lock poisoned".to_string()))
    }
}

#[async_trait]
impl PlatformRuleStore for MemoryPlatform {
    async fn dynamic_rules(&self) -> Result<Vec<PlatformRule>, PlatformError> {
        Ok(self.lock_rules()?.clone())
    }

    async fn reserved_ids(&self) -> Result<HashSet<u32>, PlatformError> {
        Ok(self.reserved.clone())
    }

    async fn update_dynamic_rules(&self, remove_ids: &BTreeSet<u32>, add_rules: &[PlatformRule]) -> Result<(), PlatformError> {
        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let rejection = self.reject_with.lock().ok().and_then(|r| r.clone());
        if let Some(message) = rejection {
            return Err(PlatformError::Rejected(message));
        }

        let mut rules = self.lock_rules()?;
        let next = apply_batch(&rules, &self.reserved, remove_ids, add_rules)?;
        *rules = next;
        Ok(())
    }
}

// =============================================================================
// JSON File Platform
// =============================================================================

/// Installed ruleset kept as a JSON array on disk, in the same shape the
/// extension loads as a static ruleset.
#[derive(Debug)]
pub struct JsonFilePlatform {
    path: PathBuf,
    reserved: HashSet<u32>,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFilePlatform {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reserved: HashSet::new(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_reserved(mut self, reserved: impl IntoIterator<Item = u32>) -> Self {
        self.reserved = reserved.into_iter().collect();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Vec<PlatformRule>, PlatformError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(Vec::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PlatformRuleStore for JsonFilePlatform {
    async fn dynamic_rules(&self) -> Result<Vec<PlatformRule>, PlatformError> {
        self.read().await
    }

    async fn reserved_ids(&self) -> Result<HashSet<u32>, PlatformError> {
        Ok(self.reserved.clone())
    }

    async fn update_dynamic_rules(&self, remove_ids: &BTreeSet<u32>, add_rules: &[PlatformRule]) -> Result<(), PlatformError> {
        let _guard = self.write_lock.lock().await;

        let current = self.read().await?;
        let next = apply_batch(&current, &self.reserved, remove_ids, add_rules)?;
        let text = serde_json::to_string_pretty(&next)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
