//! Edit locks with TTL expiry
//!
//! A lock is keyed by `(plan_id, scope)` and held by one edit session. Every
//! write is a conditional write: project-scope locks are read, compared and
//! written while holding an exclusive `fs2` lock on `plans/locks/.guard`;
//! global-scope locks go through [`KvStore::compare_and_swap`]. Two sessions
//! racing to acquire the same plan cannot both win.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::store::{check_id, remove_if_exists};
use crate::{KvStore, LockRecord, PlanStore, Scope, StoreError};

/// Default lock lifetime from acquisition or refresh
pub const LOCK_TTL_SECS: u64 = 30;

/// Attempts at a global compare-and-swap before reporting contention
const CAS_ATTEMPTS: usize = 8;

fn lock_key(plan_id: &str) -> String {
    format!("agentflow.lock.{}", plan_id)
}

/// Identity of the editing session making a lock call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditContext {
    pub session_id: String,
}

impl EditContext {
    /// A context with a fresh session ID
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::now_v7().to_string(),
        }
    }

    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

impl Default for EditContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of an acquire attempt; conflicts are data, not errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub lock: Option<LockRecord>,
}

impl LockOutcome {
    fn acquired(lock: LockRecord) -> Self {
        Self {
            success: true,
            error: None,
            lock: Some(lock),
        }
    }

    fn conflict(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            lock: None,
        }
    }
}

/// Answer to "is this plan being edited?"
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LockStatus {
    pub locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
}

impl LockStatus {
    fn unlocked() -> Self {
        Self::default()
    }

    fn held(record: &LockRecord) -> Self {
        Self {
            locked: true,
            locked_at: Some(record.locked_at),
            expires_at: Some(record.expires_at),
            session_id: Some(record.session_id.clone()),
        }
    }
}

/// What to do with the current record during an acquire
enum Decision {
    Write(LockRecord),
    Conflict(String),
}

fn decide(current: Option<LockRecord>, plan_id: &str, ctx: &EditContext, now: DateTime<Utc>, ttl: chrono::Duration) -> Decision {
    match current {
        Some(record) if !record.is_expired(now) && record.session_id == ctx.session_id => {
            debug!(%plan_id, "decide: refreshing own lock");
            Decision::Write(LockRecord {
                expires_at: now + ttl,
                ..record
            })
        }
        Some(record) if !record.is_expired(now) => Decision::Conflict(format!(
            "Plan is being edited in another session (editing started at {})",
            record.locked_at.format("%Y-%m-%d %H:%M:%S UTC")
        )),
        _ => Decision::Write(LockRecord {
            plan_id: plan_id.to_string(),
            locked_at: now,
            expires_at: now + ttl,
            session_id: ctx.session_id.clone(),
        }),
    }
}

fn parse_record(raw: &str, plan_id: &str) -> Option<LockRecord> {
    match serde_json::from_str(raw) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(%plan_id, error = %e, "Treating unparsable lock record as absent");
            None
        }
    }
}

/// Cooperative per-plan edit locks
pub struct LockManager {
    locks_dir: Option<PathBuf>,
    kv: Arc<dyn KvStore>,
    ttl: chrono::Duration,
}

impl LockManager {
    /// Lock manager over the same locations as `store`
    pub fn new(store: &PlanStore) -> Self {
        let locks_dir = store.plans_dir().ok().map(|dir| dir.join("locks"));
        debug!(?locks_dir, "LockManager::new: called");
        Self {
            locks_dir,
            kv: store.kv(),
            ttl: chrono::Duration::seconds(LOCK_TTL_SECS as i64),
        }
    }

    /// Override the lock lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(LOCK_TTL_SECS as i64));
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl.to_std().unwrap_or(Duration::from_secs(LOCK_TTL_SECS))
    }

    /// Take or refresh the lock on a plan for `ctx`'s session
    pub fn acquire(&self, plan_id: &str, scope: Scope, ctx: &EditContext) -> Result<LockOutcome, StoreError> {
        debug!(%plan_id, %scope, session_id = %ctx.session_id, "acquire: called");
        check_id(plan_id)?;
        let outcome = match scope {
            Scope::Project => self.with_guard(|dir| {
                let path = lock_path(dir, plan_id);
                let current = read_record(&path, plan_id)?;
                match decide(current, plan_id, ctx, Utc::now(), self.ttl) {
                    Decision::Write(record) => {
                        fs::write(&path, serde_json::to_string_pretty(&record)?)?;
                        Ok(LockOutcome::acquired(record))
                    }
                    Decision::Conflict(msg) => Ok(LockOutcome::conflict(msg)),
                }
            })?,
            Scope::Global => self.acquire_global(plan_id, ctx)?,
        };
        if outcome.success {
            info!(%plan_id, %scope, session_id = %ctx.session_id, "Lock acquired");
        } else {
            debug!(%plan_id, %scope, error = ?outcome.error, "acquire: conflict");
        }
        Ok(outcome)
    }

    fn acquire_global(&self, plan_id: &str, ctx: &EditContext) -> Result<LockOutcome, StoreError> {
        let key = lock_key(plan_id);
        for attempt in 1..=CAS_ATTEMPTS {
            let raw = self.kv.get(&key)?;
            let current = raw.as_deref().and_then(|r| parse_record(r, plan_id));
            match decide(current, plan_id, ctx, Utc::now(), self.ttl) {
                Decision::Write(record) => {
                    let new = serde_json::to_string(&record)?;
                    if self.kv.compare_and_swap(&key, raw.as_deref(), Some(&new))? {
                        return Ok(LockOutcome::acquired(record));
                    }
                    debug!(%plan_id, attempt, "acquire_global: lost race, re-reading");
                }
                Decision::Conflict(msg) => return Ok(LockOutcome::conflict(msg)),
            }
        }
        Ok(LockOutcome::conflict("Plan lock is under contention, try again"))
    }

    /// Remove the lock regardless of which session holds it
    pub fn release(&self, plan_id: &str, scope: Scope) -> Result<(), StoreError> {
        debug!(%plan_id, %scope, "release: called");
        check_id(plan_id)?;
        match scope {
            Scope::Project => self.with_guard(|dir| remove_if_exists(&lock_path(dir, plan_id)))?,
            Scope::Global => self.kv.delete(&lock_key(plan_id))?,
        }
        info!(%plan_id, %scope, "Lock released");
        Ok(())
    }

    /// Remove the lock only while `ctx`'s session still holds it
    ///
    /// Returns whether a lock was removed. A session whose lock expired and
    /// was taken over leaves the new holder's lock alone.
    pub fn release_held(&self, plan_id: &str, scope: Scope, ctx: &EditContext) -> Result<bool, StoreError> {
        debug!(%plan_id, %scope, session_id = %ctx.session_id, "release_held: called");
        check_id(plan_id)?;
        let released = match scope {
            Scope::Project => self.with_guard(|dir| {
                let path = lock_path(dir, plan_id);
                match read_record(&path, plan_id)? {
                    Some(record) if record.session_id == ctx.session_id => {
                        remove_if_exists(&path)?;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })?,
            Scope::Global => {
                let key = lock_key(plan_id);
                match self.kv.get(&key)? {
                    Some(raw) if parse_record(&raw, plan_id).is_some_and(|r| r.session_id == ctx.session_id) => {
                        self.kv.compare_and_swap(&key, Some(&raw), None)?
                    }
                    _ => false,
                }
            }
        };
        if released {
            info!(%plan_id, %scope, session_id = %ctx.session_id, "Lock released");
        } else {
            debug!(%plan_id, %scope, "release_held: lock not held by this session");
        }
        Ok(released)
    }

    /// Current lock state; an expired record is removed and reported unlocked
    pub fn is_locked(&self, plan_id: &str, scope: Scope) -> Result<LockStatus, StoreError> {
        debug!(%plan_id, %scope, "is_locked: called");
        check_id(plan_id)?;
        match scope {
            Scope::Project => {
                if self.locks_dir.is_none() {
                    return Ok(LockStatus::unlocked());
                }
                self.with_guard(|dir| {
                    let path = lock_path(dir, plan_id);
                    match read_record(&path, plan_id)? {
                        None => Ok(LockStatus::unlocked()),
                        Some(record) if record.is_expired(Utc::now()) => {
                            info!(%plan_id, "Removing expired lock");
                            remove_if_exists(&path)?;
                            Ok(LockStatus::unlocked())
                        }
                        Some(record) => Ok(LockStatus::held(&record)),
                    }
                })
            }
            Scope::Global => {
                let key = lock_key(plan_id);
                let Some(raw) = self.kv.get(&key)? else {
                    return Ok(LockStatus::unlocked());
                };
                match parse_record(&raw, plan_id) {
                    Some(record) if !record.is_expired(Utc::now()) => Ok(LockStatus::held(&record)),
                    _ => {
                        // Only delete the exact record we judged stale
                        if self.kv.compare_and_swap(&key, Some(&raw), None)? {
                            info!(%plan_id, "Removed expired global lock");
                        }
                        Ok(LockStatus::unlocked())
                    }
                }
            }
        }
    }

    /// Run `f` with the project lock directory exclusively held
    fn with_guard<T>(&self, f: impl FnOnce(&Path) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let dir = self.locks_dir.as_ref().ok_or(StoreError::NoWorkspace)?;
        fs::create_dir_all(dir)?;
        let guard = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(".guard"))?;
        guard.lock_exclusive()?;
        let result = f(dir);
        FileExt::unlock(&guard)?;
        result
    }
}

fn lock_path(dir: &Path, plan_id: &str) -> PathBuf {
    dir.join(format!("{}.lock", plan_id))
}

fn read_record(path: &Path, plan_id: &str) -> Result<Option<LockRecord>, StoreError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(parse_record(&raw, plan_id)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
