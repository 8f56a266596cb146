//! PlanStore - plan CRUD, snapshots, edit sessions and execution records

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::{
    EditSession, GLOBAL_PLANS_KEY, GLOBAL_SESSIONS_KEY, KvStore, MAX_GLOBAL_SESSIONS, PROJECT_DIR, SavedPlan, Scope,
    StoreError, render_markdown,
};

/// Maximum slug length used in filenames and IDs
const MAX_SLUG_LEN: usize = 50;

/// Attempts at a compare-and-swap update of a global array before giving up
const CAS_ATTEMPTS: usize = 8;

/// Turn a title into a filesystem-safe slug
///
/// Lowercases, keeps ASCII alphanumerics, collapses everything else into
/// single hyphens and caps the length.
pub fn sanitize_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Reject ids that could name anything outside their own record
///
/// Ids become filenames and key suffixes, so only ASCII letters, digits,
/// `-`, `_` and `.` are accepted, and never a `..` sequence.
pub(crate) fn check_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && !id.contains("..")
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        warn!(id = %id.escape_debug(), "Rejecting invalid id");
        Err(StoreError::InvalidId(id.to_string()))
    }
}

fn snapshot_key(plan_id: &str) -> String {
    format!("agentflow.snapshot.{}", plan_id)
}

fn execution_key(plan_id: &str) -> String {
    format!("agentflow.execution.{}", plan_id)
}

/// Two-scope plan persistence
///
/// Project scope needs a workspace; without one, writes fail with
/// [`StoreError::NoWorkspace`] and reads behave as if nothing is stored.
pub struct PlanStore {
    workspace: Option<PathBuf>,
    project_dir: String,
    kv: Arc<dyn KvStore>,
}

impl PlanStore {
    /// Open a store over an optional workspace and a global key-value store
    pub fn open(workspace: Option<PathBuf>, kv: Arc<dyn KvStore>) -> Self {
        debug!(workspace = ?workspace, "PlanStore::open: called");
        Self {
            workspace,
            project_dir: PROJECT_DIR.to_string(),
            kv,
        }
    }

    /// Override the hidden per-workspace directory name
    pub fn with_project_dir(mut self, project_dir: impl Into<String>) -> Self {
        self.project_dir = project_dir.into();
        self
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    pub(crate) fn kv(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.kv)
    }

    /// `<workspace>/<project_dir>/plans`
    pub fn plans_dir(&self) -> Result<PathBuf, StoreError> {
        let workspace = self.workspace.as_ref().ok_or(StoreError::NoWorkspace)?;
        Ok(workspace.join(&self.project_dir).join("plans"))
    }

    fn plans_subdir(&self, name: &str) -> Result<PathBuf, StoreError> {
        Ok(self.plans_dir()?.join(name))
    }

    // === Plans ===

    /// Persist a plan, stamping its version and edit time
    ///
    /// Project plans keep the filename chosen on their first save even if the
    /// title changes later.
    pub fn save_plan(&self, mut plan: SavedPlan, scope: Scope) -> Result<SavedPlan, StoreError> {
        debug!(plan_id = %plan.plan_id, %scope, "save_plan: called");
        check_id(&plan.plan_id)?;
        plan.touch();
        match scope {
            Scope::Project => self.save_project_plan(&mut plan)?,
            Scope::Global => self.save_global_plan(&plan)?,
        }
        info!(plan_id = %plan.plan_id, %scope, version = ?plan.version, "Saved plan");
        Ok(plan)
    }

    fn save_project_plan(&self, plan: &mut SavedPlan) -> Result<(), StoreError> {
        let dir = self.plans_dir()?;
        fs::create_dir_all(&dir)?;

        if plan.project_path.is_none()
            && let Some(workspace) = &self.workspace
        {
            plan.project_path = Some(workspace.display().to_string());
        }

        let json_path = match self.find_plan_file(&dir, &plan.plan_id)? {
            Some(existing) => existing,
            None => self.fresh_plan_path(&dir, plan),
        };
        debug!(path = %json_path.display(), "save_project_plan: writing");

        fs::write(&json_path, serde_json::to_string_pretty(plan)?)?;
        fs::write(json_path.with_extension("md"), render_markdown(plan))?;
        Ok(())
    }

    fn fresh_plan_path(&self, dir: &Path, plan: &SavedPlan) -> PathBuf {
        let slug = sanitize_title(&plan.title);
        let slug = if slug.is_empty() { sanitize_title(&plan.plan_id) } else { slug };
        let stem = format!("{}-{}", plan.created_at.format("%Y-%m-%d"), slug);
        let candidate = dir.join(format!("{}.json", stem));
        if !candidate.exists() {
            return candidate;
        }
        // Same date and title as another plan
        let short_id: String = plan.plan_id.chars().take(8).collect();
        dir.join(format!("{}-{}.json", stem, short_id))
    }

    /// Scan the plans directory for the file holding `plan_id`
    fn find_plan_file(&self, dir: &Path, plan_id: &str) -> Result<Option<PathBuf>, StoreError> {
        for (path, plan) in Self::read_plan_files(dir)? {
            if plan.plan_id == plan_id {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Every parseable plan file in `dir`; unreadable files are skipped
    fn read_plan_files(dir: &Path) -> Result<Vec<(PathBuf, SavedPlan)>, StoreError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut plans = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            match fs::read_to_string(&path).map_err(StoreError::from).and_then(|content| {
                serde_json::from_str::<SavedPlan>(&content).map_err(StoreError::from)
            }) {
                Ok(plan) => plans.push((path, plan)),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable plan file"),
            }
        }
        Ok(plans)
    }

    fn save_global_plan(&self, plan: &SavedPlan) -> Result<(), StoreError> {
        self.update_global_array::<SavedPlan>(GLOBAL_PLANS_KEY, |plans| {
            match plans.iter_mut().find(|p| p.plan_id == plan.plan_id) {
                Some(existing) => *existing = plan.clone(),
                None => plans.push(plan.clone()),
            }
        })
    }

    /// Load a plan; `None` when it does not exist or cannot be read
    pub fn load_plan(&self, plan_id: &str, scope: Scope) -> Result<Option<SavedPlan>, StoreError> {
        debug!(%plan_id, %scope, "load_plan: called");
        check_id(plan_id)?;
        match scope {
            Scope::Project => {
                let dir = match self.plans_dir() {
                    Ok(dir) => dir,
                    Err(StoreError::NoWorkspace) => return Ok(None),
                    Err(e) => return Err(e),
                };
                Ok(Self::read_plan_files(&dir)?
                    .into_iter()
                    .map(|(_, plan)| plan)
                    .find(|p| p.plan_id == plan_id))
            }
            Scope::Global => Ok(self
                .read_global_array::<SavedPlan>(GLOBAL_PLANS_KEY)?
                .into_iter()
                .find(|p| p.plan_id == plan_id)),
        }
    }

    /// All plans in a scope, most recently edited first
    pub fn list_plans(&self, scope: Scope, include_archived: bool) -> Result<Vec<SavedPlan>, StoreError> {
        debug!(%scope, include_archived, "list_plans: called");
        let mut plans = match scope {
            Scope::Project => match self.plans_dir() {
                Ok(dir) => Self::read_plan_files(&dir)?.into_iter().map(|(_, p)| p).collect(),
                Err(StoreError::NoWorkspace) => Vec::new(),
                Err(e) => return Err(e),
            },
            Scope::Global => self.read_global_array::<SavedPlan>(GLOBAL_PLANS_KEY)?,
        };
        if !include_archived {
            plans.retain(|p| !p.is_archived());
        }
        plans.sort_by_key(|p| std::cmp::Reverse(p.last_edited_at.unwrap_or(p.created_at)));
        Ok(plans)
    }

    /// Delete a plan together with its snapshot; returns whether it existed
    pub fn delete_plan(&self, plan_id: &str, scope: Scope) -> Result<bool, StoreError> {
        debug!(%plan_id, %scope, "delete_plan: called");
        check_id(plan_id)?;
        let existed = match scope {
            Scope::Project => {
                let dir = self.plans_dir()?;
                match self.find_plan_file(&dir, plan_id)? {
                    Some(path) => {
                        fs::remove_file(&path)?;
                        remove_if_exists(&path.with_extension("md"))?;
                        true
                    }
                    None => false,
                }
            }
            Scope::Global => {
                let mut existed = false;
                self.update_global_array::<SavedPlan>(GLOBAL_PLANS_KEY, |plans| {
                    let before = plans.len();
                    plans.retain(|p| p.plan_id != plan_id);
                    existed = plans.len() != before;
                })?;
                existed
            }
        };
        self.delete_snapshot(plan_id, scope)?;
        if existed {
            info!(%plan_id, %scope, "Deleted plan");
        }
        Ok(existed)
    }

    /// Tag a plan as archived; [`StoreError::NotFound`] when there is no such plan
    pub fn archive_plan(&self, plan_id: &str, scope: Scope) -> Result<SavedPlan, StoreError> {
        debug!(%plan_id, %scope, "archive_plan: called");
        self.retag(plan_id, scope, SavedPlan::archive)
    }

    /// Remove the archived tag; [`StoreError::NotFound`] when there is no such plan
    pub fn unarchive_plan(&self, plan_id: &str, scope: Scope) -> Result<SavedPlan, StoreError> {
        debug!(%plan_id, %scope, "unarchive_plan: called");
        self.retag(plan_id, scope, SavedPlan::unarchive)
    }

    fn retag(&self, plan_id: &str, scope: Scope, f: fn(&mut SavedPlan)) -> Result<SavedPlan, StoreError> {
        let mut plan = self
            .load_plan(plan_id, scope)?
            .ok_or_else(|| StoreError::NotFound(plan_id.to_string()))?;
        f(&mut plan);
        self.save_plan(plan, scope)
    }

    // === Snapshots ===

    /// Overwrite the single undo slot for a plan
    pub fn save_snapshot(&self, plan: &SavedPlan, scope: Scope) -> Result<(), StoreError> {
        debug!(plan_id = %plan.plan_id, %scope, "save_snapshot: called");
        check_id(&plan.plan_id)?;
        let json = serde_json::to_string_pretty(plan)?;
        match scope {
            Scope::Project => {
                let dir = self.plans_subdir("snapshots")?;
                fs::create_dir_all(&dir)?;
                fs::write(dir.join(format!("{}.json", plan.plan_id)), json)?;
            }
            Scope::Global => self.kv.set(&snapshot_key(&plan.plan_id), &json)?,
        }
        Ok(())
    }

    pub fn load_snapshot(&self, plan_id: &str, scope: Scope) -> Result<Option<SavedPlan>, StoreError> {
        debug!(%plan_id, %scope, "load_snapshot: called");
        check_id(plan_id)?;
        let raw = match scope {
            Scope::Project => match self.plans_subdir("snapshots") {
                Ok(dir) => read_optional(&dir.join(format!("{}.json", plan_id)))?,
                Err(StoreError::NoWorkspace) => None,
                Err(e) => return Err(e),
            },
            Scope::Global => self.kv.get(&snapshot_key(plan_id))?,
        };
        Ok(raw.and_then(|raw| parse_lenient(&raw, "snapshot")))
    }

    pub fn delete_snapshot(&self, plan_id: &str, scope: Scope) -> Result<(), StoreError> {
        debug!(%plan_id, %scope, "delete_snapshot: called");
        check_id(plan_id)?;
        match scope {
            Scope::Project => {
                let dir = self.plans_subdir("snapshots")?;
                remove_if_exists(&dir.join(format!("{}.json", plan_id)))
            }
            Scope::Global => self.kv.delete(&snapshot_key(plan_id)),
        }
    }

    /// Undo the most recent edit by restoring the snapshot over the plan
    ///
    /// The snapshot is consumed. The restored plan's version continues from
    /// the current one so versions never go backwards.
    pub fn restore_snapshot(&self, plan_id: &str, scope: Scope) -> Result<Option<SavedPlan>, StoreError> {
        debug!(%plan_id, %scope, "restore_snapshot: called");
        let Some(mut snapshot) = self.load_snapshot(plan_id, scope)? else {
            debug!(%plan_id, "restore_snapshot: no snapshot");
            return Ok(None);
        };
        if let Some(current) = self.load_plan(plan_id, scope)? {
            snapshot.version = snapshot.version.max(current.version);
        }
        let restored = self.save_plan(snapshot, scope)?;
        self.delete_snapshot(plan_id, scope)?;
        info!(%plan_id, %scope, "Restored plan from snapshot");
        Ok(Some(restored))
    }

    // === Edit sessions ===

    /// Append an edit session record in the session's own scope
    pub fn save_edit_session(&self, session: &EditSession) -> Result<(), StoreError> {
        debug!(session_id = %session.session_id, plan_id = %session.plan_id, scope = %session.scope, "save_edit_session: called");
        check_id(&session.session_id)?;
        check_id(&session.plan_id)?;
        match session.scope {
            Scope::Project => {
                let dir = self.plans_subdir("edit-sessions")?;
                fs::create_dir_all(&dir)?;
                fs::write(
                    dir.join(format!("{}.json", session.session_id)),
                    serde_json::to_string_pretty(session)?,
                )?;
            }
            Scope::Global => {
                self.update_global_array::<EditSession>(GLOBAL_SESSIONS_KEY, |sessions| {
                    sessions.push(session.clone());
                    if sessions.len() > MAX_GLOBAL_SESSIONS {
                        let excess = sessions.len() - MAX_GLOBAL_SESSIONS;
                        sessions.drain(..excess);
                    }
                })?;
            }
        }
        Ok(())
    }

    /// Edit sessions in a scope, oldest first, optionally for one plan
    pub fn list_edit_sessions(&self, plan_id: Option<&str>, scope: Scope) -> Result<Vec<EditSession>, StoreError> {
        debug!(?plan_id, %scope, "list_edit_sessions: called");
        let mut sessions = match scope {
            Scope::Project => {
                let dir = match self.plans_subdir("edit-sessions") {
                    Ok(dir) => dir,
                    Err(StoreError::NoWorkspace) => return Ok(Vec::new()),
                    Err(e) => return Err(e),
                };
                let mut sessions = Vec::new();
                if dir.exists() {
                    for entry in fs::read_dir(&dir)? {
                        let path = entry?.path();
                        if let Some(raw) = read_optional(&path)?
                            && let Some(session) = parse_lenient::<EditSession>(&raw, "edit session")
                        {
                            sessions.push(session);
                        }
                    }
                }
                sessions
            }
            Scope::Global => self.read_global_array::<EditSession>(GLOBAL_SESSIONS_KEY)?,
        };
        if let Some(plan_id) = plan_id {
            sessions.retain(|s| s.plan_id == plan_id);
        }
        sessions.sort_by_key(|s| s.timestamp);
        Ok(sessions)
    }

    // === Execution records ===

    /// Persist an execution record for later resume
    pub fn save_execution<T: Serialize>(&self, plan_id: &str, record: &T, scope: Scope) -> Result<(), StoreError> {
        debug!(%plan_id, %scope, "save_execution: called");
        check_id(plan_id)?;
        let json = serde_json::to_string_pretty(record)?;
        match scope {
            Scope::Project => {
                let dir = self.plans_subdir("executions")?;
                fs::create_dir_all(&dir)?;
                fs::write(dir.join(format!("{}.json", plan_id)), json)?;
            }
            Scope::Global => self.kv.set(&execution_key(plan_id), &json)?,
        }
        Ok(())
    }

    pub fn load_execution<T: DeserializeOwned>(&self, plan_id: &str, scope: Scope) -> Result<Option<T>, StoreError> {
        debug!(%plan_id, %scope, "load_execution: called");
        check_id(plan_id)?;
        let raw = match scope {
            Scope::Project => match self.plans_subdir("executions") {
                Ok(dir) => read_optional(&dir.join(format!("{}.json", plan_id)))?,
                Err(StoreError::NoWorkspace) => None,
                Err(e) => return Err(e),
            },
            Scope::Global => self.kv.get(&execution_key(plan_id))?,
        };
        Ok(raw.and_then(|raw| parse_lenient(&raw, "execution record")))
    }

    pub fn delete_execution(&self, plan_id: &str, scope: Scope) -> Result<(), StoreError> {
        debug!(%plan_id, %scope, "delete_execution: called");
        check_id(plan_id)?;
        match scope {
            Scope::Project => remove_if_exists(&self.plans_subdir("executions")?.join(format!("{}.json", plan_id))),
            Scope::Global => self.kv.delete(&execution_key(plan_id)),
        }
    }

    // === Global array helpers ===

    /// Decode a JSON array stored under `key`, dropping elements that fail to parse
    fn read_global_array<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StoreError> {
        let raw = self.kv.get(key)?;
        Ok(decode_array(raw.as_deref(), key))
    }

    /// Read-modify-write an array under `key` with compare-and-swap
    fn update_global_array<T: DeserializeOwned + Serialize>(
        &self,
        key: &str,
        mut f: impl FnMut(&mut Vec<T>),
    ) -> Result<(), StoreError> {
        for attempt in 1..=CAS_ATTEMPTS {
            let raw = self.kv.get(key)?;
            let mut items: Vec<T> = decode_array(raw.as_deref(), key);
            f(&mut items);
            let new = serde_json::to_string(&items)?;
            if self.kv.compare_and_swap(key, raw.as_deref(), Some(&new))? {
                return Ok(());
            }
            debug!(%key, attempt, "update_global_array: concurrent update, retrying");
        }
        Err(StoreError::Kv(format!("too much contention updating {}", key)))
    }
}

fn decode_array<T: DeserializeOwned>(raw: Option<&str>, key: &str) -> Vec<T> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(values) => values
            .into_iter()
            .filter_map(|v| match serde_json::from_value(v) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(%key, error = %e, "Skipping unparsable global record");
                    None
                }
            })
            .collect(),
        Err(e) => {
            warn!(%key, error = %e, "Global record is not a JSON array");
            Vec::new()
        }
    }
}

fn parse_lenient<T: DeserializeOwned>(raw: &str, what: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(%what, error = %e, "Ignoring unparsable record");
            None
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
