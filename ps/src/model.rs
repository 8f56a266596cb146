//! Persisted record types
//!
//! Field names are camelCase on disk. Every field added after the first
//! on-disk version carries `#[serde(default)]` so older records still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tag marking a plan as archived
pub const ARCHIVED_TAG: &str = "archived";

/// Generate an ID in the form `{8-hex}-{type}-{slug}`
pub fn generate_id(domain_type: &str, title: &str) -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    // v7 leads with the timestamp; the tail is random
    let suffix = &uuid[uuid.len() - 8..];
    let slug = crate::store::sanitize_title(title);
    if slug.is_empty() {
        format!("{}-{}", suffix, domain_type)
    } else {
        format!("{}-{}-{}", suffix, domain_type, slug)
    }
}

/// Persistence scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Workspace-local files
    #[default]
    Project,
    /// Cross-project key-value store
    Global,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::Global => write!(f, "global"),
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "global" => Ok(Self::Global),
            other => Err(format!("unknown scope '{}', expected project or global", other)),
        }
    }
}

/// How risky a step is to carry out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Safe,
    Moderate,
    Risky,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Moderate => write!(f, "moderate"),
            Self::Risky => write!(f, "risky"),
        }
    }
}

/// Canonical step shape of a persisted plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub step_id: String,

    pub description: String,

    #[serde(default)]
    pub tools_to_use: Vec<String>,

    #[serde(default)]
    pub expected_files: Vec<String>,

    /// Step IDs this step builds on
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub risk_level: RiskLevel,

    /// Agent role hint (researcher, developer, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<String>,
}

impl PlanStep {
    /// Create a step with a freshly generated ID
    pub fn new(description: impl Into<String>) -> Self {
        Self::with_id(new_step_id(), description)
    }

    /// Create a step with a known ID
    pub fn with_id(step_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            description: description.into(),
            tools_to_use: Vec::new(),
            expected_files: Vec::new(),
            dependencies: Vec::new(),
            risk_level: RiskLevel::Safe,
            agent_role: None,
        }
    }
}

/// Fresh opaque step ID
pub fn new_step_id() -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    format!("step-{}", &uuid[uuid.len() - 8..])
}

fn default_plan_type() -> String {
    "implementation".to_string()
}

/// A persisted, editable plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPlan {
    /// Immutable for the plan's lifetime
    pub plan_id: String,

    pub title: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub steps: Vec<PlanStep>,

    #[serde(default = "default_plan_type")]
    pub plan_type: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(default = "crate::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl SavedPlan {
    /// Create a new plan with a generated ID
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        let title = title.into();
        debug!(%title, "SavedPlan::new: called");
        Self {
            plan_id: generate_id("plan", &title),
            title,
            summary: summary.into(),
            steps: Vec::new(),
            plan_type: default_plan_type(),
            tags: Vec::new(),
            project_path: None,
            conversation_id: None,
            created_at: crate::now(),
            last_edited_at: None,
            version: None,
        }
    }

    /// Builder method to set steps
    pub fn with_steps(mut self, steps: Vec<PlanStep>) -> Self {
        self.steps = steps;
        self
    }

    /// Builder method to set tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Builder method to set the plan type
    pub fn with_plan_type(mut self, plan_type: impl Into<String>) -> Self {
        self.plan_type = plan_type.into();
        self
    }

    pub fn is_archived(&self) -> bool {
        self.tags.iter().any(|t| t == ARCHIVED_TAG)
    }

    /// Add the archived tag (idempotent)
    pub fn archive(&mut self) {
        if !self.is_archived() {
            self.tags.push(ARCHIVED_TAG.to_string());
        }
    }

    /// Remove the archived tag
    pub fn unarchive(&mut self) {
        self.tags.retain(|t| t != ARCHIVED_TAG);
    }

    /// Stamp an edit: bump the version and record the time
    pub fn touch(&mut self) {
        self.version = Some(self.version.unwrap_or(0) + 1);
        self.last_edited_at = Some(crate::now());
    }
}

/// Author of an edit message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditRole {
    User,
    Assistant,
}

/// A tool call attached to an edit message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCallRecord {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// One message in a plan-editing conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessage {
    pub role: EditRole,
    pub content: String,
    #[serde(default = "crate::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
}

impl EditMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: EditRole::User,
            content: content.into(),
            timestamp: crate::now(),
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: EditRole::Assistant,
            content: content.into(),
            timestamp: crate::now(),
            tool_calls: None,
        }
    }

    /// Attach a tool call the message carried out
    pub fn with_tool_call(mut self, call: ToolCallRecord) -> Self {
        self.tool_calls.get_or_insert_with(Vec::new).push(call);
        self
    }
}

/// Immutable record of one conversational editing pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditSession {
    pub session_id: String,
    pub plan_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<EditMessage>,
    #[serde(default)]
    pub changes_summary: String,
    #[serde(default)]
    pub scope: Scope,
}

impl EditSession {
    pub fn new(
        session_id: impl Into<String>,
        plan_id: impl Into<String>,
        messages: Vec<EditMessage>,
        changes_summary: impl Into<String>,
        scope: Scope,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            plan_id: plan_id.into(),
            timestamp: crate::now(),
            messages,
            changes_summary: changes_summary.into(),
            scope,
        }
    }
}

/// Persisted edit lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub plan_id: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub session_id: String,
}

impl LockRecord {
    /// A lock is valid iff `now < expires_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
