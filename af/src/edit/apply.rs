//! Apply a parsed update to a plan
//!
//! Pure: the input plan is never modified and nothing is persisted here.

use planstore::{PlanStep, RiskLevel, SavedPlan, new_step_id};
use serde_json::Value;
use tracing::debug;

use super::EditError;
use super::parse::{Operation, PlanUpdate, Section};

/// Keys a loose step object may carry its description under, in priority order
const DESCRIPTION_KEYS: &[&str] = &["description", "title", "objective", "content"];

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// String items of an array field; absent or non-array yields empty
fn text_list(map: &serde_json::Map<String, Value>, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(as_text).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Coerce one loosely shaped step into the canonical form
///
/// The id comes from `stepId` or `id` when present, otherwise a fresh one is
/// generated. Tools, files, dependencies and risk are kept when supplied and
/// default to empty and `safe` when missing or unreadable.
pub fn normalize_step(value: &Value) -> PlanStep {
    match value {
        Value::Object(map) => {
            let step_id = ["stepId", "id"]
                .iter()
                .find_map(|k| map.get(*k).and_then(as_text))
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(new_step_id);
            let description = DESCRIPTION_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(|v| v.as_str()))
                .unwrap_or_default()
                .to_string();
            let mut step = PlanStep::with_id(step_id, description);
            step.tools_to_use = text_list(map, "toolsToUse");
            step.expected_files = text_list(map, "expectedFiles");
            step.dependencies = text_list(map, "dependencies");
            step.risk_level = map
                .get("riskLevel")
                .and_then(|v| serde_json::from_value::<RiskLevel>(v.clone()).ok())
                .unwrap_or_default();
            step.agent_role = map.get("agentRole").and_then(|v| v.as_str()).map(str::to_string);
            step
        }
        other => PlanStep::new(as_text(other).unwrap_or_default()),
    }
}

/// Strip a leading list marker such as `1.`, `2)`, `-` or `*`
fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(['-', '*', '•']) {
        return rest.trim();
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0
        && let Some(rest) = line[digits..].strip_prefix(['.', ')'])
    {
        return rest.trim();
    }
    line
}

/// Steps from an array of objects or strings, or from plain text one step per line
pub fn normalize_steps(value: &Value) -> Vec<PlanStep> {
    match value {
        Value::Array(items) => items.iter().map(normalize_step).collect(),
        Value::String(text) => text
            .lines()
            .map(strip_list_marker)
            .filter(|l| !l.is_empty())
            .map(PlanStep::new)
            .collect(),
        Value::Object(_) => vec![normalize_step(value)],
        _ => Vec::new(),
    }
}

/// Tags from an array or comma-separated text
pub fn parse_tags(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(as_text).collect(),
        Value::String(text) => text.split([',', '\n']).map(str::to_string).collect(),
        _ => Vec::new(),
    };
    raw.into_iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()
}

/// Order-preserving de-duplication
fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn combine<T>(existing: &[T], new: Vec<T>, operation: Operation) -> Vec<T>
where
    T: Clone,
{
    match operation {
        Operation::Replace => new,
        Operation::Append => existing.iter().cloned().chain(new).collect(),
        Operation::Prepend => new.into_iter().chain(existing.iter().cloned()).collect(),
    }
}

fn combine_text(existing: &str, new: &str, operation: Operation) -> String {
    match operation {
        Operation::Replace => new.to_string(),
        _ if existing.is_empty() => new.to_string(),
        Operation::Append => format!("{}\n\n{}", existing, new),
        Operation::Prepend => format!("{}\n\n{}", new, existing),
    }
}

fn require_text(value: &Value, section: Section) -> Result<String, EditError> {
    as_text(value).ok_or_else(|| EditError::InvalidContent {
        section: section.to_string(),
        reason: "expected text".to_string(),
    })
}

/// Apply `update` to a copy of `plan`
///
/// `planId`, `createdAt` and `projectPath` are never touched.
pub fn apply_update(plan: &SavedPlan, update: &PlanUpdate) -> Result<SavedPlan, EditError> {
    debug!(plan_id = %plan.plan_id, section = %update.section, operation = ?update.operation, "apply_update: called");
    let mut next = plan.clone();
    let content = &update.new_content;

    match update.section {
        Section::Title => {
            let title = require_text(content, Section::Title)?;
            if title.trim().is_empty() {
                return Err(EditError::InvalidContent {
                    section: "title".to_string(),
                    reason: "title cannot be empty".to_string(),
                });
            }
            next.title = title;
        }
        Section::Summary => {
            let text = require_text(content, Section::Summary)?;
            next.summary = combine_text(&plan.summary, &text, update.operation);
        }
        Section::Steps => {
            next.steps = combine(&plan.steps, normalize_steps(content), update.operation);
        }
        Section::Tags => {
            next.tags = dedup(combine(&plan.tags, parse_tags(content), update.operation));
        }
        Section::Full => {
            let map = content.as_object().ok_or_else(|| EditError::InvalidContent {
                section: "full".to_string(),
                reason: "expected an object".to_string(),
            })?;
            if let Some(title) = map.get("title").and_then(as_text)
                && !title.trim().is_empty()
            {
                next.title = title;
            }
            if let Some(summary) = map.get("summary").and_then(as_text) {
                next.summary = summary;
            }
            if let Some(steps) = map.get("steps") {
                next.steps = normalize_steps(steps);
            }
            if let Some(tags) = map.get("tags") {
                next.tags = dedup(parse_tags(tags));
            }
        }
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan() -> SavedPlan {
        let mut plan = SavedPlan::new("Original", "First paragraph")
            .with_steps(vec![PlanStep::with_id("s1", "Investigate")])
            .with_tags(vec!["x".to_string()]);
        plan.project_path = Some("/work".to_string());
        plan
    }

    #[test]
    fn test_tags_append_from_text() {
        let update = PlanUpdate::new(Section::Tags, json!("a, b, c"), Operation::Append);
        let next = apply_update(&plan(), &update).unwrap();
        assert_eq!(next.tags, vec!["x", "a", "b", "c"]);
    }

    #[test]
    fn test_tags_dedup_preserves_order() {
        let update = PlanUpdate::new(Section::Tags, json!(["b", "x", "b"]), Operation::Prepend);
        let next = apply_update(&plan(), &update).unwrap();
        assert_eq!(next.tags, vec!["b", "x"]);
    }

    #[test]
    fn test_title_replace_verbatim() {
        let update = PlanUpdate::new(Section::Title, json!("  Spaced Title "), Operation::Append);
        let next = apply_update(&plan(), &update).unwrap();
        assert_eq!(next.title, "  Spaced Title ");

        let empty = PlanUpdate::new(Section::Title, json!(""), Operation::Replace);
        assert!(apply_update(&plan(), &empty).is_err());
        let object = PlanUpdate::new(Section::Title, json!({"a": 1}), Operation::Replace);
        assert!(apply_update(&plan(), &object).is_err());
    }

    #[test]
    fn test_summary_operations() {
        let p = plan();
        let append = PlanUpdate::new(Section::Summary, json!("Second"), Operation::Append);
        assert_eq!(apply_update(&p, &append).unwrap().summary, "First paragraph\n\nSecond");

        let prepend = PlanUpdate::new(Section::Summary, json!("Zeroth"), Operation::Prepend);
        assert_eq!(apply_update(&p, &prepend).unwrap().summary, "Zeroth\n\nFirst paragraph");

        let replace = PlanUpdate::new(Section::Summary, json!("Only"), Operation::Replace);
        assert_eq!(apply_update(&p, &replace).unwrap().summary, "Only");

        let mut blank = p.clone();
        blank.summary.clear();
        assert_eq!(apply_update(&blank, &append).unwrap().summary, "Second");
    }

    #[test]
    fn test_steps_normalized() {
        let update = PlanUpdate::new(
            Section::Steps,
            json!([
                {"id": "s9", "title": "Write migration", "riskLevel": "risky", "dependencies": ["s1"]},
                {"objective": "Backfill data"},
                "Run the tests"
            ]),
            Operation::Append,
        );
        let next = apply_update(&plan(), &update).unwrap();
        assert_eq!(next.steps.len(), 4);
        assert_eq!(next.steps[0].step_id, "s1");
        assert_eq!(next.steps[1].step_id, "s9");
        assert_eq!(next.steps[1].description, "Write migration");
        assert_eq!(next.steps[1].risk_level, RiskLevel::Risky);
        assert_eq!(next.steps[1].dependencies, vec!["s1"]);
        assert!(next.steps[2].step_id.starts_with("step-"));
        assert_eq!(next.steps[2].description, "Backfill data");
        assert_eq!(next.steps[3].description, "Run the tests");
    }

    #[test]
    fn test_supplied_step_fields_survive() {
        let update = PlanUpdate::new(
            Section::Steps,
            json!([{
                "stepId": "s9",
                "description": "Migrate",
                "riskLevel": "risky",
                "dependencies": ["s1"],
                "toolsToUse": ["write_file"],
                "expectedFiles": ["db.sql"]
            }]),
            Operation::Replace,
        );
        let step = &apply_update(&plan(), &update).unwrap().steps[0];
        assert_eq!(step.risk_level, RiskLevel::Risky);
        assert_eq!(step.dependencies, vec!["s1"]);
        assert_eq!(step.tools_to_use, vec!["write_file"]);
        assert_eq!(step.expected_files, vec!["db.sql"]);
    }

    #[test]
    fn test_missing_step_fields_default() {
        let step = normalize_step(&json!({"stepId": "s2", "description": "Tidy up", "riskLevel": "reckless"}));
        assert_eq!(step.risk_level, RiskLevel::Safe);
        assert!(step.dependencies.is_empty());
        assert!(step.tools_to_use.is_empty());
        assert!(step.expected_files.is_empty());
    }

    #[test]
    fn test_steps_from_text() {
        let update = PlanUpdate::new(Section::Steps, json!("1. Read the code\n2) Change it\n- Ship it\n\n"), Operation::Replace);
        let next = apply_update(&plan(), &update).unwrap();
        let descriptions: Vec<_> = next.steps.iter().map(|s| s.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Read the code", "Change it", "Ship it"]);
    }

    #[test]
    fn test_full_applies_known_fields_only() {
        let p = plan();
        let update = PlanUpdate::new(
            Section::Full,
            json!({
                "title": "Rewritten",
                "tags": "new",
                "planId": "hijack",
                "projectPath": "/elsewhere",
                "priority": "high"
            }),
            Operation::Replace,
        );
        let next = apply_update(&p, &update).unwrap();
        assert_eq!(next.title, "Rewritten");
        assert_eq!(next.tags, vec!["new"]);
        assert_eq!(next.summary, p.summary);
        assert_eq!(next.steps, p.steps);
        assert_eq!(next.plan_id, p.plan_id);
        assert_eq!(next.created_at, p.created_at);
        assert_eq!(next.project_path.as_deref(), Some("/work"));
    }

    #[test]
    fn test_apply_is_pure() {
        let p = plan();
        let update = PlanUpdate::new(Section::Tags, json!("y"), Operation::Append);
        let _ = apply_update(&p, &update).unwrap();
        assert_eq!(p.tags, vec!["x"]);
    }
}
