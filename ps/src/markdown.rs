//! Human-readable plan rendering
//!
//! The `.md` file next to each project plan is a denormalized view; the JSON
//! file is the source of truth.

use crate::SavedPlan;

/// Render a plan as markdown
pub fn render_markdown(plan: &SavedPlan) -> String {
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", plan.title));

    md.push_str(&format!("- **Plan ID:** {}\n", plan.plan_id));
    md.push_str(&format!("- **Type:** {}\n", plan.plan_type));
    md.push_str(&format!("- **Created:** {}\n", plan.created_at.format("%Y-%m-%d %H:%M:%S UTC")));
    if let Some(edited) = plan.last_edited_at {
        md.push_str(&format!("- **Last edited:** {}\n", edited.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    if let Some(version) = plan.version {
        md.push_str(&format!("- **Version:** {}\n", version));
    }
    if let Some(project) = &plan.project_path {
        md.push_str(&format!("- **Project:** {}\n", project));
    }
    md.push('\n');

    if !plan.summary.is_empty() {
        md.push_str("## Summary\n\n");
        md.push_str(&format!("{}\n\n", plan.summary));
    }

    md.push_str("## Steps\n\n");
    if plan.steps.is_empty() {
        md.push_str("_No steps yet._\n\n");
    }
    for (idx, step) in plan.steps.iter().enumerate() {
        md.push_str(&format!("{}. {} _(risk: {})_\n", idx + 1, step.description, step.risk_level));
        if let Some(role) = &step.agent_role {
            md.push_str(&format!("   - Agent: {}\n", role));
        }
        if !step.tools_to_use.is_empty() {
            md.push_str(&format!("   - Tools: {}\n", step.tools_to_use.join(", ")));
        }
        if !step.expected_files.is_empty() {
            md.push_str(&format!("   - Files: {}\n", step.expected_files.join(", ")));
        }
        if !step.dependencies.is_empty() {
            md.push_str(&format!("   - Depends on: {}\n", step.dependencies.join(", ")));
        }
    }
    md.push('\n');

    if !plan.tags.is_empty() {
        md.push_str("## Tags\n\n");
        let tags: Vec<String> = plan.tags.iter().map(|t| format!("`{}`", t)).collect();
        md.push_str(&format!("{}\n", tags.join(" ")));
    }

    md
}
