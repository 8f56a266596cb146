//! Role profiles: goal, backstory and tool set per agent role

use crate::domain::AgentRole;

/// Tools that only look at the workspace
pub const READ_TOOLS: &[&str] = &["read_file", "list_directory", "search"];

/// Tools that modify the workspace
pub const WRITE_TOOLS: &[&str] = &["write_file", "edit_file"];

pub fn is_read_tool(name: &str) -> bool {
    READ_TOOLS.contains(&name)
}

pub fn is_write_tool(name: &str) -> bool {
    WRITE_TOOLS.contains(&name)
}

/// Which tools a role may call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolProfile {
    /// Reading and searching only
    ReadOnly,
    /// Reading plus writing and editing files
    Full,
}

impl ToolProfile {
    pub fn tools(&self) -> Vec<&'static str> {
        match self {
            Self::ReadOnly => READ_TOOLS.to_vec(),
            Self::Full => READ_TOOLS.iter().chain(WRITE_TOOLS).copied().collect(),
        }
    }
}

/// Persona injected into a step's system prompt
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub role: AgentRole,
    pub goal: &'static str,
    pub backstory: &'static str,
    pub tool_profile: ToolProfile,
}

impl AgentProfile {
    pub fn for_role(role: AgentRole) -> Self {
        let (goal, backstory) = match role {
            AgentRole::Researcher => (
                "Gather the facts the rest of the plan depends on",
                "You read code carefully and report what is actually there, citing files and symbols.",
            ),
            AgentRole::Developer => (
                "Make the code change the step asks for",
                "You are a pragmatic engineer who makes small, correct changes that fit the surrounding code.",
            ),
            AgentRole::Reviewer => (
                "Find defects in the work done so far",
                "You review changes for correctness, edge cases and consistency with the codebase.",
            ),
            AgentRole::Tester => (
                "Prove the behaviour with tests",
                "You write focused tests that fail before a fix and pass after it.",
            ),
            AgentRole::Documenter => (
                "Explain the result clearly",
                "You turn technical findings into concise documentation a newcomer can follow.",
            ),
        };
        let tool_profile = if role.is_write_capable() {
            ToolProfile::Full
        } else {
            ToolProfile::ReadOnly
        };
        Self {
            role,
            goal,
            backstory,
            tool_profile,
        }
    }

    pub fn tools(&self) -> Vec<&'static str> {
        self.tool_profile.tools()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_tools_only_for_writers() {
        for role in AgentRole::ALL {
            let tools = AgentProfile::for_role(role).tools();
            assert!(tools.contains(&"read_file"));
            assert_eq!(tools.contains(&"write_file"), role.is_write_capable(), "{}", role);
        }
    }

    #[test]
    fn test_tool_classification() {
        assert!(is_read_tool("search"));
        assert!(!is_read_tool("write_file"));
        assert!(is_write_tool("edit_file"));
        assert!(!is_write_tool("run_command"));
    }
}
