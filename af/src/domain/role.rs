//! Agent roles

use serde::{Deserialize, Serialize};

/// The specialist an individual step is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Researcher,
    Developer,
    Reviewer,
    Tester,
    Documenter,
}

impl AgentRole {
    pub const ALL: [AgentRole; 5] = [
        Self::Researcher,
        Self::Developer,
        Self::Reviewer,
        Self::Tester,
        Self::Documenter,
    ];

    /// Roles whose tools can modify the workspace
    pub fn is_write_capable(&self) -> bool {
        matches!(self, Self::Developer | Self::Tester)
    }

    /// Best-guess role for a step that arrived without one
    pub fn infer(description: &str) -> Self {
        let text = description.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| text.contains(w));

        if has(&["test", "spec", "coverage"]) {
            Self::Tester
        } else if has(&["review", "verify", "audit", "check"]) {
            Self::Reviewer
        } else if has(&["document", "docs", "readme", "changelog", "explain"]) {
            Self::Documenter
        } else if has(&["research", "investigate", "analyze", "analyse", "understand", "locate", "find", "read"]) {
            Self::Researcher
        } else {
            Self::Developer
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Researcher => write!(f, "researcher"),
            Self::Developer => write!(f, "developer"),
            Self::Reviewer => write!(f, "reviewer"),
            Self::Tester => write!(f, "tester"),
            Self::Documenter => write!(f, "documenter"),
        }
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "researcher" => Ok(Self::Researcher),
            "developer" => Ok(Self::Developer),
            "reviewer" => Ok(Self::Reviewer),
            "tester" => Ok(Self::Tester),
            "documenter" => Ok(Self::Documenter),
            other => Err(format!("unknown agent role '{}'", other)),
        }
    }
}
