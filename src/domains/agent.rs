#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub tools: Vec<String>,
    pub allow_delegation: bool,
}

impl AgentProfile {
    pub fn new(role: &str, goal: &str, backstory: &str) -> Self {
        Self {
            role: role.to_string(),
            goal: goal.to_string(),
            backstory: backstory.to_string(),
            tools: Vec::new(),
            allow_delegation: false,
        }
    }

    pub fn with_tool(mut self, tool_name: &str) -> Self {
        if !self.tools.iter().any(|t| t == tool_name) {
            self.tools.push(tool_name.to_string());
        }
        self
    }

    pub fn with_delegation(mut self, allow: bool) -> Self {
        self.allow_delegation = allow;
        self
    }

    /// Loose comparison used when an LLM names a coworker.
    pub fn matches_role(&self, name: &str) -> bool {
        normalize_role(&self.role) == normalize_role(name)
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}. {}\nYour personal goal is: {}",
            self.role, self.backstory, self.goal
        )
    }
}

pub fn normalize_role(name: &str) -> String {
    name.trim()
        .trim_matches(|ch: char| matches!(ch, '"' | '\'' | '`' | '“' | '”'))
        .trim()
        .to_lowercase()
}
