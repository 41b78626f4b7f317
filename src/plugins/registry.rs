use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{Result, TripPlannerError};
use crate::interfaces::plugins::Tool;

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    agent_tools: RwLock<HashMap<String, HashSet<String>>>,
    config: RwLock<serde_json::Value>,
    audit_log_path: RwLock<Option<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            agent_tools: RwLock::new(HashMap::new()),
            config: RwLock::new(serde_json::Value::Object(Default::default())),
            audit_log_path: RwLock::new(None),
        }
    }

    pub async fn register_tool(&self, tool: Arc<dyn Tool>) -> bool {
        let config = self.config.read().await.clone();
        if let Err(err) = tool.configure(&config) {
            warn!(tool = tool.name(), error = %err, "Tool rejected configuration");
            return false;
        }
        let mut tools = self.tools.write().await;
        let name = tool.name().to_string();
        if tools.contains_key(&name) {
            return false;
        }
        tools.insert(name, tool);
        true
    }

    pub async fn assign_tool_to_agent(&self, agent_name: &str, tool_name: &str) -> bool {
        let tools = self.tools.read().await;
        if !tools.contains_key(tool_name) {
            return false;
        }
        let mut agent_tools = self.agent_tools.write().await;
        agent_tools
            .entry(agent_name.to_string())
            .or_default()
            .insert(tool_name.to_string());
        true
    }

    /// Tools assigned to `agent_name`, sorted by name for stable prompts.
    pub async fn get_agent_tools(&self, agent_name: &str) -> Vec<Arc<dyn Tool>> {
        let agent_tools = self.agent_tools.read().await;
        let tools = self.tools.read().await;
        let mut names: Vec<String> = agent_tools
            .get(agent_name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| tools.get(&name).cloned())
            .collect()
    }

    pub async fn configure_all_tools(&self, config: serde_json::Value) -> Result<()> {
        let audit_path = config
            .get("tools")
            .and_then(|v| v.get("settings"))
            .and_then(|v| v.get("audit_log_path"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        *self.audit_log_path.write().await = audit_path;
        *self.config.write().await = config.clone();

        let tools = self.tools.read().await;
        for tool in tools.values() {
            tool.configure(&config)
                .map_err(|e| TripPlannerError::Runtime(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn audit_tool_call(&self, agent: &str, tool_name: &str, status: &str) -> Result<()> {
        let path = self.audit_log_path.read().await.clone();
        let Some(path) = path else {
            return Ok(());
        };
        if let Some(parent) = Path::new(&path).parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TripPlannerError::Runtime(e.to_string()))?;
        }

        let payload = serde_json::json!({
            "timestamp": Utc::now().timestamp(),
            "agent": agent,
            "tool": tool_name,
            "status": status,
        });

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TripPlannerError::Runtime(e.to_string()))?;
        writeln!(file, "{payload}").map_err(|e| TripPlannerError::Runtime(e.to_string()))?;
        Ok(())
    }
}
