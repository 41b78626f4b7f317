use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::domains::crew::TaskSpec;
use crate::error::Result;
use crate::interfaces::plugins::Tool;
use crate::services::agent::AgentService;

pub const DELEGATE_WORK_TOOL: &str = "delegate_work_to_coworker";
pub const ASK_QUESTION_TOOL: &str = "ask_question_to_coworker";

const COWORKER_EXPECTED_OUTPUT: &str =
    "Your best answer to your coworker asking you this, accounting for the context shared.";

/// The set of agents a manager may hand work to.
#[derive(Clone)]
pub struct Coworkers {
    agents: Vec<Arc<AgentService>>,
}

impl Coworkers {
    pub fn new(agents: Vec<Arc<AgentService>>) -> Self {
        Self { agents }
    }

    pub fn roles(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.role().to_string()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&Arc<AgentService>> {
        self.agents.iter().find(|a| a.agent().matches_role(name))
    }

    /// Both manager tools over the same coworkers.
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![
            Arc::new(DelegateWorkTool::new(self.clone())) as Arc<dyn Tool>,
            Arc::new(AskQuestionTool::new(self.clone())),
        ]
    }

    async fn dispatch(&self, tool: &str, ask: &str, context: &str, coworker: &str) -> Result<Value> {
        if ask.is_empty() {
            return Ok(json!({
                "status": "error",
                "message": format!("{tool} needs a non-empty task or question"),
            }));
        }
        let Some(agent) = self.find(coworker) else {
            return Ok(json!({
                "status": "error",
                "message": format!(
                    "Coworker mentioned not found, it must be one of the following options: {}",
                    self.roles().join(", ")
                ),
                "coworkers": self.roles(),
            }));
        };

        info!(tool, coworker = %agent.role(), "Handing work to coworker");
        let task = TaskSpec::new(ask, COWORKER_EXPECTED_OUTPUT).assigned_to(agent.role());
        let answer = agent.execute_task(&task, Some(context)).await?;
        Ok(json!({
            "status": "success",
            "coworker": agent.role(),
            "result": answer,
        }))
    }

    fn describe(&self, verb: &str) -> String {
        format!(
            "{verb} The input must include every piece of context the coworker needs, since they know nothing beyond what you send. Available coworkers: {}.",
            self.roles().join(", ")
        )
    }
}

fn text_arg(params: &Value, key: &str) -> String {
    match params.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub struct DelegateWorkTool {
    coworkers: Coworkers,
    description: String,
}

impl DelegateWorkTool {
    pub fn new(coworkers: Coworkers) -> Self {
        let description =
            coworkers.describe("Delegate a specific task to one of your coworkers.");
        Self {
            coworkers,
            description,
        }
    }
}

#[async_trait]
impl Tool for DelegateWorkTool {
    fn name(&self) -> &str {
        DELEGATE_WORK_TOOL
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {"type": "string", "description": "The task to delegate"},
                "context": {"type": "string", "description": "The context for the task"},
                "coworker": {"type": "string", "description": "The role of the coworker to delegate to"}
            },
            "required": ["task", "context", "coworker"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let task = text_arg(&params, "task");
        let context = text_arg(&params, "context");
        let coworker = text_arg(&params, "coworker");
        self.coworkers
            .dispatch(DELEGATE_WORK_TOOL, &task, &context, &coworker)
            .await
    }
}

pub struct AskQuestionTool {
    coworkers: Coworkers,
    description: String,
}

impl AskQuestionTool {
    pub fn new(coworkers: Coworkers) -> Self {
        let description = coworkers.describe("Ask a specific question to one of your coworkers.");
        Self {
            coworkers,
            description,
        }
    }
}

#[async_trait]
impl Tool for AskQuestionTool {
    fn name(&self) -> &str {
        ASK_QUESTION_TOOL
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {"type": "string", "description": "The question to ask"},
                "context": {"type": "string", "description": "The context for the question"},
                "coworker": {"type": "string", "description": "The role of the coworker to ask"}
            },
            "required": ["question", "context", "coworker"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let question = text_arg(&params, "question");
        let context = text_arg(&params, "context");
        let coworker = text_arg(&params, "coworker");
        self.coworkers
            .dispatch(ASK_QUESTION_TOOL, &question, &context, &coworker)
            .await
    }
}
