use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::config::DEFAULT_MAX_ITERATIONS;
use crate::domains::agent::AgentProfile;
use crate::domains::crew::TaskSpec;
use crate::error::{Result, TripPlannerError};
use crate::interfaces::callbacks::CallbackHandler;
use crate::interfaces::plugins::Tool;
use crate::interfaces::providers::{LlmProvider, ToolCall};
use crate::plugins::registry::ToolRegistry;

pub const REPEATED_INPUT_MESSAGE: &str =
    "I tried reusing the same input, I must stop using this action input. I'll try something else instead.";

static BEARER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bearer\s+[a-z0-9._\-]+").expect("valid bearer regex"));
static KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(sk-)[A-Za-z0-9_\-]{6,}").expect("valid key regex"));
static FINAL_ANSWER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^.*?final answer\s*:\s*").expect("valid final answer regex"));

/// Runs one agent against one task, looping through tool calls until the
/// model answers in plain text.
pub struct AgentService {
    llm_provider: Arc<dyn LlmProvider>,
    pub tool_registry: Arc<ToolRegistry>,
    agent: AgentProfile,
    callbacks: Vec<Arc<dyn CallbackHandler>>,
    max_iterations: usize,
}

impl AgentService {
    pub fn new(
        llm_provider: Arc<dyn LlmProvider>,
        agent: AgentProfile,
        tool_registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            llm_provider,
            tool_registry,
            agent,
            callbacks: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_callback(mut self, handler: Arc<dyn CallbackHandler>) -> Self {
        self.callbacks.push(handler);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn agent(&self) -> &AgentProfile {
        &self.agent
    }

    pub fn role(&self) -> &str {
        &self.agent.role
    }

    pub async fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tool_registry.get_agent_tools(&self.agent.role).await
    }

    pub async fn execute_task(&self, task: &TaskSpec, context: Option<&str>) -> Result<String> {
        self.execute_task_with_tools(task, context, Vec::new()).await
    }

    /// `extra_tools` are offered for this run only, on top of the agent's
    /// registered tools.
    #[instrument(skip_all, fields(agent = %self.agent.role))]
    pub async fn execute_task_with_tools(
        &self,
        task: &TaskSpec,
        context: Option<&str>,
        extra_tools: Vec<Arc<dyn Tool>>,
    ) -> Result<String> {
        let input = task.prompt(context);
        for handler in &self.callbacks {
            handler.on_chain_start(&input);
        }

        let mut tools = self.tools().await;
        for tool in extra_tools {
            if !tools.iter().any(|t| t.name() == tool.name()) {
                tools.push(tool);
            }
        }

        let system_prompt = self.agent.system_prompt();
        let output = self.run_tool_loop(&system_prompt, &input, &tools).await?;

        for handler in &self.callbacks {
            handler.on_chain_end(&output);
        }
        Ok(output)
    }

    async fn run_tool_loop(
        &self,
        system_prompt: &str,
        initial_prompt: &str,
        tools: &[Arc<dyn Tool>],
    ) -> Result<String> {
        let mut prompt = initial_prompt.to_string();
        let tool_specs: Vec<Value> = tools.iter().map(|tool| tool.spec()).collect();

        if !tools.is_empty() {
            let names = tools.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ");
            prompt.push_str(&format!(
                "\n\nAVAILABLE TOOLS (use ONLY these exact names): {names}\n"
            ));
            for tool in tools {
                prompt.push_str(&format!("- {}: {}\n", tool.name(), tool.description().trim()));
            }
            prompt.push_str(
                "Use tools as needed, then reply with your complete final answer as plain text.\n",
            );
        }

        let mut seen_calls = HashSet::new();
        for iteration in 0..self.max_iterations {
            let response = self
                .llm_provider
                .generate_with_tools(&prompt, system_prompt, tool_specs.clone())
                .await?;
            debug!(
                iteration,
                tool_calls = response.tool_calls.len(),
                "Agent step"
            );

            if response.tool_calls.is_empty() {
                if !response.text.trim().is_empty() {
                    return Ok(strip_final_answer_marker(&response.text));
                }
                prompt.push_str(
                    "\n\nSYSTEM CORRECTION:\nYour last reply was empty. Reply with your final answer now.\n",
                );
                continue;
            }

            let results = self
                .execute_tool_calls(&response.tool_calls, tools, &mut seen_calls)
                .await?;
            let serialized = serde_json::to_string_pretty(&results)?;
            prompt.push_str("\n\nOBSERVATION:\n");
            prompt.push_str(&serialized);
            prompt.push_str("\n\nContinue. If you have everything you need, give your final answer.\n");
        }

        prompt.push_str(
            "\n\nYou have reached the maximum number of steps. Stop using tools and give your best final answer now.\n",
        );
        let text = self.llm_provider.generate_text(&prompt, system_prompt).await?;
        if text.trim().is_empty() {
            return Err(TripPlannerError::Runtime(format!(
                "{} produced no final answer",
                self.agent.role
            )));
        }
        Ok(strip_final_answer_marker(&text))
    }

    async fn execute_tool_calls(
        &self,
        calls: &[ToolCall],
        tools: &[Arc<dyn Tool>],
        seen_calls: &mut HashSet<String>,
    ) -> Result<Vec<Value>> {
        let mut results = Vec::new();
        for call in calls {
            let name = normalize_tool_name(&call.name);
            let mut args = call.arguments.clone();
            normalize_tool_arguments(&mut args);
            let redacted_args = redact_value(&args);

            let fingerprint = format!("{name}:{}", serde_json::to_string(&args)?);
            if !seen_calls.insert(fingerprint) {
                self.record_tool_status(&name, "repeated").await;
                results.push(json!({
                    "tool": name,
                    "status": "skipped",
                    "message": REPEATED_INPUT_MESSAGE,
                }));
                continue;
            }

            let Some(tool) = tools.iter().find(|t| t.name() == name) else {
                self.record_tool_status(&name, "not_found").await;
                results.push(json!({
                    "tool": name,
                    "status": "error",
                    "message": "Tool not found",
                    "available_tools": tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
                }));
                continue;
            };

            info!(
                agent = %self.agent.role,
                tool = %name,
                args = %serde_json::to_string(&redacted_args).unwrap_or_default(),
                "Tool call"
            );
            match tool.execute(args).await {
                Ok(result) => {
                    let status = result
                        .get("status")
                        .and_then(|v| v.as_str())
                        .filter(|s| s.eq_ignore_ascii_case("error"))
                        .map(|_| "error")
                        .unwrap_or("success");
                    self.record_tool_status(&name, status).await;
                    results.push(json!({
                        "tool": name,
                        "status": status,
                        "result": result,
                    }));
                }
                Err(err) => {
                    let message = redact_string(&err.to_string());
                    self.record_tool_status(&name, "error").await;
                    results.push(json!({
                        "tool": name,
                        "status": "error",
                        "error": message,
                    }));
                }
            }
        }
        Ok(results)
    }

    async fn record_tool_status(&self, tool: &str, status: &str) {
        info!(agent = %self.agent.role, tool, status, "Tool result");
        if let Err(err) = self
            .tool_registry
            .audit_tool_call(&self.agent.role, tool, status)
            .await
        {
            debug!(error = %err, "Could not write tool audit entry");
        }
        for handler in &self.callbacks {
            handler.on_tool_result(tool, status);
        }
    }
}

pub fn strip_final_answer_marker(text: &str) -> String {
    FINAL_ANSWER_RE.replace(text.trim(), "").trim().to_string()
}

fn normalize_tool_name(name: &str) -> String {
    let candidate = name.trim().lines().next().unwrap_or_default();
    candidate
        .trim_matches(|ch: char| {
            matches!(
                ch,
                '"' | '\'' | '`' | '“' | '”' | '[' | ']' | '(' | ')' | '{' | '}' | '<' | '>' | ':'
            )
        })
        .trim()
        .to_string()
}

/// Some models nest the real arguments one level down.
fn normalize_tool_arguments(args: &mut Value) {
    let Some(map) = args.as_object_mut() else {
        return;
    };

    let nested = map
        .get("parameters")
        .or_else(|| map.get("args"))
        .or_else(|| map.get("arguments"))
        .cloned();

    let Some(Value::Object(nested_map)) = nested else {
        return;
    };

    for (key, value) in nested_map {
        map.entry(key).or_insert(value);
    }

    map.remove("parameters");
    map.remove("args");
    map.remove("arguments");
}

fn redact_string(input: &str) -> String {
    let out = BEARER_RE.replace_all(input, "Bearer [REDACTED]");
    KEY_RE.replace_all(&out, "$1[REDACTED]").to_string()
}

fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(v) => Value::String(redact_string(v)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = if is_sensitive_key(key) {
                        Value::String("[REDACTED]".to_string())
                    } else {
                        redact_value(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.contains("authorization")
        || lower.contains("api_key")
        || lower.contains("apikey")
        || lower.contains("token")
        || lower.contains("secret")
        || lower.contains("password")
}
