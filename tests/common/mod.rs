#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use trip_planner::error::{Result, TripPlannerError};
use trip_planner::interfaces::callbacks::CallbackHandler;
use trip_planner::interfaces::plugins::Tool;
use trip_planner::interfaces::providers::{LlmProvider, LlmResponse, ProviderFactory, ToolCall};

/// Replays scripted responses in order and records every prompt it sees.
#[derive(Default)]
pub struct QueueLlmProvider {
    responses: Mutex<VecDeque<LlmResponse>>,
    pub prompts: Mutex<Vec<String>>,
    pub system_prompts: Mutex<Vec<String>>,
    pub tool_names: Mutex<Vec<Vec<String>>>,
}

impl QueueLlmProvider {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    fn next(&self, prompt: &str, system_prompt: &str) -> Result<LlmResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.system_prompts
            .lock()
            .unwrap()
            .push(system_prompt.to_string());
        self.responses.lock().unwrap().pop_front().ok_or_else(|| {
            TripPlannerError::Http("Chat completion failed (401 Unauthorized): invalid key".into())
        })
    }
}

#[async_trait]
impl LlmProvider for QueueLlmProvider {
    async fn generate_text(&self, prompt: &str, system_prompt: &str) -> Result<String> {
        Ok(self.next(prompt, system_prompt)?.text)
    }

    async fn generate_with_tools(
        &self,
        prompt: &str,
        system_prompt: &str,
        tools: Vec<Value>,
    ) -> Result<LlmResponse> {
        let names = tools
            .iter()
            .filter_map(|t| t.get("name").and_then(|n| n.as_str()).map(str::to_string))
            .collect();
        self.tool_names.lock().unwrap().push(names);
        self.next(prompt, system_prompt)
    }
}

/// Hands out the same queue provider for every key and remembers the keys.
pub struct QueueProviderFactory {
    pub provider: Arc<QueueLlmProvider>,
    pub keys: Mutex<Vec<String>>,
}

impl QueueProviderFactory {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            provider: Arc::new(QueueLlmProvider::new(responses)),
            keys: Mutex::new(Vec::new()),
        }
    }
}

impl ProviderFactory for QueueProviderFactory {
    fn create(&self, api_key: &str) -> Result<Arc<dyn LlmProvider>> {
        self.keys.lock().unwrap().push(api_key.to_string());
        Ok(self.provider.clone())
    }
}

pub fn text(answer: &str) -> LlmResponse {
    LlmResponse {
        text: answer.to_string(),
        tool_calls: Vec::new(),
    }
}

pub fn call(name: &str, arguments: Value) -> LlmResponse {
    LlmResponse {
        text: String::new(),
        tool_calls: vec![ToolCall {
            name: name.to_string(),
            arguments,
        }],
    }
}

/// Records its arguments and answers with a fixed payload.
pub struct RecordingTool {
    name: String,
    result: Value,
    pub calls: Mutex<Vec<Value>>,
}

impl RecordingTool {
    pub fn new(name: &str, result: Value) -> Self {
        Self {
            name: name.to_string(),
            result,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "recording"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        self.calls.lock().unwrap().push(params);
        Ok(self.result.clone())
    }
}

pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "flaky"
    }

    fn description(&self) -> &str {
        "always fails"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value) -> Result<Value> {
        Err(TripPlannerError::Http(
            "upstream refused Bearer abc.def".to_string(),
        ))
    }
}

#[derive(Default)]
pub struct RecordingHandler {
    pub events: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl CallbackHandler for RecordingHandler {
    fn on_chain_start(&self, input: &str) {
        self.events.lock().unwrap().push(format!("start:{input}"));
    }

    fn on_chain_end(&self, output: &str) {
        self.events.lock().unwrap().push(format!("end:{output}"));
    }

    fn on_tool_result(&self, tool: &str, status: &str) {
        self.events.lock().unwrap().push(format!("tool:{tool}:{status}"));
    }
}
