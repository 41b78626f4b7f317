use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCalls, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionTool, ChatCompletionTools,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, FunctionCall, FunctionObject,
    },
    Client,
};

use crate::config::OpenAiConfig;
use crate::error::{Result, TripPlannerError};
use crate::interfaces::providers::{LlmProvider, LlmResponse, ProviderFactory, ToolCall};

const MAX_ATTEMPTS: u32 = 3;

enum ChatCreateResult {
    Parsed(CreateChatCompletionResponse),
    Raw(Value),
}

#[derive(Clone)]
pub struct OpenAiProvider {
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, settings: &OpenAiConfig) -> Self {
        let base_url = settings.base_url();
        let config = OpenAIConfig::new()
            .with_api_key(api_key.clone())
            .with_api_base(base_url.clone());
        Self {
            model: settings.model(),
            temperature: settings.temperature(),
            max_tokens: settings.max_tokens(),
            client: Client::with_config(config),
            http: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    fn is_openai_function_name(name: &str) -> bool {
        let trimmed = name.trim();
        !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    }

    fn is_truncated_json_body(body: &str) -> bool {
        let lower = body.to_ascii_lowercase();
        lower.contains("unexpected end of json")
            || lower.contains("unexpected end of input")
            || lower.contains("unexpected eof")
    }

    async fn raw_chat_completion(&self, request: &CreateChatCompletionRequest) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        for attempt in 0..MAX_ATTEMPTS {
            let response = self
                .http
                .post(url.clone())
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await
                .map_err(|e| {
                    TripPlannerError::Http(format!("Chat completion transport failed: {e}"))
                })?;
            let status = response.status();
            let body = response.text().await.map_err(|e| {
                TripPlannerError::Http(format!("Chat completion read failed: {e}"))
            })?;

            if status == StatusCode::OK {
                return serde_json::from_str(&body).map_err(|e| {
                    TripPlannerError::Serialization(format!("Chat completion decode failed: {e}"))
                });
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS
                || (status.is_server_error() && Self::is_truncated_json_body(&body));
            if retryable && attempt + 1 < MAX_ATTEMPTS {
                warn!(%status, attempt, "Retrying chat completion");
                tokio::time::sleep(Duration::from_millis(150 * u64::from(attempt + 1))).await;
                continue;
            }

            return Err(TripPlannerError::Http(format!(
                "Chat completion failed ({status}): {body}"
            )));
        }

        Err(TripPlannerError::Http(
            "Chat completion failed after retries".to_string(),
        ))
    }

    /// The raw path tolerates provider quirks the typed client rejects; the
    /// typed client is only tried when the raw body was cut short.
    async fn chat_create_with_fallback(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<ChatCreateResult> {
        match self.raw_chat_completion(&request).await {
            Ok(raw) => return Ok(ChatCreateResult::Raw(raw)),
            Err(TripPlannerError::Http(message)) if !Self::is_truncated_json_body(&message) => {
                return Err(TripPlannerError::Http(message));
            }
            Err(err) => debug!(error = %err, "Falling back to typed chat client"),
        }

        self.client
            .chat()
            .create(request)
            .await
            .map(ChatCreateResult::Parsed)
            .map_err(|err| TripPlannerError::Http(err.to_string()))
    }

    fn build_request(
        &self,
        prompt: &str,
        system_prompt: &str,
        tools: Vec<ChatCompletionTools>,
    ) -> Result<CreateChatCompletionRequest> {
        let mut messages = Vec::new();
        if let Some(system) = Self::build_system_message(system_prompt)? {
            messages.push(system);
        }
        messages.push(Self::build_user_text_message(prompt)?);

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(self.model.clone())
            .messages(messages)
            .temperature(self.temperature)
            .max_completion_tokens(self.max_tokens);
        if !tools.is_empty() {
            builder.tools(tools);
        }
        builder
            .build()
            .map_err(|e| TripPlannerError::Runtime(e.to_string()))
    }

    fn build_system_message(system_prompt: &str) -> Result<Option<ChatCompletionRequestMessage>> {
        if system_prompt.is_empty() {
            return Ok(None);
        }
        let message = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| TripPlannerError::Runtime(e.to_string()))?;
        Ok(Some(ChatCompletionRequestMessage::System(message)))
    }

    fn build_user_text_message(prompt: &str) -> Result<ChatCompletionRequestMessage> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Text(
                prompt.to_string(),
            ))
            .build()
            .map_err(|e| TripPlannerError::Runtime(e.to_string()))?;
        Ok(ChatCompletionRequestMessage::User(message))
    }

    fn convert_tools(tools: Vec<Value>) -> Vec<ChatCompletionTools> {
        tools
            .into_iter()
            .filter_map(|tool| {
                let tool_type = tool
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("function");
                if tool_type != "function" {
                    return None;
                }
                let function_obj = tool.get("function").cloned().unwrap_or(tool);
                let name = function_obj.get("name")?.as_str()?.trim().to_string();
                if !Self::is_openai_function_name(&name) {
                    warn!(tool_name = %name, "Skipping invalid OpenAI function tool name");
                    return None;
                }
                let description = function_obj
                    .get("description")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string());
                let parameters = function_obj
                    .get("parameters")
                    .cloned()
                    .filter(|value| value.is_object())
                    .unwrap_or_else(|| {
                        serde_json::json!({
                            "type": "object",
                            "properties": {},
                            "additionalProperties": true
                        })
                    });
                Some(ChatCompletionTools::Function(ChatCompletionTool {
                    function: FunctionObject {
                        name,
                        description,
                        parameters: Some(parameters),
                        strict: Some(false),
                    },
                }))
            })
            .collect()
    }

    fn parse_arguments(raw: Option<&Value>) -> Value {
        match raw {
            Some(Value::String(text)) => {
                serde_json::from_str(text).unwrap_or(Value::String(text.clone()))
            }
            Some(value) => value.clone(),
            None => Value::Null,
        }
    }

    fn extract_text_from_value(response: &Value) -> Option<String> {
        response
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|text| text.to_string())
    }

    fn extract_tool_calls_from_value(response: &Value) -> Vec<ToolCall> {
        let message = response
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|choice| choice.get("message"))
            .cloned()
            .unwrap_or(Value::Null);

        let Some(calls) = message.get("tool_calls").and_then(|calls| calls.as_array()) else {
            let legacy = message.get("function_call").and_then(|call| {
                let name = call.get("name")?.as_str()?.to_string();
                Some(ToolCall {
                    name,
                    arguments: Self::parse_arguments(call.get("arguments")),
                })
            });
            return legacy.into_iter().collect();
        };

        calls
            .iter()
            .filter_map(|call| {
                let function = call.get("function")?;
                Some(ToolCall {
                    name: function.get("name")?.as_str()?.to_string(),
                    arguments: Self::parse_arguments(function.get("arguments")),
                })
            })
            .collect()
    }

    fn extract_text_from_response(response: &CreateChatCompletionResponse) -> Result<String> {
        let message = response
            .choices
            .first()
            .ok_or_else(|| TripPlannerError::Runtime("No choices returned".to_string()))?
            .message
            .content
            .clone()
            .unwrap_or_default();
        Ok(message)
    }

    fn extract_tool_calls_from_response(response: &CreateChatCompletionResponse) -> Vec<ToolCall> {
        let mut calls = Vec::new();
        let Some(choice) = response.choices.first() else {
            return calls;
        };
        let message = &choice.message;
        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                if let ChatCompletionMessageToolCalls::Function(function_call) = call {
                    let args = function_call.function.arguments.clone();
                    calls.push(ToolCall {
                        name: function_call.function.name.clone(),
                        arguments: serde_json::from_str(&args).unwrap_or(Value::String(args)),
                    });
                }
            }
        }

        if calls.is_empty() {
            #[allow(deprecated)]
            if let Some(FunctionCall { name, arguments }) = &message.function_call {
                calls.push(ToolCall {
                    name: name.clone(),
                    arguments: serde_json::from_str(arguments)
                        .unwrap_or(Value::String(arguments.clone())),
                });
            }
        }

        calls
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate_text(&self, prompt: &str, system_prompt: &str) -> Result<String> {
        let request = self.build_request(prompt, system_prompt, Vec::new())?;
        match self.chat_create_with_fallback(request).await? {
            ChatCreateResult::Parsed(parsed) => Self::extract_text_from_response(&parsed),
            ChatCreateResult::Raw(raw) => Self::extract_text_from_value(&raw)
                .ok_or_else(|| TripPlannerError::Runtime("Empty chat response".to_string())),
        }
    }

    async fn generate_with_tools(
        &self,
        prompt: &str,
        system_prompt: &str,
        tools: Vec<Value>,
    ) -> Result<LlmResponse> {
        let request = self.build_request(prompt, system_prompt, Self::convert_tools(tools))?;
        let (text, tool_calls) = match self.chat_create_with_fallback(request).await? {
            ChatCreateResult::Parsed(parsed) => (
                Self::extract_text_from_response(&parsed).unwrap_or_default(),
                Self::extract_tool_calls_from_response(&parsed),
            ),
            ChatCreateResult::Raw(raw) => (
                Self::extract_text_from_value(&raw).unwrap_or_default(),
                Self::extract_tool_calls_from_value(&raw),
            ),
        };
        Ok(LlmResponse { text, tool_calls })
    }
}

/// Creates an `OpenAiProvider` per request from shared settings.
#[derive(Debug, Clone, Default)]
pub struct OpenAiProviderFactory {
    settings: OpenAiConfig,
}

impl OpenAiProviderFactory {
    pub fn new(settings: OpenAiConfig) -> Self {
        Self { settings }
    }
}

impl ProviderFactory for OpenAiProviderFactory {
    fn create(&self, api_key: &str) -> Result<Arc<dyn LlmProvider>> {
        if api_key.trim().is_empty() {
            return Err(TripPlannerError::Config(
                "OpenAI API key is required".to_string(),
            ));
        }
        Ok(Arc::new(OpenAiProvider::new(
            api_key.trim().to_string(),
            &self.settings,
        )))
    }
}
