use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::domains::crew::Process;
use crate::error::{Result, TripPlannerError};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 1500;
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl OpenAiConfig {
    pub fn model(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CrewConfig {
    pub process: Option<Process>,
    pub max_iterations: Option<usize>,
}

impl CrewConfig {
    pub fn process(&self) -> Process {
        self.process.unwrap_or(Process::Hierarchical)
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS).max(1)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub openai: Option<OpenAiConfig>,
    pub crew: Option<CrewConfig>,
    pub server: Option<ServerConfig>,
    pub tools: Option<Value>,
}

impl Config {
    fn apply_security_defaults(mut self) -> Self {
        let tools = self.tools.get_or_insert_with(|| Value::Object(Map::new()));
        if let Some(tools_obj) = tools.as_object_mut() {
            let settings = tools_obj
                .entry("settings")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(settings_obj) = settings.as_object_mut() {
                let permissions = settings_obj
                    .entry("permissions")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Some(perms_obj) = permissions.as_object_mut() {
                    perms_obj
                        .entry("default_deny")
                        .or_insert_with(|| Value::Bool(true));
                    perms_obj.entry("network_allow").or_insert_with(|| {
                        Value::Array(vec![
                            Value::String("localhost".to_string()),
                            Value::String("127.0.0.1".to_string()),
                            Value::String("api.openai.com".to_string()),
                            Value::String("*.duckduckgo.com".to_string()),
                        ])
                    });
                }
            }
        }
        self
    }

    pub fn convention_defaults() -> Self {
        Self {
            openai: Some(OpenAiConfig {
                api_key: None,
                model: Some(DEFAULT_MODEL.to_string()),
                base_url: Some(DEFAULT_BASE_URL.to_string()),
                temperature: Some(DEFAULT_TEMPERATURE),
                max_tokens: Some(DEFAULT_MAX_TOKENS),
            }),
            crew: Some(CrewConfig {
                process: Some(Process::Hierarchical),
                max_iterations: Some(DEFAULT_MAX_ITERATIONS),
            }),
            server: Some(ServerConfig {
                host: Some("127.0.0.1".to_string()),
                port: Some(8501),
            }),
            tools: Some(serde_json::json!({
                "web_search": {"max_results": 5, "timeout_seconds": 20}
            })),
        }
        .apply_security_defaults()
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(raw).map_err(|e| TripPlannerError::Config(e.to_string()))?;
        Ok(config.apply_security_defaults())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            TripPlannerError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Loads `path` when given, otherwise the convention defaults, then
    /// applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::convention_defaults(),
        };
        Ok(config.apply_env(|name| std::env::var(name).ok()))
    }

    pub fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai = self.openai.get_or_insert_with(OpenAiConfig::default);
        if openai.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
                openai.api_key = Some(key);
            }
        }
        if let Some(base_url) = lookup("OPENAI_BASE_URL").filter(|u| !u.trim().is_empty()) {
            openai.base_url = Some(base_url);
        }
        self
    }

    pub fn openai(&self) -> OpenAiConfig {
        self.openai.clone().unwrap_or_default()
    }

    pub fn crew(&self) -> CrewConfig {
        self.crew.clone().unwrap_or_default()
    }

    pub fn server_addr(&self) -> (String, u16) {
        let server = self.server.clone().unwrap_or_default();
        (
            server.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            server.port.unwrap_or(8501),
        )
    }

    /// Root JSON handed to `Tool::configure`. Never carries the API key.
    pub fn tool_config_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()));
        if let Some(openai) = value.get_mut("openai").and_then(Value::as_object_mut) {
            openai.remove("api_key");
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convention_defaults_match_planner_llm_settings() {
        let config = Config::convention_defaults();
        let openai = config.openai();
        assert_eq!(openai.model(), "gpt-4o-mini");
        assert!((openai.temperature() - 0.2).abs() < f32::EPSILON);
        assert_eq!(openai.max_tokens(), 1500);
        assert_eq!(config.crew().process(), Process::Hierarchical);
    }

    #[test]
    fn security_defaults_allow_search_and_openai_hosts() {
        let config = Config::convention_defaults();
        let perms = config
            .tools
            .as_ref()
            .and_then(|tools| tools.get("settings"))
            .and_then(|settings| settings.get("permissions"))
            .expect("permissions should exist");
        assert_eq!(perms["default_deny"], Value::Bool(true));
        let allow = perms["network_allow"].as_array().expect("allowlist");
        assert!(allow.iter().any(|v| v == "*.duckduckgo.com"));
        assert!(allow.iter().any(|v| v == "api.openai.com"));
    }

    #[test]
    fn explicit_permissions_are_not_overwritten() {
        let config = Config::from_json_str(
            r#"{"tools": {"settings": {"permissions": {"default_deny": false}}}}"#,
        )
        .unwrap();
        let perms = &config.tools.unwrap()["settings"]["permissions"];
        assert_eq!(perms["default_deny"], Value::Bool(false));
        assert!(perms["network_allow"].is_array());
    }

    #[test]
    fn env_overrides_fill_missing_key_only() {
        let config = Config::default().apply_env(|name| match name {
            "OPENAI_API_KEY" => Some("env-key".to_string()),
            _ => None,
        });
        assert_eq!(config.openai().api_key.as_deref(), Some("env-key"));

        let mut explicit = Config::default();
        explicit.openai = Some(OpenAiConfig {
            api_key: Some("file-key".to_string()),
            ..Default::default()
        });
        let explicit = explicit.apply_env(|_| Some("env-key".to_string()));
        assert_eq!(explicit.openai().api_key.as_deref(), Some("file-key"));
        assert_eq!(explicit.openai().base_url(), "env-key");
    }

    #[test]
    fn tool_config_never_exposes_api_key() {
        let config = Config::convention_defaults().apply_env(|name| match name {
            "OPENAI_API_KEY" => Some("sk-secret".to_string()),
            _ => None,
        });
        let value = config.tool_config_value();
        assert!(value["openai"].get("api_key").is_none());
        assert_eq!(value["tools"]["web_search"]["max_results"], Value::from(5));
    }

    #[test]
    fn invalid_json_is_config_error() {
        let err = Config::from_json_str("{bad}").unwrap_err();
        assert!(matches!(err, TripPlannerError::Config(_)));
    }

    #[test]
    fn process_parses_lowercase() {
        let config = Config::from_json_str(r#"{"crew": {"process": "sequential"}}"#).unwrap();
        assert_eq!(config.crew().process(), Process::Sequential);
        assert_eq!(config.crew().max_iterations(), DEFAULT_MAX_ITERATIONS);
    }
}
