use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Result, TripPlannerError};
use crate::interfaces::plugins::Tool;

pub const WEB_SEARCH_TOOL: &str = "web_search";
pub const NO_RESULTS_MESSAGE: &str = "No good DuckDuckGo Search Result was found";
const DEFAULT_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = concat!("trip-planner/", env!("CARGO_PKG_VERSION"));

static RESULT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".result").expect("valid result selector"));
static RESULT_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.result__a").expect("valid result link selector"));
static RESULT_SNIPPET_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".result__snippet").expect("valid snippet selector"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid space regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone)]
struct WebSearchState {
    endpoint: String,
    region: Option<String>,
    max_results: usize,
    timeout_seconds: u64,
    network_allow: Vec<String>,
    default_deny: bool,
}

impl Default for WebSearchState {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            region: None,
            max_results: 5,
            timeout_seconds: 20,
            network_allow: Vec::new(),
            default_deny: false,
        }
    }
}

/// DuckDuckGo web search over the keyless HTML endpoint.
pub struct WebSearchTool {
    state: Mutex<WebSearchState>,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WebSearchState::default()),
        }
    }

    fn snapshot(&self) -> WebSearchState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    fn parse_allowlist(value: &Value) -> Vec<String> {
        value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn is_domain_allowed(domain: &str, allowlist: &[String], default_deny: bool) -> bool {
        if allowlist.iter().any(|entry| entry == "*") {
            return true;
        }
        if allowlist.is_empty() {
            return !default_deny;
        }
        allowlist.iter().any(|entry| {
            if entry == domain {
                return true;
            }
            match entry.strip_prefix("*.") {
                Some(suffix) => domain == suffix || domain.ends_with(&format!(".{suffix}")),
                None => false,
            }
        })
    }

    fn extract_query(params: &Value) -> Option<String> {
        params
            .get("query")
            .or_else(|| params.get("search_query"))
            .and_then(|v| v.as_str())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn element_text(element: ElementRef<'_>) -> String {
        let text = element.text().collect::<String>();
        SPACE_RE.replace_all(text.trim(), " ").to_string()
    }

    /// Result links are DuckDuckGo redirects carrying the target in `uddg`.
    fn resolve_link(href: &str) -> String {
        let href = href.replace("&amp;", "&");
        let absolute = if href.starts_with("//") {
            format!("https:{href}")
        } else {
            href.clone()
        };
        Url::parse(&absolute)
            .ok()
            .and_then(|url| {
                url.query_pairs()
                    .find(|(key, _)| key == "uddg")
                    .map(|(_, value)| value.into_owned())
            })
            .unwrap_or(href)
    }

    /// Each `.result` block yields one hit built only from its own link and snippet.
    pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
        let document = Html::parse_document(html);
        document
            .select(&RESULT_SELECTOR)
            .filter_map(|block| {
                let link = block.select(&RESULT_LINK_SELECTOR).next()?;
                let snippet = block
                    .select(&RESULT_SNIPPET_SELECTOR)
                    .next()
                    .map(Self::element_text)
                    .unwrap_or_default();
                Some(SearchHit {
                    title: Self::element_text(link),
                    url: link
                        .value()
                        .attr("href")
                        .map(Self::resolve_link)
                        .unwrap_or_default(),
                    snippet,
                })
            })
            .filter(|hit| !hit.title.is_empty() || !hit.snippet.is_empty())
            .take(max_results)
            .collect()
    }

    fn summarize(hits: &[SearchHit]) -> String {
        let joined = hits
            .iter()
            .map(|hit| hit.snippet.as_str())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            NO_RESULTS_MESSAGE.to_string()
        } else {
            joined
        }
    }

    async fn search(&self, query: &str, state: &WebSearchState) -> Result<Value> {
        let url = Url::parse(&state.endpoint)
            .map_err(|e| TripPlannerError::Config(format!("invalid search endpoint: {e}")))?;
        let host = url.host_str().unwrap_or_default().to_string();
        if !Self::is_domain_allowed(&host, &state.network_allow, state.default_deny) {
            return Ok(json!({
                "status": "error",
                "message": format!("Network access denied for {host}"),
            }));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(state.timeout_seconds.max(1)))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TripPlannerError::Http(e.to_string()))?;

        let mut params = vec![("q", query.to_string())];
        if let Some(region) = &state.region {
            params.push(("kl", region.clone()));
        }

        let response = match client.get(url).query(&params).send().await {
            Ok(resp) => resp,
            Err(err) => {
                return Ok(json!({
                    "status": "error",
                    "message": "DuckDuckGo request failed",
                    "details": err.to_string(),
                }))
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Ok(json!({
                "status": "error",
                "message": format!("Failed to search: {status}"),
            }));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TripPlannerError::Http(e.to_string()))?;
        let hits = Self::parse_results(&body, state.max_results);
        debug!(query, hits = hits.len(), "DuckDuckGo search finished");

        Ok(json!({
            "status": "success",
            "result": Self::summarize(&hits),
            "results": hits,
        }))
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search the web with DuckDuckGo for current information such as events, prices, weather and travel deals."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query text"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    fn configure(&self, config: &Value) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| TripPlannerError::Runtime("Failed to lock tool state".to_string()))?;

        let tools = config.get("tools");
        if let Some(perms) = tools
            .and_then(|t| t.get("settings"))
            .and_then(|s| s.get("permissions"))
        {
            if let Some(default_deny) = perms.get("default_deny").and_then(|v| v.as_bool()) {
                state.default_deny = default_deny;
            }
            if let Some(allow) = perms.get("network_allow") {
                state.network_allow = Self::parse_allowlist(allow);
            }
        }

        if let Some(tool_cfg) = tools.and_then(|t| t.get(WEB_SEARCH_TOOL)) {
            if let Some(allow) = tool_cfg
                .get("permissions")
                .and_then(|p| p.get("network_allow"))
            {
                state.network_allow = Self::parse_allowlist(allow);
            }
            if let Some(endpoint) = tool_cfg.get("endpoint").and_then(|v| v.as_str()) {
                state.endpoint = endpoint.to_string();
            }
            if let Some(region) = tool_cfg.get("region").and_then(|v| v.as_str()) {
                state.region = Some(region.to_string()).filter(|r| !r.trim().is_empty());
            }
            if let Some(max) = tool_cfg.get("max_results").and_then(|v| v.as_u64()) {
                state.max_results = (max as usize).max(1);
            }
            if let Some(timeout) = tool_cfg.get("timeout_seconds").and_then(|v| v.as_u64()) {
                state.timeout_seconds = timeout;
            }
        }
        Ok(())
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let Some(query) = Self::extract_query(&params) else {
            return Ok(json!({
                "status": "error",
                "message": "query is required"
            }));
        };
        let state = self.snapshot();
        self.search(&query, &state).await
    }
}
