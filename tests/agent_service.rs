mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use trip_planner::domains::agent::AgentProfile;
use trip_planner::domains::crew::TaskSpec;
use trip_planner::plugins::registry::ToolRegistry;
use trip_planner::services::agent::{AgentService, REPEATED_INPUT_MESSAGE};

use common::{call, text, FailingTool, QueueLlmProvider, RecordingHandler, RecordingTool};

const GUIDE: &str = "Local Tourist Guide";

async fn registry_with(tool: Arc<dyn trip_planner::interfaces::plugins::Tool>) -> Arc<ToolRegistry> {
    let registry = Arc::new(ToolRegistry::new());
    let name = tool.name().to_string();
    assert!(registry.register_tool(tool).await);
    assert!(registry.assign_tool_to_agent(GUIDE, &name).await);
    registry
}

fn guide() -> AgentProfile {
    AgentProfile::new(GUIDE, "Show the sights", "Knows every beach").with_tool("web_search")
}

fn task() -> TaskSpec {
    TaskSpec::new("List beaches in Goa", "a list of beaches")
}

#[tokio::test]
async fn plain_answer_fires_start_and_end() {
    let llm = Arc::new(QueueLlmProvider::new(vec![text("Final Answer: Baga and Anjuna")]));
    let handler = Arc::new(RecordingHandler::default());
    let agent = AgentService::new(llm.clone(), guide(), Arc::new(ToolRegistry::new()))
        .with_callback(handler.clone());

    let answer = agent.execute_task(&task(), None).await.unwrap();
    assert_eq!(answer, "Baga and Anjuna");

    let events = handler.events();
    assert_eq!(events.len(), 2);
    assert!(events[0].starts_with("start:Current Task: List beaches in Goa"));
    assert_eq!(events[1], "end:Baga and Anjuna");

    let system = llm.system_prompts.lock().unwrap()[0].clone();
    assert!(system.starts_with("You are Local Tourist Guide."));
    assert!(system.contains("Your personal goal is: Show the sights"));
}

#[tokio::test]
async fn tool_results_are_fed_back_as_observations() {
    let search = Arc::new(RecordingTool::new(
        "web_search",
        json!({"status": "success", "result": "Baga beach is lively"}),
    ));
    let registry = registry_with(search.clone()).await;
    let llm = Arc::new(QueueLlmProvider::new(vec![
        call("web_search", json!({"query": "goa beaches"})),
        text("Baga beach"),
    ]));
    let handler = Arc::new(RecordingHandler::default());
    let agent = AgentService::new(llm.clone(), guide(), registry).with_callback(handler.clone());

    let answer = agent.execute_task(&task(), Some("Trip in December")).await.unwrap();
    assert_eq!(answer, "Baga beach");
    assert_eq!(search.calls(), vec![json!({"query": "goa beaches"})]);

    let prompts = llm.prompts();
    assert!(prompts[0].contains("This is the context you're working with:\nTrip in December"));
    assert!(prompts[0].contains("AVAILABLE TOOLS (use ONLY these exact names): web_search"));
    assert!(prompts[1].contains("OBSERVATION:"));
    assert!(prompts[1].contains("Baga beach is lively"));
    assert_eq!(llm.tool_names.lock().unwrap()[0], vec!["web_search".to_string()]);
    assert!(handler
        .events()
        .contains(&"tool:web_search:success".to_string()));
}

#[tokio::test]
async fn repeated_tool_input_is_not_executed_twice() {
    let search = Arc::new(RecordingTool::new("web_search", json!({"status": "success"})));
    let registry = registry_with(search.clone()).await;
    let llm = Arc::new(QueueLlmProvider::new(vec![
        call("web_search", json!({"query": "goa"})),
        call("web_search", json!({"query": "goa"})),
        text("done"),
    ]));
    let agent = AgentService::new(llm.clone(), guide(), registry);

    assert_eq!(agent.execute_task(&task(), None).await.unwrap(), "done");
    assert_eq!(search.calls().len(), 1);
    assert!(llm.prompts()[2].contains(REPEATED_INPUT_MESSAGE));
}

#[tokio::test]
async fn unknown_tool_becomes_error_observation() {
    let search = Arc::new(RecordingTool::new("web_search", json!({"status": "success"})));
    let registry = registry_with(search).await;
    let llm = Arc::new(QueueLlmProvider::new(vec![
        call("book_hotel", json!({"city": "Goa"})),
        text("could not book"),
    ]));
    let agent = AgentService::new(llm.clone(), guide(), registry);

    assert_eq!(agent.execute_task(&task(), None).await.unwrap(), "could not book");
    let observation = &llm.prompts()[1];
    assert!(observation.contains("Tool not found"));
    assert!(observation.contains("\"available_tools\""));
}

#[tokio::test]
async fn failing_tool_error_is_redacted_and_loop_continues() {
    let registry = Arc::new(ToolRegistry::new());
    assert!(registry.register_tool(Arc::new(FailingTool)).await);
    assert!(registry.assign_tool_to_agent(GUIDE, "flaky").await);
    let llm = Arc::new(QueueLlmProvider::new(vec![
        call("flaky", json!({})),
        text("answered anyway"),
    ]));
    let agent = AgentService::new(llm.clone(), guide(), registry);

    assert_eq!(agent.execute_task(&task(), None).await.unwrap(), "answered anyway");
    let observation = &llm.prompts()[1];
    assert!(observation.contains("Bearer [REDACTED]"));
    assert!(!observation.contains("abc.def"));
}

#[tokio::test]
async fn iteration_limit_forces_final_answer() {
    let search = Arc::new(RecordingTool::new("web_search", json!({"status": "success"})));
    let registry = registry_with(search.clone()).await;
    let llm = Arc::new(QueueLlmProvider::new(vec![
        call("web_search", json!({"query": "a"})),
        call("web_search", json!({"query": "b"})),
        text("best effort plan"),
    ]));
    let handler = Arc::new(RecordingHandler::default());
    let agent = AgentService::new(llm.clone(), guide(), registry)
        .with_callback(handler.clone())
        .with_max_iterations(2);

    assert_eq!(agent.execute_task(&task(), None).await.unwrap(), "best effort plan");
    assert_eq!(search.calls().len(), 2);
    assert!(llm.prompts()[2].contains("maximum number of steps"));
    assert_eq!(handler.events().last().unwrap(), "end:best effort plan");
}

#[tokio::test]
async fn provider_failure_skips_chain_end() {
    let llm = Arc::new(QueueLlmProvider::new(Vec::new()));
    let handler = Arc::new(RecordingHandler::default());
    let agent = AgentService::new(llm, guide(), Arc::new(ToolRegistry::new()))
        .with_callback(handler.clone());

    let err = agent.execute_task(&task(), None).await.unwrap_err();
    assert!(err.to_string().contains("401"));
    let events = handler.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].starts_with("start:"));
}

#[tokio::test]
async fn tool_calls_are_audited() {
    let dir = tempfile::tempdir().unwrap();
    let audit = dir.path().join("audit.log");
    let search = Arc::new(RecordingTool::new("web_search", json!({"status": "success"})));
    let registry = registry_with(search).await;
    registry
        .configure_all_tools(json!({
            "tools": {"settings": {"audit_log_path": audit.to_string_lossy()}}
        }))
        .await
        .unwrap();
    let llm = Arc::new(QueueLlmProvider::new(vec![
        call("web_search", json!({"query": "goa", "api_key": "sk-leak"})),
        text("ok"),
    ]));
    let agent = AgentService::new(llm, guide(), registry);
    agent.execute_task(&task(), None).await.unwrap();

    let lines: Vec<Value> = std::fs::read_to_string(&audit)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["agent"], json!(GUIDE));
    assert_eq!(lines[0]["tool"], json!("web_search"));
    assert_eq!(lines[0]["status"], json!("success"));
}
