use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::Config;
use crate::domains::agent::AgentProfile;
use crate::domains::crew::{CrewOutput, TaskSpec};
use crate::domains::transcript::ChatMessage;
use crate::domains::trip::{
    TripForm, TripRequest, LOCAL_TOURIST_GUIDE, MANAGER, TRANSPORT_ACCOMMODATION_AGENT,
    TRAVEL_AGENCY_MANAGER,
};
use crate::error::{Result, TripPlannerError};
use crate::interfaces::plugins::Tool;
use crate::interfaces::providers::{LlmProvider, ProviderFactory};
use crate::plugins::registry::ToolRegistry;
use crate::providers::openai::OpenAiProviderFactory;
use crate::services::agent::AgentService;
use crate::services::crew::Crew;
use crate::services::transcript::{TranscriptHandler, TranscriptSink};
use crate::tools::web_search::{WebSearchTool, WEB_SEARCH_TOOL};

/// Builds and runs the travel crew for one form submission.
pub struct TripPlanner {
    config: Config,
    provider_factory: Arc<dyn ProviderFactory>,
    search_tool: Option<Arc<dyn Tool>>,
}

impl TripPlanner {
    pub fn new(config: Config) -> Self {
        let provider_factory = Arc::new(OpenAiProviderFactory::new(config.openai()));
        Self {
            config,
            provider_factory,
            search_tool: None,
        }
    }

    pub fn with_provider_factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.provider_factory = factory;
        self
    }

    /// Replaces the DuckDuckGo tool, mostly for offline runs.
    pub fn with_search_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.search_tool = Some(tool);
        self
    }

    pub fn fallback_api_key(&self) -> Option<String> {
        self.config
            .openai()
            .api_key
            .filter(|key| !key.trim().is_empty())
    }

    pub fn validate(&self, form: &TripForm) -> Result<TripRequest> {
        form.validate(self.fallback_api_key().as_deref())
    }

    pub fn agent_profiles() -> Vec<AgentProfile> {
        vec![
            AgentProfile::new(
                TRAVEL_AGENCY_MANAGER,
                "To greet customers, and manage the customers travel requirements",
                "A manager in a reputed travel agency, which helps users to recommend and resolve all the requirements of users",
            )
            .with_tool(WEB_SEARCH_TOOL),
            AgentProfile::new(
                LOCAL_TOURIST_GUIDE,
                "To make travellers visit all the local tourist spots based on day itinerary",
                "A famous local tourist guide who can speak multiple languages and has a very good idea about all the tourist spots and the history about the spots",
            )
            .with_tool(WEB_SEARCH_TOOL),
            AgentProfile::new(
                TRANSPORT_ACCOMMODATION_AGENT,
                "To provide travel recommendations based on weather, and accommodation details",
                "You have all details about travel options, accommodation options for user requirements which are not too expensive",
            )
            .with_tool(WEB_SEARCH_TOOL),
        ]
    }

    pub fn manager_profile() -> AgentProfile {
        AgentProfile::new(
            MANAGER,
            "To oversee and coordinate all the travel planning activities, ensuring smooth execution and optimal results.",
            "A highly experienced travel manager responsible for coordinating between various agents to deliver the best travel plan.",
        )
        .with_delegation(true)
    }

    pub fn tasks(request: &TripRequest) -> Vec<TaskSpec> {
        let from = &request.from_place;
        let to = &request.to_place;
        let date = request.date_label();
        vec![
            TaskSpec::new(
                &[
                    format!("Collect and summarize all details about travel for user from {from} to {to}"),
                    format!("Pay special attention to any significant events happening in {to} around this date {date}"),
                    "Your final answer MUST be a report that includes a comprehensive summary of the latest best deals.".to_string(),
                    "Make sure to use the most recent data as possible.".to_string(),
                ]
                .join("\n"),
                "report of summary of tourist spots based on user requirements",
            )
            .assigned_to(TRAVEL_AGENCY_MANAGER),
            TaskSpec::new(
                &[
                    format!("Extract all the best tourist spots in {to}, based on the weather or season."),
                    "Try to include a few vendor details like car rentals, bike rentals in the local area.".to_string(),
                    format!("Pay special attention to any significant events happening in {to} around this date {date}"),
                    "Your final answer MUST be a report that includes a comprehensive summary of the latest events or places a user can visit without any problems.".to_string(),
                    "Make sure to use the most recent data as possible.".to_string(),
                ]
                .join("\n"),
                "report of all required details for a user while travelling to new places for vacation, make sure the cost you provide is in Rupees",
            )
            .assigned_to(LOCAL_TOURIST_GUIDE),
            TaskSpec::new(
                &[
                    format!("Extract all the best deals for transport in all modes like flights or trains from {from} to {to}."),
                    format!("Also, get the best accommodation details in {to} with ratings above 4 stars around this date {date}"),
                    "Your final answer MUST be a report that includes a comprehensive summary of the transport details and accommodation options.".to_string(),
                    "Make sure to use the most recent data as possible.".to_string(),
                ]
                .join("\n"),
                "report of best deals for travel and accommodation as per user requirements, make sure the cost you provide is in Rupees",
            )
            .assigned_to(TRANSPORT_ACCOMMODATION_AGENT),
        ]
    }

    async fn build_registry(&self) -> Result<Arc<ToolRegistry>> {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .configure_all_tools(self.config.tool_config_value())
            .await?;

        let search_tool = self
            .search_tool
            .clone()
            .unwrap_or_else(|| Arc::new(WebSearchTool::new()) as Arc<dyn Tool>);
        if !registry.register_tool(search_tool).await {
            return Err(TripPlannerError::Config(format!(
                "could not register {WEB_SEARCH_TOOL}"
            )));
        }
        Ok(registry)
    }

    fn agent_service(
        &self,
        llm: &Arc<dyn LlmProvider>,
        registry: &Arc<ToolRegistry>,
        profile: AgentProfile,
        sink: &TranscriptSink,
    ) -> Arc<AgentService> {
        let handler = Arc::new(TranscriptHandler::new(&profile.role, sink.clone()));
        Arc::new(
            AgentService::new(llm.clone(), profile, registry.clone())
                .with_callback(handler)
                .with_max_iterations(self.config.crew().max_iterations()),
        )
    }

    /// Builds the crew for an already validated request and runs it.
    /// Every message, including the final `assistant` result, lands in `sink`.
    #[instrument(skip_all, fields(from = %request.from_place, to = %request.to_place, date = %request.travel_date))]
    pub async fn plan(&self, request: &TripRequest, sink: &TranscriptSink) -> Result<CrewOutput> {
        let llm = self.provider_factory.create(&request.api_key)?;
        let registry = self.build_registry().await?;

        let mut agents = Vec::new();
        for profile in Self::agent_profiles() {
            for tool in &profile.tools {
                if !registry.assign_tool_to_agent(&profile.role, tool).await {
                    return Err(TripPlannerError::Config(format!(
                        "tool {tool} is not registered for {}",
                        profile.role
                    )));
                }
            }
            agents.push(self.agent_service(&llm, &registry, profile, sink));
        }
        let manager = self.agent_service(&llm, &registry, Self::manager_profile(), sink);

        let crew = Crew::new(
            agents,
            Self::tasks(request),
            self.config.crew().process(),
            Some(manager),
        )?;
        info!(process = %crew.process(), "Kicking off trip crew");

        let output = crew.kickoff().await?;
        sink.push(ChatMessage::assistant(&output.to_string()));
        Ok(output)
    }

    pub async fn plan_form(&self, form: &TripForm, sink: &TranscriptSink) -> Result<CrewOutput> {
        let request = self.validate(form)?;
        self.plan(&request, sink).await
    }
}
