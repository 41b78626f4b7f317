use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::domains::agent::normalize_role;
use crate::domains::crew::{CrewOutput, Process, TaskOutput, TaskSpec};
use crate::error::{Result, TripPlannerError};
use crate::services::agent::AgentService;
use crate::tools::delegation::Coworkers;

const CONTEXT_SEPARATOR: &str = "\n\n----------\n\n";

pub struct Crew {
    agents: Vec<Arc<AgentService>>,
    tasks: Vec<TaskSpec>,
    process: Process,
    manager: Option<Arc<AgentService>>,
}

impl std::fmt::Debug for Crew {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crew")
            .field("agents", &self.agents.iter().map(|a| a.role()).collect::<Vec<_>>())
            .field("tasks", &self.tasks.len())
            .field("process", &self.process)
            .field("manager", &self.manager.as_ref().map(|m| m.role()))
            .finish()
    }
}

impl Crew {
    pub fn new(
        agents: Vec<Arc<AgentService>>,
        tasks: Vec<TaskSpec>,
        process: Process,
        manager: Option<Arc<AgentService>>,
    ) -> Result<Self> {
        if tasks.is_empty() {
            return Err(TripPlannerError::Config(
                "a crew needs at least one task".to_string(),
            ));
        }

        let mut roles = HashSet::new();
        for agent in &agents {
            if !roles.insert(normalize_role(agent.role())) {
                return Err(TripPlannerError::Config(format!(
                    "duplicate agent role: {}",
                    agent.role()
                )));
            }
        }

        match process {
            Process::Hierarchical => {
                let Some(manager) = manager.as_ref() else {
                    return Err(TripPlannerError::Config(
                        "a hierarchical crew needs a manager agent".to_string(),
                    ));
                };
                if !manager.agent().allow_delegation {
                    return Err(TripPlannerError::Config(format!(
                        "manager agent {} must allow delegation",
                        manager.role()
                    )));
                }
                if !manager.agent().tools.is_empty() {
                    return Err(TripPlannerError::Config(format!(
                        "manager agent {} must not have tools",
                        manager.role()
                    )));
                }
                if agents.is_empty() {
                    return Err(TripPlannerError::Config(
                        "a hierarchical crew needs agents to delegate to".to_string(),
                    ));
                }
            }
            Process::Sequential => {
                for task in &tasks {
                    let Some(role) = task.agent_role.as_deref() else {
                        return Err(TripPlannerError::Config(format!(
                            "task has no agent: {}",
                            task.description
                        )));
                    };
                    if !agents.iter().any(|a| a.agent().matches_role(role)) {
                        return Err(TripPlannerError::Config(format!(
                            "task assigned to unknown agent: {role}"
                        )));
                    }
                }
            }
        }

        Ok(Self {
            agents,
            tasks,
            process,
            manager,
        })
    }

    pub fn process(&self) -> Process {
        self.process
    }


    #[instrument(skip_all, fields(process = %self.process, tasks = self.tasks.len()))]
    pub async fn kickoff(&self) -> Result<CrewOutput> {
        let coworkers = Coworkers::new(self.agents.clone());
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(self.tasks.len());

        for (index, task) in self.tasks.iter().enumerate() {
            let context = outputs
                .iter()
                .map(|o| o.raw.as_str())
                .collect::<Vec<_>>()
                .join(CONTEXT_SEPARATOR);
            let context = Some(context.as_str()).filter(|c| !c.is_empty());

            let (agent, raw) = match self.process {
                Process::Hierarchical => {
                    let manager = self.manager.as_ref().ok_or_else(|| {
                        TripPlannerError::Config("hierarchical crew lost its manager".to_string())
                    })?;
                    let raw = manager
                        .execute_task_with_tools(task, context, coworkers.tools())
                        .await?;
                    (manager.role().to_string(), raw)
                }
                Process::Sequential => {
                    let role = task.agent_role.as_deref().unwrap_or_default();
                    let agent = coworkers.find(role).ok_or_else(|| {
                        TripPlannerError::Config(format!("task assigned to unknown agent: {role}"))
                    })?;
                    let raw = agent.execute_task(task, context).await?;
                    (agent.role().to_string(), raw)
                }
            };

            info!(task = index + 1, agent = %agent, "Task finished");
            outputs.push(TaskOutput {
                description: task.description.clone(),
                agent,
                raw,
            });
        }

        Ok(CrewOutput::from_tasks(outputs))
    }
}
