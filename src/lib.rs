pub mod config;
pub mod error;
pub mod logging;
pub mod planner;
pub mod web;

pub mod domains {
    pub mod agent;
    pub mod crew;
    pub mod transcript;
    pub mod trip;
}

pub mod interfaces {
    pub mod callbacks;
    pub mod plugins;
    pub mod providers;
}

pub mod plugins {
    pub mod registry;
}

pub mod providers {
    pub mod openai;
}

pub mod services {
    pub mod agent;
    pub mod crew;
    pub mod transcript;
}

pub mod tools {
    pub mod delegation;
    pub mod web_search;
}

pub type Result<T> = std::result::Result<T, error::TripPlannerError>;

pub use domains::crew::{CrewOutput, Process};
pub use domains::transcript::ChatMessage;
pub use domains::trip::{TripForm, TripRequest};
pub use planner::TripPlanner;
