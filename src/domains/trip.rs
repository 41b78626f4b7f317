use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TripPlannerError};

pub const MISSING_FIELDS_MESSAGE: &str = "Please fill in all the fields.";

pub const TRAVEL_AGENCY_MANAGER: &str = "Travel Agency Manager";
pub const LOCAL_TOURIST_GUIDE: &str = "Local Tourist Guide";
pub const TRANSPORT_ACCOMMODATION_AGENT: &str = "Transport & Accommodation Travel Agent";
pub const MANAGER: &str = "Manager";

const AVATARS: [(&str, &str); 4] = [
    (
        TRAVEL_AGENCY_MANAGER,
        "https://cdn-icons-png.flaticon.com/512/320/320336.png",
    ),
    (
        LOCAL_TOURIST_GUIDE,
        "https://cdn-icons-png.flaticon.com/512/2203/2203675.png",
    ),
    (
        TRANSPORT_ACCOMMODATION_AGENT,
        "https://cdn-icons-png.flaticon.com/512/9408/9408201.png",
    ),
    (MANAGER, "https://cdn-icons-png.flaticon.com/512/305/305694.png"),
];

pub fn avatar_for(role: &str) -> Option<&'static str> {
    AVATARS
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, url)| *url)
}

/// Raw form submission, exactly as typed.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TripForm {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default, alias = "from")]
    pub from_place: String,
    #[serde(default, alias = "to")]
    pub to_place: String,
    #[serde(default, alias = "date")]
    pub travel_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripRequest {
    pub api_key: String,
    pub from_place: String,
    pub to_place: String,
    pub travel_date: NaiveDate,
}

impl TripForm {
    /// `fallback_api_key` stands in when the form leaves the key blank.
    pub fn validate(&self, fallback_api_key: Option<&str>) -> Result<TripRequest> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .or_else(|| fallback_api_key.map(str::trim).filter(|k| !k.is_empty()));
        let from_place = self.from_place.trim();
        let to_place = self.to_place.trim();
        let travel_date = self.travel_date.trim();

        let (Some(api_key), false, false, false) = (
            api_key,
            from_place.is_empty(),
            to_place.is_empty(),
            travel_date.is_empty(),
        ) else {
            return Err(TripPlannerError::Validation(
                MISSING_FIELDS_MESSAGE.to_string(),
            ));
        };

        let travel_date = NaiveDate::parse_from_str(travel_date, "%Y-%m-%d").map_err(|_| {
            TripPlannerError::Validation(format!(
                "Invalid date of journey '{travel_date}', expected YYYY-MM-DD."
            ))
        })?;

        Ok(TripRequest {
            api_key: api_key.to_string(),
            from_place: from_place.to_string(),
            to_place: to_place.to_string(),
            travel_date,
        })
    }
}

impl TripRequest {
    pub fn date_label(&self) -> String {
        self.travel_date.format("%Y-%m-%d").to_string()
    }
}
