//! Weekly cultivation plan attached to a territory.
//!
//! Plans come from an external generator; the core only stores and returns them.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::store::Territory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekPlan {
    pub week: u32,
    pub title: String,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub irrigation: String,
    #[serde(default)]
    pub fertilizer: String,
    #[serde(default)]
    pub monitoring: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPlan {
    pub crop: String,
    pub territory: String,
    pub planting_date: String,
    pub harvest_date: String,
    pub total_weeks: u32,
    #[serde(default)]
    pub weekly_plans: Vec<WeekPlan>,
}

impl AiPlan {
    pub fn week(&self, week: u32) -> Option<&WeekPlan> {
        self.weekly_plans.iter().find(|plan| plan.week == week)
    }
}

/// Generator of cultivation plans for a saved territory.
pub trait PlanService {
    fn generate(&self, territory: &Territory) -> Result<AiPlan>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parses_generator_payload() {
        let json = r#"{
            "crop": "Wheat",
            "territory": "North field",
            "plantingDate": "2024-03-01",
            "harvestDate": "2024-06-21",
            "totalWeeks": 16,
            "weeklyPlans": [
                {
                    "week": 1,
                    "title": "Week 1: Soil preparation",
                    "tasks": ["Deep plowing", "Base fertilizer"],
                    "irrigation": "none",
                    "fertilizer": "NPK 10-10-10",
                    "monitoring": "soil pH"
                }
            ]
        }"#;

        let plan: AiPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.total_weeks, 16);
        assert_eq!(plan.week(1).map(|w| w.tasks.len()), Some(2));
        assert!(plan.week(2).is_none());
    }
}
