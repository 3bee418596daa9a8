use serde::{Deserialize, Serialize};

use sextant_core::types::ResearchBundle;

use crate::annotation::Confidence;
use crate::graph::WorkflowState;

/// Inputs of one learning-plan run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub topic: String,
    pub experience_level: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    /// Assessment score out of 100.
    #[serde(default)]
    pub score: u32,
}

/// A technology named in the market research.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
    /// Evidence items that mention it; zero means the model named it alone.
    pub mentions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketResearch {
    pub bundle: ResearchBundle,
    pub technologies: Vec<Technology>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Objective {
    pub title: String,
    pub description: String,
    pub skills_covered: Vec<String>,
    pub success_criteria: Vec<String>,
    #[serde(default = "default_weeks")]
    pub estimated_weeks: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeekPlan {
    pub week: u32,
    pub theme: String,
    pub goals: Vec<String>,
    pub deliverables: Vec<String>,
    #[serde(default = "default_weekly_hours")]
    pub time_commitment_hours: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Module {
    pub title: String,
    pub description: String,
    #[serde(default = "default_weeks")]
    pub duration_weeks: u32,
    pub topics: Vec<String>,
    pub learning_outcomes: Vec<String>,
    pub practical_exercises: Vec<String>,
    pub weekly_breakdown: Vec<WeekPlan>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub platform: String,
    pub url_pattern: String,
    pub difficulty: String,
    #[serde(default = "default_resource_hours")]
    pub estimated_hours: u32,
    pub cost: String,
    pub topics_covered: Vec<String>,
    pub why_recommended: String,
    /// Module this resource was curated for.
    pub module_title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectIdea {
    pub title: String,
    pub description: String,
    pub difficulty: String,
    #[serde(default = "default_weeks")]
    pub duration_weeks: u32,
    pub technologies: Vec<String>,
    pub skills_practiced: Vec<String>,
    pub features: Vec<String>,
    pub learning_outcomes: Vec<String>,
    pub portfolio_value: String,
    pub github_topics: Vec<String>,
    pub deployment_options: Vec<String>,
}

pub(crate) fn default_weeks() -> u32 {
    2
}

pub(crate) fn default_weekly_hours() -> u32 {
    8
}

fn default_resource_hours() -> u32 {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Map a level label; anything unrecognized is medium.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "beginner" | "easy" => Difficulty::Easy,
            "advanced" | "hard" | "expert" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResource {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub cost: String,
    pub difficulty: Difficulty,
    pub estimated_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanModule {
    pub title: String,
    pub description: String,
    pub duration_weeks: u32,
    pub resources: Vec<PlanResource>,
    pub learning_objectives: Vec<String>,
    pub weekly_breakdown: Vec<WeekPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanProject {
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub duration_weeks: u32,
    pub technologies: Vec<String>,
    pub learning_objectives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTrend {
    pub trend_name: String,
    pub mentions: usize,
    pub evidenced: bool,
}

/// The externally facing learning plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPlan {
    pub topic: String,
    pub timeline_weeks: u32,
    pub learning_modules: Vec<PlanModule>,
    pub priority_skills: Vec<String>,
    pub project_ideas: Vec<PlanProject>,
    pub market_trends: Vec<MarketTrend>,
    pub learning_resources: Vec<Resource>,
    pub assumptions: Vec<String>,
    pub confidence: Confidence,
}

impl LearningPlan {
    /// Minimal outline returned when the workflow cannot produce a plan.
    pub fn fallback(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            timeline_weeks: 12,
            learning_modules: vec![],
            priority_skills: vec![
                format!("Core {} concepts", topic),
                "Best practices".to_string(),
                "Real-world applications".to_string(),
            ],
            project_ideas: vec![],
            market_trends: vec![],
            learning_resources: vec![],
            assumptions: vec![
                "The detailed plan could not be generated; this is a minimal starting outline."
                    .to_string(),
            ],
            confidence: Confidence::Low,
        }
    }
}

/// State of one learning-plan run.
#[derive(Debug, Clone, Default)]
pub struct PlanState {
    pub request: PlanRequest,
    pub market: Option<MarketResearch>,
    pub skill_gaps: Vec<String>,
    pub priority_skills: Vec<String>,
    pub objectives: Vec<Objective>,
    pub timeline_weeks: u32,
    pub modules: Vec<Module>,
    pub resources: Vec<Resource>,
    pub projects: Vec<ProjectIdea>,
    pub plan: Option<LearningPlan>,
    /// Stages that fell back to defaults, with the reason.
    pub degraded: Vec<String>,
    pub error: Option<String>,
}

/// Partial update returned by each plan stage.
#[derive(Debug, Clone)]
pub enum PlanUpdate {
    Market(MarketResearch),
    Gaps {
        skill_gaps: Vec<String>,
        priority_skills: Vec<String>,
    },
    Objectives {
        objectives: Vec<Objective>,
        timeline_weeks: u32,
    },
    Modules(Vec<Module>),
    Resources(Vec<Resource>),
    Projects(Vec<ProjectIdea>),
    Plan(LearningPlan),
    /// A stage that fell back to `fallback` after failing with `reason`.
    Degraded {
        stage: String,
        reason: String,
        fallback: Box<PlanUpdate>,
    },
}

impl PlanUpdate {
    pub fn degraded(stage: &str, reason: impl ToString, fallback: PlanUpdate) -> Self {
        PlanUpdate::Degraded {
            stage: stage.to_string(),
            reason: reason.to_string(),
            fallback: Box::new(fallback),
        }
    }
}

impl PlanState {
    pub fn new(request: PlanRequest) -> Self {
        Self {
            request,
            timeline_weeks: 12,
            ..Default::default()
        }
    }
}

impl WorkflowState for PlanState {
    type Update = PlanUpdate;

    fn apply(&mut self, update: PlanUpdate) {
        match update {
            PlanUpdate::Market(market) => self.market = Some(market),
            PlanUpdate::Gaps {
                skill_gaps,
                priority_skills,
            } => {
                self.skill_gaps = skill_gaps;
                self.priority_skills = priority_skills;
            }
            PlanUpdate::Objectives {
                objectives,
                timeline_weeks,
            } => {
                self.objectives = objectives;
                self.timeline_weeks = timeline_weeks;
            }
            PlanUpdate::Modules(modules) => self.modules = modules,
            PlanUpdate::Resources(resources) => self.resources = resources,
            PlanUpdate::Projects(projects) => self.projects = projects,
            PlanUpdate::Plan(plan) => self.plan = Some(plan),
            PlanUpdate::Degraded {
                stage,
                reason,
                fallback,
            } => {
                self.degraded.push(format!("{}: {}", stage, reason));
                self.apply(*fallback);
            }
        }
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn set_error(&mut self, error: String) {
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_module_defaults() {
        let module: Module = serde_json::from_str(r#"{"title": "Basics", "topics": ["ownership"]}"#).unwrap();
        assert_eq!(module.duration_weeks, 2);
        assert!(module.weekly_breakdown.is_empty());

        let resource: Resource =
            serde_json::from_str(r#"{"title": "The Book", "type": "book", "difficulty": "beginner"}"#).unwrap();
        assert_eq!(resource.kind, "book");
        assert_eq!(resource.estimated_hours, 10);
    }

    #[test]
    fn test_difficulty_labels() {
        assert_eq!(Difficulty::from_label("Beginner"), Difficulty::Easy);
        assert_eq!(Difficulty::from_label("intermediate"), Difficulty::Medium);
        assert_eq!(Difficulty::from_label("advanced"), Difficulty::Hard);
        assert_eq!(Difficulty::from_label("???"), Difficulty::Medium);
    }

    #[test]
    fn test_degraded_update_applies_fallback() {
        let mut state = PlanState::new(PlanRequest::default());
        state.apply(PlanUpdate::degraded(
            "analyze_gaps",
            "backend down",
            PlanUpdate::Gaps {
                skill_gaps: vec!["testing".into()],
                priority_skills: vec![],
            },
        ));
        assert_eq!(state.skill_gaps, vec!["testing"]);
        assert_eq!(state.degraded, vec!["analyze_gaps: backend down"]);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_fallback_plan() {
        let plan = LearningPlan::fallback("rust");
        assert_eq!(plan.timeline_weeks, 12);
        assert_eq!(plan.priority_skills[0], "Core rust concepts");
        assert_eq!(plan.confidence, Confidence::Low);
    }
}
