use std::collections::HashSet;

use tracing::info;

use sextant_core::error::Result;
use sextant_core::types::Coverage;

use super::state::{
    Difficulty, LearningPlan, MarketTrend, PlanModule, PlanProject, PlanResource, PlanState,
    PlanUpdate,
};
use crate::annotation::{evidence_assumptions, Confidence};

const MAX_RESOURCES_PER_MODULE: usize = 4;
const MAX_MARKET_TRENDS: usize = 5;

fn title_key(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Keep the first item for each title (case- and spacing-insensitive).
fn unique_by_title<T>(items: &[T], title: impl Fn(&T) -> &str) -> Vec<&T> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(title_key(title(*item))))
        .collect()
}

/// Build the final learning plan from the accumulated collections.
pub fn assemble_plan(state: &PlanState) -> Result<PlanUpdate> {
    let resources = unique_by_title(&state.resources, |r| r.title.as_str());

    let learning_modules: Vec<PlanModule> = unique_by_title(&state.modules, |m| m.title.as_str())
        .into_iter()
        .map(|module| PlanModule {
            title: module.title.clone(),
            description: module.description.clone(),
            duration_weeks: module.duration_weeks,
            resources: resources
                .iter()
                .filter(|r| r.module_title == module.title)
                .take(MAX_RESOURCES_PER_MODULE)
                .map(|r| PlanResource {
                    title: r.title.clone(),
                    kind: if r.kind.is_empty() { "course".into() } else { r.kind.clone() },
                    url: if r.url_pattern.is_empty() { "#".into() } else { r.url_pattern.clone() },
                    cost: if r.cost.is_empty() { "Free".into() } else { r.cost.clone() },
                    difficulty: Difficulty::from_label(&r.difficulty),
                    estimated_hours: r.estimated_hours,
                })
                .collect(),
            learning_objectives: module.learning_outcomes.clone(),
            weekly_breakdown: module.weekly_breakdown.clone(),
        })
        .collect();

    let project_ideas: Vec<PlanProject> = unique_by_title(&state.projects, |p| p.title.as_str())
        .into_iter()
        .map(|p| PlanProject {
            title: p.title.clone(),
            description: p.description.clone(),
            difficulty: Difficulty::from_label(&p.difficulty),
            duration_weeks: p.duration_weeks,
            technologies: p.technologies.clone(),
            learning_objectives: p.skills_practiced.clone(),
        })
        .collect();

    let market_trends: Vec<MarketTrend> = state
        .market
        .iter()
        .flat_map(|m| m.technologies.iter())
        .take(MAX_MARKET_TRENDS)
        .map(|t| MarketTrend {
            trend_name: t.name.clone(),
            mentions: t.mentions,
            evidenced: t.mentions > 0,
        })
        .collect();

    let (coverage, absent) = match &state.market {
        Some(market) => (market.bundle.coverage(), market.bundle.absent_sources()),
        None => (Coverage::None, vec![]),
    };

    let mut assumptions = evidence_assumptions(coverage, &absent);
    let unconfirmed: Vec<&str> = market_trends
        .iter()
        .filter(|t| !t.evidenced)
        .map(|t| t.trend_name.as_str())
        .collect();
    if !unconfirmed.is_empty() {
        assumptions.push(format!(
            "Trends not confirmed by retrieved evidence: {}.",
            unconfirmed.join(", ")
        ));
    }
    for note in &state.degraded {
        assumptions.push(format!("Stage fell back to defaults: {}.", note));
    }

    let caveats = !unconfirmed.is_empty() || !state.degraded.is_empty();
    let confidence = Confidence::assess(coverage, caveats);

    info!(
        modules = learning_modules.len(),
        projects = project_ideas.len(),
        trends = market_trends.len(),
        confidence = %confidence,
        "Learning plan assembled"
    );

    Ok(PlanUpdate::Plan(LearningPlan {
        topic: state.request.topic.clone(),
        timeline_weeks: state.timeline_weeks,
        learning_modules,
        priority_skills: state.priority_skills.clone(),
        project_ideas,
        market_trends,
        learning_resources: resources.into_iter().cloned().collect(),
        assumptions,
        confidence,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WorkflowState;
    use crate::plan::state::{MarketResearch, Module, PlanRequest, ProjectIdea, Resource, Technology};
    use sextant_core::types::{ResearchBundle, SourceContribution};
    use sextant_test_utils::items;

    fn resource(title: &str, module: &str) -> Resource {
        Resource {
            title: title.into(),
            module_title: module.into(),
            difficulty: "beginner".into(),
            estimated_hours: 10,
            ..Default::default()
        }
    }

    fn assembled(state: &PlanState) -> LearningPlan {
        let mut state = state.clone();
        let update = assemble_plan(&state).unwrap();
        state.apply(update);
        state.plan.unwrap()
    }

    #[test]
    fn test_resources_capped_and_mapped() {
        let mut state = PlanState::new(PlanRequest {
            topic: "rust".into(),
            ..Default::default()
        });
        state.modules = vec![Module {
            title: "Basics".into(),
            ..Default::default()
        }];
        state.resources = (0..6).map(|i| resource(&format!("R{}", i), "Basics")).collect();
        state.resources.push(resource("r0", "Basics"));

        let plan = assembled(&state);
        let module = &plan.learning_modules[0];
        assert_eq!(module.resources.len(), 4);
        assert_eq!(module.resources[0].difficulty, Difficulty::Easy);
        assert_eq!(module.resources[0].url, "#");
        assert_eq!(module.resources[0].cost, "Free");
        assert_eq!(module.resources[0].kind, "course");
        assert_eq!(plan.learning_resources.len(), 6);
    }

    #[test]
    fn test_duplicates_removed_by_title() {
        let mut state = PlanState::new(PlanRequest::default());
        state.modules = vec![
            Module {
                title: "Async Rust".into(),
                ..Default::default()
            },
            Module {
                title: "async  rust".into(),
                ..Default::default()
            },
        ];
        state.projects = vec![
            ProjectIdea {
                title: "CLI".into(),
                difficulty: "advanced".into(),
                ..Default::default()
            },
            ProjectIdea {
                title: "cli".into(),
                ..Default::default()
            },
        ];
        let plan = assembled(&state);
        assert_eq!(plan.learning_modules.len(), 1);
        assert_eq!(plan.project_ideas.len(), 1);
        assert_eq!(plan.project_ideas[0].difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_trends_and_confidence() {
        let mut bundle = ResearchBundle::new("rust");
        bundle.insert("web_search", SourceContribution::Found(items(2)));
        bundle.insert("youtube", SourceContribution::unavailable("quota"));

        let mut state = PlanState::new(PlanRequest::default());
        state.market = Some(MarketResearch {
            bundle,
            technologies: (0..7)
                .map(|i| Technology {
                    name: format!("tech{}", i),
                    mentions: if i == 0 { 0 } else { 1 },
                })
                .collect(),
        });

        let plan = assembled(&state);
        assert_eq!(plan.market_trends.len(), 5);
        assert!(!plan.market_trends[0].evidenced);
        assert!(plan.market_trends[1].evidenced);
        assert_eq!(plan.confidence, Confidence::Medium);
        assert!(plan.assumptions.iter().any(|a| a.contains("youtube")));
        assert!(plan.assumptions.iter().any(|a| a == "Trends not confirmed by retrieved evidence: tech0."));
    }

    #[test]
    fn test_no_market_research_is_low_confidence() {
        let mut state = PlanState::new(PlanRequest::default());
        state.degraded.push("analyze_gaps: backend down".into());
        let plan = assembled(&state);
        assert_eq!(plan.confidence, Confidence::Low);
        assert_eq!(plan.timeline_weeks, 12);
        assert!(plan
            .assumptions
            .contains(&"Stage fell back to defaults: analyze_gaps: backend down.".to_string()));
    }
}
