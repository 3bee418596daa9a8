use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use sextant_core::config::ModelConfig;
use sextant_core::error::Result;
use sextant_core::traits::LlmClient;
use sextant_core::types::{CompletionRequest, Coverage, QueryParams, ResearchBundle};
use sextant_llm::StructuredRetryPolicy;
use sextant_sources::ResearchAggregator;

use super::state::{
    default_weekly_hours, MarketResearch, Module, Objective, PlanRequest, PlanState, PlanUpdate,
    ProjectIdea, Resource, Technology, WeekPlan,
};
use crate::graph::Node;

pub const MARKET_SOURCES: [&str; 4] = ["web_search", "github_trends", "youtube", "hackernews"];

const MAX_SKILL_GAPS: usize = 12;
const MAX_PRIORITY_SKILLS: usize = 5;
const MIN_TIMELINE_WEEKS: u32 = 8;
const MAX_TIMELINE_WEEKS: u32 = 16;
const MAX_ITEMS_PER_SOURCE: usize = 8;

pub(crate) const MARKET_SYSTEM: &str = "You extract emerging technologies from market research \
evidence. Name only technologies that the evidence mentions. Reply with JSON \
{\"emerging_technologies\": [\"...\"]}.";

pub(crate) const GAPS_SYSTEM: &str = "You analyze skill gaps for a learner, comparing their \
assessment with what the market demands. Reply with JSON {\"critical_gaps\": [...], \
\"emerging_skills\": [...], \"foundational_skills\": [...]}.";

pub(crate) const OBJECTIVES_SYSTEM: &str = "You define measurable learning objectives. Reply \
with JSON {\"objectives\": [{\"title\", \"description\", \"skills_covered\": [...], \
\"success_criteria\": [...], \"estimated_weeks\": n}]}.";

pub(crate) const CURRICULUM_SYSTEM: &str = "You design curricula as ordered modules. Reply with \
JSON {\"modules\": [{\"title\", \"description\", \"duration_weeks\": n, \"topics\": [...], \
\"learning_outcomes\": [...], \"practical_exercises\": [...], \"weekly_breakdown\": [{\"week\": n, \
\"theme\", \"goals\": [...], \"deliverables\": [...], \"time_commitment_hours\": n}]}]}.";

pub(crate) const RESOURCES_SYSTEM: &str = "You curate learning resources for one module. Prefer \
well-known platforms and name real resources only. Reply with JSON {\"resources\": [{\"title\", \
\"type\", \"platform\", \"url_pattern\", \"difficulty\", \"estimated_hours\": n, \"cost\", \
\"topics_covered\": [...], \"why_recommended\"}]}.";

pub(crate) const PROJECTS_SYSTEM: &str = "You propose portfolio projects that practice the \
planned skills. Reply with JSON {\"projects\": [{\"title\", \"description\", \"difficulty\", \
\"duration_weeks\": n, \"technologies\": [...], \"skills_practiced\": [...], \"features\": [...], \
\"learning_outcomes\": [...], \"portfolio_value\", \"github_topics\": [...], \
\"deployment_options\": [...]}]}.";

/// Structured-output access shared by the plan stages.
pub struct PlanGenerator {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    policy: StructuredRetryPolicy,
}

impl PlanGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig, policy: StructuredRetryPolicy) -> Self {
        Self { llm, model, policy }
    }

    async fn generate<T: DeserializeOwned>(&self, system: &str, prompt: String) -> Result<T> {
        self.policy
            .generate(
                self.llm.as_ref(),
                &self.model,
                CompletionRequest::new(prompt).with_system(system),
            )
            .await
    }
}

fn learner_profile(request: &PlanRequest) -> String {
    let list = |items: &[String]| {
        if items.is_empty() {
            "(none given)".to_string()
        } else {
            items.join(", ")
        }
    };
    format!(
        "Topic: {}\nExperience level: {}\nAssessment score: {}/100\nStrengths: {}\nWeaknesses: {}\n",
        request.topic,
        request.experience_level,
        request.score,
        list(&request.strengths),
        list(&request.weaknesses)
    )
}

/// Append every entry of `items` not yet seen (case-insensitive).
fn extend_unique(out: &mut Vec<String>, seen: &mut HashSet<String>, items: Vec<String>) {
    for item in items {
        let item = item.trim().to_string();
        if !item.is_empty() && seen.insert(item.to_lowercase()) {
            out.push(item);
        }
    }
}

// --- research_market ---

#[derive(Deserialize)]
struct TechnologiesReply {
    #[serde(default)]
    emerging_technologies: Vec<String>,
}

pub struct MarketResearchNode {
    aggregator: Arc<ResearchAggregator>,
    generator: Arc<PlanGenerator>,
}

impl MarketResearchNode {
    pub fn new(aggregator: Arc<ResearchAggregator>, generator: Arc<PlanGenerator>) -> Self {
        Self { aggregator, generator }
    }
}

/// Per-source queries for market research on a topic.
pub fn market_queries(request: &PlanRequest) -> BTreeMap<String, QueryParams> {
    let topic = request.topic.as_str();
    let level = request.experience_level.as_str();
    [
        ("web_search", format!("{} developer skills in demand job market trends", topic)),
        ("github_trends", topic.to_string()),
        ("youtube", format!("{} {} tutorial", topic, level)),
        ("hackernews", topic.to_string()),
    ]
    .into_iter()
    .map(|(source, q)| (source.to_string(), QueryParams::new().with("q", q)))
    .collect()
}

/// Count evidence items mentioning each technology.
fn count_mentions(names: Vec<String>, bundle: &ResearchBundle) -> Vec<Technology> {
    let texts: Vec<String> = bundle
        .sources
        .values()
        .filter_map(|c| c.payload())
        .flat_map(|p| p.items.iter())
        .map(|item| format!("{} {}", item.title, item.snippet).to_lowercase())
        .collect();

    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    extend_unique(&mut unique, &mut seen, names);

    unique
        .into_iter()
        .map(|name| {
            let needle = name.to_lowercase();
            let mentions = texts.iter().filter(|t| t.contains(&needle)).count();
            Technology { name, mentions }
        })
        .collect()
}

impl Node<PlanState> for MarketResearchNode {
    fn run<'a>(&'a self, state: &'a PlanState) -> BoxFuture<'a, Result<PlanUpdate>> {
        Box::pin(async move {
            let request = &state.request;
            let bundle = self
                .aggregator
                .gather(&request.topic, market_queries(request))
                .await;

            if bundle.coverage() == Coverage::None {
                info!(topic = %request.topic, "No market evidence, skipping trend extraction");
                return Ok(PlanUpdate::Market(MarketResearch {
                    bundle,
                    technologies: vec![],
                }));
            }

            let prompt = format!(
                "{}\nMarket evidence:\n{}",
                learner_profile(request),
                bundle.render(MAX_ITEMS_PER_SOURCE)
            );
            match self.generator.generate::<TechnologiesReply>(MARKET_SYSTEM, prompt).await {
                Ok(reply) => {
                    let technologies = count_mentions(reply.emerging_technologies, &bundle);
                    info!(technologies = technologies.len(), "Market research complete");
                    Ok(PlanUpdate::Market(MarketResearch { bundle, technologies }))
                }
                Err(e) => {
                    warn!(error = %e, "Trend extraction failed, continuing without trends");
                    Ok(PlanUpdate::degraded(
                        "research_market",
                        e,
                        PlanUpdate::Market(MarketResearch {
                            bundle,
                            technologies: vec![],
                        }),
                    ))
                }
            }
        })
    }
}

// --- analyze_gaps ---

#[derive(Deserialize)]
struct GapsReply {
    #[serde(default)]
    critical_gaps: Vec<String>,
    #[serde(default)]
    emerging_skills: Vec<String>,
    #[serde(default)]
    foundational_skills: Vec<String>,
}

pub struct SkillGapNode {
    generator: Arc<PlanGenerator>,
}

impl SkillGapNode {
    pub fn new(generator: Arc<PlanGenerator>) -> Self {
        Self { generator }
    }
}

fn gaps_update(reply: GapsReply) -> PlanUpdate {
    let priority_skills: Vec<String> = reply
        .critical_gaps
        .iter()
        .take(MAX_PRIORITY_SKILLS)
        .cloned()
        .collect();

    let mut seen = HashSet::new();
    let mut skill_gaps = Vec::new();
    extend_unique(&mut skill_gaps, &mut seen, reply.critical_gaps);
    extend_unique(&mut skill_gaps, &mut seen, reply.emerging_skills);
    extend_unique(&mut skill_gaps, &mut seen, reply.foundational_skills);
    skill_gaps.truncate(MAX_SKILL_GAPS);

    PlanUpdate::Gaps {
        skill_gaps,
        priority_skills,
    }
}

impl Node<PlanState> for SkillGapNode {
    fn run<'a>(&'a self, state: &'a PlanState) -> BoxFuture<'a, Result<PlanUpdate>> {
        Box::pin(async move {
            let mut prompt = learner_profile(&state.request);
            if let Some(market) = &state.market {
                let names: Vec<&str> = market.technologies.iter().map(|t| t.name.as_str()).collect();
                if !names.is_empty() {
                    prompt.push_str(&format!("Emerging technologies: {}\n", names.join(", ")));
                }
            }

            match self.generator.generate::<GapsReply>(GAPS_SYSTEM, prompt).await {
                Ok(reply) => Ok(gaps_update(reply)),
                Err(e) => {
                    warn!(error = %e, "Skill gap analysis failed, falling back to weaknesses");
                    let weaknesses = &state.request.weaknesses;
                    Ok(PlanUpdate::degraded(
                        "analyze_gaps",
                        e,
                        PlanUpdate::Gaps {
                            skill_gaps: weaknesses.iter().take(5).cloned().collect(),
                            priority_skills: weaknesses.iter().take(3).cloned().collect(),
                        },
                    ))
                }
            }
        })
    }
}

// --- define_objectives ---

#[derive(Deserialize)]
struct ObjectivesReply {
    #[serde(default)]
    objectives: Vec<Objective>,
}

pub struct ObjectivesNode {
    generator: Arc<PlanGenerator>,
}

impl ObjectivesNode {
    pub fn new(generator: Arc<PlanGenerator>) -> Self {
        Self { generator }
    }
}

/// Total weeks across objectives, clamped to 8..=16.
pub fn timeline_weeks(objectives: &[Objective]) -> u32 {
    objectives
        .iter()
        .fold(0u32, |total, o| total.saturating_add(o.estimated_weeks))
        .clamp(MIN_TIMELINE_WEEKS, MAX_TIMELINE_WEEKS)
}

impl Node<PlanState> for ObjectivesNode {
    fn run<'a>(&'a self, state: &'a PlanState) -> BoxFuture<'a, Result<PlanUpdate>> {
        Box::pin(async move {
            let prompt = format!(
                "{}Skill gaps: {}\nPriority skills: {}\n",
                learner_profile(&state.request),
                state.skill_gaps.join(", "),
                state.priority_skills.join(", ")
            );

            match self.generator.generate::<ObjectivesReply>(OBJECTIVES_SYSTEM, prompt).await {
                Ok(reply) => {
                    let weeks = timeline_weeks(&reply.objectives);
                    info!(objectives = reply.objectives.len(), weeks, "Learning objectives defined");
                    Ok(PlanUpdate::Objectives {
                        objectives: reply.objectives,
                        timeline_weeks: weeks,
                    })
                }
                Err(e) => {
                    warn!(error = %e, "Objective generation failed, using default timeline");
                    Ok(PlanUpdate::degraded(
                        "define_objectives",
                        e,
                        PlanUpdate::Objectives {
                            objectives: vec![],
                            timeline_weeks: 12,
                        },
                    ))
                }
            }
        })
    }
}

// --- design_curriculum ---

#[derive(Deserialize)]
struct ModulesReply {
    #[serde(default)]
    modules: Vec<Module>,
}

pub struct CurriculumNode {
    generator: Arc<PlanGenerator>,
}

impl CurriculumNode {
    pub fn new(generator: Arc<PlanGenerator>) -> Self {
        Self { generator }
    }
}

/// Module lengths come from the backend; keep them within one timeline.
fn bound_duration(mut module: Module) -> Module {
    module.duration_weeks = module.duration_weeks.clamp(1, MAX_TIMELINE_WEEKS);
    module
}

impl Node<PlanState> for CurriculumNode {
    fn run<'a>(&'a self, state: &'a PlanState) -> BoxFuture<'a, Result<PlanUpdate>> {
        Box::pin(async move {
            let objectives: Vec<String> = state
                .objectives
                .iter()
                .map(|o| format!("- {} ({} weeks): {}", o.title, o.estimated_weeks, o.description))
                .collect();
            let prompt = format!(
                "{}Timeline: {} weeks\nPriority skills: {}\nObjectives:\n{}\n",
                learner_profile(&state.request),
                state.timeline_weeks,
                state.priority_skills.join(", "),
                objectives.join("\n")
            );

            match self.generator.generate::<ModulesReply>(CURRICULUM_SYSTEM, prompt).await {
                Ok(reply) => {
                    let modules: Vec<Module> = reply.modules.into_iter().map(bound_duration).collect();
                    info!(modules = modules.len(), "Curriculum designed");
                    Ok(PlanUpdate::Modules(modules))
                }
                Err(e) => {
                    warn!(error = %e, "Curriculum design failed");
                    Ok(PlanUpdate::degraded("design_curriculum", e, PlanUpdate::Modules(vec![])))
                }
            }
        })
    }
}

// --- curate_resources ---

#[derive(Deserialize)]
struct ResourcesReply {
    #[serde(default)]
    resources: Vec<Resource>,
}

pub struct ResourceNode {
    generator: Arc<PlanGenerator>,
}

impl ResourceNode {
    pub fn new(generator: Arc<PlanGenerator>) -> Self {
        Self { generator }
    }
}

impl Node<PlanState> for ResourceNode {
    fn run<'a>(&'a self, state: &'a PlanState) -> BoxFuture<'a, Result<PlanUpdate>> {
        Box::pin(async move {
            let mut resources = Vec::new();
            let mut failed = Vec::new();

            // One failing module never costs the others their resources
            for module in &state.modules {
                let prompt = format!(
                    "Experience level: {}\nModule: {}\nDescription: {}\nTopics: {}\n",
                    state.request.experience_level,
                    module.title,
                    module.description,
                    module.topics.join(", ")
                );
                match self.generator.generate::<ResourcesReply>(RESOURCES_SYSTEM, prompt).await {
                    Ok(reply) => {
                        debug!(module = %module.title, resources = reply.resources.len(), "Resources curated");
                        resources.extend(reply.resources.into_iter().map(|r| Resource {
                            module_title: module.title.clone(),
                            ..r
                        }));
                    }
                    Err(e) => {
                        warn!(module = %module.title, error = %e, "Resource curation failed for module");
                        failed.push(format!("{} ({})", module.title, e));
                    }
                }
            }

            info!(resources = resources.len(), failed = failed.len(), "Resource curation complete");
            if failed.is_empty() {
                Ok(PlanUpdate::Resources(resources))
            } else {
                Ok(PlanUpdate::degraded(
                    "curate_resources",
                    format!("no resources for {}", failed.join(", ")),
                    PlanUpdate::Resources(resources),
                ))
            }
        })
    }
}

// --- generate_projects ---

#[derive(Deserialize)]
struct ProjectsReply {
    #[serde(default)]
    projects: Vec<ProjectIdea>,
}

pub struct ProjectNode {
    generator: Arc<PlanGenerator>,
}

impl ProjectNode {
    pub fn new(generator: Arc<PlanGenerator>) -> Self {
        Self { generator }
    }
}

impl Node<PlanState> for ProjectNode {
    fn run<'a>(&'a self, state: &'a PlanState) -> BoxFuture<'a, Result<PlanUpdate>> {
        Box::pin(async move {
            let modules: Vec<&str> = state.modules.iter().map(|m| m.title.as_str()).collect();
            let technologies: Vec<&str> = state
                .market
                .iter()
                .flat_map(|m| m.technologies.iter().map(|t| t.name.as_str()))
                .collect();
            let prompt = format!(
                "{}Modules: {}\nPriority skills: {}\nEmerging technologies: {}\n",
                learner_profile(&state.request),
                modules.join(", "),
                state.priority_skills.join(", "),
                technologies.join(", ")
            );

            match self.generator.generate::<ProjectsReply>(PROJECTS_SYSTEM, prompt).await {
                Ok(reply) => {
                    info!(projects = reply.projects.len(), "Project ideas generated");
                    Ok(PlanUpdate::Projects(reply.projects))
                }
                Err(e) => {
                    warn!(error = %e, "Project generation failed");
                    Ok(PlanUpdate::degraded("generate_projects", e, PlanUpdate::Projects(vec![])))
                }
            }
        })
    }
}

// --- plan_timeline ---

/// Week-by-week outline for a module that came without one.
pub fn default_breakdown(module: &Module) -> Vec<WeekPlan> {
    (1..=module.duration_weeks.clamp(1, MAX_TIMELINE_WEEKS))
        .map(|week| {
            if week == 1 {
                WeekPlan {
                    week,
                    theme: format!(
                        "Week 1: {}",
                        module.topics.first().map(String::as_str).unwrap_or("")
                    )
                    .trim_end()
                    .to_string(),
                    goals: module.learning_outcomes.iter().take(2).cloned().collect(),
                    deliverables: vec!["Complete exercises".into(), "Mini-project".into()],
                    time_commitment_hours: default_weekly_hours(),
                }
            } else {
                WeekPlan {
                    week,
                    theme: format!("Week {}: Practice & Build", week),
                    goals: vec!["Apply concepts".into(), "Build projects".into()],
                    deliverables: vec!["Complete exercises".into(), "Mini-project".into()],
                    time_commitment_hours: default_weekly_hours(),
                }
            }
        })
        .collect()
}

/// Fill in missing weekly breakdowns. Never calls the backend.
pub fn plan_timeline(state: &PlanState) -> Result<PlanUpdate> {
    let modules = state
        .modules
        .iter()
        .cloned()
        .map(|mut module| {
            if module.weekly_breakdown.is_empty() {
                module.weekly_breakdown = default_breakdown(&module);
            }
            module
        })
        .collect();
    Ok(PlanUpdate::Modules(modules))
}
