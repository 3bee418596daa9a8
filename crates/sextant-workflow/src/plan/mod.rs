//! Learning-plan workflow: eight stages in a straight line, from market
//! research to the assembled plan. Every generative stage degrades to a
//! default on failure, so a run only halts on engine-level problems.

pub mod assembler;
pub mod nodes;
pub mod state;

use std::sync::Arc;

use sextant_core::error::Result;
use sextant_sources::ResearchAggregator;

use crate::graph::{CompiledGraph, FnNode, StateGraph, END};

pub use assembler::assemble_plan;
pub use nodes::{
    plan_timeline, CurriculumNode, MarketResearchNode, ObjectivesNode, PlanGenerator, ProjectNode,
    ResourceNode, SkillGapNode,
};
pub use state::{LearningPlan, PlanRequest, PlanState, PlanUpdate};

pub const RESEARCH_MARKET: &str = "research_market";
pub const ANALYZE_GAPS: &str = "analyze_gaps";
pub const DEFINE_OBJECTIVES: &str = "define_objectives";
pub const DESIGN_CURRICULUM: &str = "design_curriculum";
pub const CURATE_RESOURCES: &str = "curate_resources";
pub const GENERATE_PROJECTS: &str = "generate_projects";
pub const PLAN_TIMELINE: &str = "plan_timeline";
pub const ASSEMBLE_PLAN: &str = "assemble_plan";

/// Stage order of the plan workflow.
pub const STAGES: [&str; 8] = [
    RESEARCH_MARKET,
    ANALYZE_GAPS,
    DEFINE_OBJECTIVES,
    DESIGN_CURRICULUM,
    CURATE_RESOURCES,
    GENERATE_PROJECTS,
    PLAN_TIMELINE,
    ASSEMBLE_PLAN,
];

pub fn build_graph(
    aggregator: Arc<ResearchAggregator>,
    generator: Arc<PlanGenerator>,
) -> Result<CompiledGraph<PlanState>> {
    let mut graph = StateGraph::new("plan")
        .add_node(RESEARCH_MARKET, MarketResearchNode::new(aggregator, generator.clone()))
        .add_node(ANALYZE_GAPS, SkillGapNode::new(generator.clone()))
        .add_node(DEFINE_OBJECTIVES, ObjectivesNode::new(generator.clone()))
        .add_node(DESIGN_CURRICULUM, CurriculumNode::new(generator.clone()))
        .add_node(CURATE_RESOURCES, ResourceNode::new(generator.clone()))
        .add_node(GENERATE_PROJECTS, ProjectNode::new(generator))
        .add_node(PLAN_TIMELINE, FnNode::new(plan_timeline))
        .add_node(ASSEMBLE_PLAN, FnNode::new(assemble_plan))
        .set_entry(RESEARCH_MARKET);

    for pair in STAGES.windows(2) {
        graph = graph.add_edge(pair[0], pair[1]);
    }
    graph.add_edge(ASSEMBLE_PLAN, END).compile()
}
