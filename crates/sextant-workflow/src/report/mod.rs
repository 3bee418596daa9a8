//! Financial-report workflow.
//!
//! `plan → fetch → draft ↺ → assemble`. The draft stage loops through
//! [`route_drafting`] until the drafter signals completion, the section
//! budget is used up, or the engine's iteration cap forces assembly.

pub mod assembler;
pub mod nodes;
pub mod state;

use std::sync::Arc;

use sextant_core::config::ModelConfig;
use sextant_core::error::Result;
use sextant_core::traits::LlmClient;
use sextant_sources::ResearchAggregator;

use crate::graph::{CompiledGraph, StateGraph, END};

pub use assembler::ReportAssembler;
pub use nodes::{parse_draft, route_drafting, AssembleNode, DraftNode, FetchNode, PlanNode};
pub use state::{DraftFragment, ReportState, ReportUpdate};

pub const PLAN: &str = "plan";
pub const FETCH: &str = "fetch";
pub const DRAFT: &str = "draft";
pub const ASSEMBLE: &str = "assemble";

/// Stage executions of a report run that drafts `drafts` times: plan, fetch
/// and assemble run once each.
pub fn steps_needed(drafts: usize) -> usize {
    drafts.saturating_add(3)
}

/// Build the report graph. `max_sections` bounds both the router's section
/// budget and, through the caller's run limits, the draft loop itself.
pub fn build_graph(
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    aggregator: Arc<ResearchAggregator>,
    assembler: ReportAssembler,
    max_sections: usize,
) -> Result<CompiledGraph<ReportState>> {
    StateGraph::new("report")
        .add_node(PLAN, PlanNode::new(llm.clone(), model.clone()))
        .add_node(FETCH, FetchNode::new(aggregator))
        .add_node(DRAFT, DraftNode::new(llm, model))
        .add_node(ASSEMBLE, AssembleNode::new(assembler))
        .set_entry(PLAN)
        .add_edge(PLAN, FETCH)
        .add_edge(FETCH, DRAFT)
        .add_conditional_edges(
            DRAFT,
            route_drafting(max_sections),
            [("more", DRAFT), ("done", ASSEMBLE)],
        )
        .on_exhausted(DRAFT, "done")
        .add_edge(ASSEMBLE, END)
        .compile()
}
