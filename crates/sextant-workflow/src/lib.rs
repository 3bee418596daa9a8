pub mod annotation;
pub mod graph;
pub mod orchestrator;
pub mod plan;
pub mod report;

pub use annotation::Confidence;
pub use graph::{CompiledGraph, Edge, FnNode, Node, RunLimits, RunOutcome, StageRecord, StateGraph, WorkflowState, END};
pub use orchestrator::{Orchestrator, PlanResponse, ReportResponse};
pub use plan::{LearningPlan, PlanRequest};
pub use report::{DraftFragment, ReportState};
