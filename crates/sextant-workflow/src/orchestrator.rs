use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use sextant_core::config::{ModelConfig, WorkflowConfig};
use sextant_core::error::Result;
use sextant_core::event::EventBus;
use sextant_core::traits::LlmClient;
use sextant_core::types::{ResearchBundle, RunStatus};
use sextant_llm::StructuredRetryPolicy;
use sextant_sources::{ResearchAggregator, Synthesizer};

use crate::graph::{CompiledGraph, RunLimits};
use crate::plan::{self, LearningPlan, PlanGenerator, PlanRequest, PlanState};
use crate::report::{self, ReportAssembler, ReportState};

/// Outcome of a report run. `error` is set whenever the run halted; the
/// other fields hold whatever was produced before that.
#[derive(Debug, Clone, Serialize)]
pub struct ReportResponse {
    pub question: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub plan: Option<String>,
    pub evidence: Option<ResearchBundle>,
    pub final_report: Option<String>,
    pub model: String,
    pub error: Option<String>,
    /// Drafting was cut off by the iteration cap.
    pub exhausted: bool,
}

/// Outcome of a learning-plan run. A halted run still carries a plan: the
/// minimal fallback outline.
#[derive(Debug, Clone, Serialize)]
pub struct PlanResponse {
    pub plan: LearningPlan,
    pub error: Option<String>,
}

/// Entry points for the two workflows.
///
/// All collaborators are passed in at construction; both graphs are compiled
/// once and reused for every run.
pub struct Orchestrator {
    model_id: String,
    report: CompiledGraph<ReportState>,
    plan: CompiledGraph<PlanState>,
    report_limits: RunLimits,
    plan_limits: RunLimits,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        aggregator: Arc<ResearchAggregator>,
        model: ModelConfig,
        workflow: &WorkflowConfig,
    ) -> Result<Self> {
        let mut assembler = ReportAssembler::new();
        if workflow.editorial_pass {
            assembler = assembler.with_synthesizer(Synthesizer::new(llm.clone(), model.clone()));
        }

        let report = report::build_graph(
            llm.clone(),
            model.clone(),
            aggregator.clone(),
            assembler,
            workflow.max_draft_iterations,
        )?;

        let generator = Arc::new(PlanGenerator::new(
            llm,
            model.clone(),
            StructuredRetryPolicy::from(&workflow.structured_retry),
        ));
        let plan = plan::build_graph(aggregator, generator)?;

        let max_iterations = workflow.max_draft_iterations.max(1);
        // The step budget must leave room for assembly after a capped draft loop
        let report_steps = report::steps_needed(max_iterations);
        if workflow.max_steps < report_steps {
            warn!(
                max_steps = workflow.max_steps,
                max_draft_iterations = max_iterations,
                raised_to = report_steps,
                "Step budget too small for the draft cap, raising it for reports"
            );
        }

        Ok(Self {
            model_id: model.model_id,
            report,
            plan,
            report_limits: RunLimits {
                max_iterations,
                max_steps: workflow.max_steps.max(report_steps),
            },
            plan_limits: RunLimits {
                max_iterations,
                max_steps: workflow.max_steps,
            },
        })
    }

    /// Publish stage events of every run on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.report = self.report.with_events(bus.clone());
        self.plan = self.plan.with_events(bus);
        self
    }

    pub async fn run_report(
        &self,
        question: &str,
        symbol: Option<&str>,
        name: Option<&str>,
    ) -> ReportResponse {
        info!(question, symbol, name, "Running report");
        let state = ReportState::new(question, self.model_id.clone())
            .with_symbol(symbol.map(str::to_string))
            .with_name(name.map(str::to_string));

        let outcome = self.report.run(state, self.report_limits).await;
        if outcome.status == RunStatus::Failed {
            error!(
                run_id = %outcome.run_id,
                error = outcome.state.error.as_deref().unwrap_or("unknown"),
                "Report run failed"
            );
        } else if outcome.exhausted {
            warn!(run_id = %outcome.run_id, "Report assembled after the draft cap was reached");
        }

        let state = outcome.state;
        ReportResponse {
            question: state.question,
            symbol: state.symbol,
            name: state.name,
            plan: state.plan,
            evidence: state.evidence,
            final_report: state.final_report,
            model: state.model,
            error: state.error,
            exhausted: outcome.exhausted,
        }
    }

    pub async fn run_plan(&self, request: PlanRequest) -> PlanResponse {
        info!(topic = %request.topic, level = %request.experience_level, "Running learning plan");
        let topic = request.topic.clone();

        let outcome = self.plan.run(PlanState::new(request), self.plan_limits).await;
        let state = outcome.state;
        if !state.degraded.is_empty() {
            warn!(stages = ?state.degraded, "Learning plan completed with fallbacks");
        }

        match (state.plan, state.error) {
            (Some(plan), error) => PlanResponse { plan, error },
            (None, error) => {
                error!(run_id = %outcome.run_id, error = ?error, "Learning plan run failed, returning fallback");
                PlanResponse {
                    plan: LearningPlan::fallback(&topic),
                    error: Some(error.unwrap_or_else(|| "plan was not assembled".to_string())),
                }
            }
        }
    }
}
