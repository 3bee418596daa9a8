use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, warn};

use sextant_core::config::ModelConfig;
use sextant_core::error::{Result, SextantError};
use sextant_core::traits::LlmClient;
use sextant_core::types::{CompletionRequest, QueryParams};
use sextant_llm::extract_json;
use sextant_sources::ResearchAggregator;

use super::assembler::ReportAssembler;
use super::state::{DraftFragment, ReportState, ReportUpdate};
use crate::graph::Node;

/// Plain-text completion marker accepted from backends that ignore the JSON
/// reply format.
pub const COMPLETION_SENTINEL: &str = "PLAN_COMPLETE";

/// Sources queried by the fetch stage.
pub const REPORT_SOURCES: [&str; 2] = ["web_search", "news_search"];

const MAX_ITEMS_PER_SOURCE: usize = 10;

const PLAN_SYSTEM: &str = "You write institutional-quality equity research. Create an ordered \
research plan for a full equity research report answering the user's question. For every \
section, name the exact data or analysis it needs. The plan must cover these sections in order:
1. Executive Summary & Recommendation
2. Company Overview & Business Model
3. Industry & Macro Analysis
4. Financial Analysis (Historical)
5. Valuation & Projections
6. Core Risks & Monitoring Indicators
7. Environmental, Social, and Governance (ESG) Considerations
Reply with the plan only, as a list of bullet points.";

const DRAFT_SYSTEM: &str = "You are an equity research analyst drafting a report one section \
at a time. Use the research plan and the gathered evidence. Write the next section of the plan \
that the existing draft does not cover yet; never repeat a section already drafted. Do not \
invent figures: if data is missing, say it is unavailable. Reply with a JSON object \
{\"section\": \"<markdown text of the next section>\", \"complete\": false}. When the existing \
draft already covers every planned section, reply {\"section\": \"\", \"complete\": true}.";

/// Produces the research plan.
pub struct PlanNode {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
}

impl PlanNode {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig) -> Self {
        Self { llm, model }
    }
}

impl Node<ReportState> for PlanNode {
    fn run<'a>(&'a self, state: &'a ReportState) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(async move {
            let mut prompt = format!("User question: {}", state.question);
            if let Some(subject) = state.subject() {
                prompt.push_str(&format!("\nCompany: {}", subject));
            }

            let plan = self
                .llm
                .complete(
                    &self.model,
                    CompletionRequest::new(prompt)
                        .with_system(PLAN_SYSTEM)
                        .with_temperature(0.2),
                )
                .await?;

            let plan = plan.trim();
            if plan.is_empty() {
                return Err(SextantError::malformed(&self.model.model_id, "empty research plan"));
            }
            Ok(ReportUpdate::Plan(plan.to_string()))
        })
    }
}

/// Gathers web and news evidence. An empty bundle is not an error.
pub struct FetchNode {
    aggregator: Arc<ResearchAggregator>,
}

impl FetchNode {
    pub fn new(aggregator: Arc<ResearchAggregator>) -> Self {
        Self { aggregator }
    }
}

/// Search query for a report: targeted at the company when one is named,
/// otherwise derived from the question.
pub fn search_query(state: &ReportState) -> String {
    let company = [state.symbol.as_deref(), state.name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    if company.is_empty() {
        format!(
            "{}. Latest financial data, institutional recommendations, and recent news.",
            state.question.trim_end_matches(['.', '?', '!'])
        )
    } else {
        format!(
            "Latest financial data (last quarter or last year), institutional buy/sell/hold \
             recommendations, and recent news for {}",
            company
        )
    }
}

impl Node<ReportState> for FetchNode {
    fn run<'a>(&'a self, state: &'a ReportState) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(async move {
            let query = search_query(state);
            let news_query = state.subject().unwrap_or_else(|| state.question.clone());
            debug!(query = %query, "Fetching report evidence");

            let mut queries = BTreeMap::new();
            queries.insert(
                REPORT_SOURCES[0].to_string(),
                QueryParams::new().with("q", query.as_str()),
            );
            queries.insert(
                REPORT_SOURCES[1].to_string(),
                QueryParams::new().with("q", news_query.as_str()),
            );

            let bundle = self.aggregator.gather(&state.question, queries).await;
            Ok(ReportUpdate::Evidence(bundle))
        })
    }
}

/// Drafts the next section of the report.
pub struct DraftNode {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
}

impl DraftNode {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig) -> Self {
        Self { llm, model }
    }
}

fn draft_prompt(state: &ReportState) -> String {
    let mut prompt = format!("User question: {}\n\n", state.question);
    prompt.push_str("Research plan:\n");
    prompt.push_str(state.plan.as_deref().unwrap_or("(none)"));
    prompt.push_str("\n\nEvidence:\n");
    match &state.evidence {
        Some(bundle) if !bundle.sources.is_empty() => prompt.push_str(&bundle.render(MAX_ITEMS_PER_SOURCE)),
        _ => prompt.push_str("(none)\n"),
    }

    let sections = state.sections();
    prompt.push_str("\nExisting draft:\n");
    if sections.is_empty() {
        prompt.push_str("(empty)");
    } else {
        prompt.push_str(&sections.join("\n\n"));
    }
    prompt
}

impl Node<ReportState> for DraftNode {
    fn run<'a>(&'a self, state: &'a ReportState) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(async move {
            let raw = self
                .llm
                .complete(
                    &self.model,
                    CompletionRequest::new(draft_prompt(state))
                        .with_system(DRAFT_SYSTEM)
                        .with_temperature(0.3)
                        .json(),
                )
                .await?;

            let fragments = parse_draft(&raw);
            if fragments.is_empty() {
                warn!(drafted = state.sections().len(), "Drafter returned nothing");
            }
            Ok(ReportUpdate::Drafted(fragments))
        })
    }
}

#[derive(Deserialize)]
struct DraftReply {
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    complete: Option<bool>,
}

/// Interpret one drafter reply.
///
/// The JSON form `{"section", "complete"}` is preferred. Any other reply is
/// taken as section text, with the legacy sentinel marking completion. The
/// sentinel never survives into a section.
pub fn parse_draft(raw: &str) -> Vec<DraftFragment> {
    let structured = extract_json(raw)
        .and_then(|json| serde_json::from_str::<DraftReply>(json).ok())
        .filter(|reply| reply.section.is_some() || reply.complete.is_some());

    let (text, complete) = match structured {
        Some(reply) => (reply.section.unwrap_or_default(), reply.complete.unwrap_or(false)),
        None => (raw.to_string(), false),
    };
    let complete = complete || text.contains(COMPLETION_SENTINEL);
    let text = text.replace(COMPLETION_SENTINEL, "");
    let text = text.trim();

    let mut fragments = Vec::new();
    if !text.is_empty() {
        fragments.push(DraftFragment::Section(text.to_string()));
    }
    if complete {
        fragments.push(DraftFragment::Complete);
    }
    fragments
}

/// Router for the drafting loop: `done` once the drafter reports completion
/// or `max_sections` sections exist, `more` otherwise.
pub fn route_drafting(max_sections: usize) -> impl Fn(&ReportState) -> String + Send + Sync + 'static {
    move |state: &ReportState| {
        if state.is_complete() || state.sections().len() >= max_sections {
            "done".to_string()
        } else {
            "more".to_string()
        }
    }
}

/// Emits the final report.
pub struct AssembleNode {
    assembler: ReportAssembler,
}

impl AssembleNode {
    pub fn new(assembler: ReportAssembler) -> Self {
        Self { assembler }
    }
}

impl Node<ReportState> for AssembleNode {
    fn run<'a>(&'a self, state: &'a ReportState) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(async move { self.assembler.assemble(state).await.map(ReportUpdate::Report) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WorkflowState;
    use sextant_test_utils::MockLlm;

    #[test]
    fn test_parse_structured_reply() {
        assert_eq!(
            parse_draft(r###"{"section": "## Overview\nText", "complete": false}"###),
            vec![DraftFragment::Section("## Overview\nText".into())]
        );
        assert_eq!(
            parse_draft(r#"```json
{"section": "", "complete": true}
```"#),
            vec![DraftFragment::Complete]
        );
    }

    #[test]
    fn test_parse_plain_text_with_sentinel() {
        assert_eq!(parse_draft("  PLAN_COMPLETE \n"), vec![DraftFragment::Complete]);
        assert_eq!(
            parse_draft("## Risks\nSupply chain.\nPLAN_COMPLETE"),
            vec![
                DraftFragment::Section("## Risks\nSupply chain.".into()),
                DraftFragment::Complete
            ]
        );
    }

    #[test]
    fn test_unrelated_json_is_section_text() {
        let raw = "Valuation uses {\"pe\": 21} as the base case.";
        assert_eq!(parse_draft(raw), vec![DraftFragment::Section(raw.into())]);
        assert!(parse_draft("   ").is_empty());
    }

    #[test]
    fn test_route_drafting() {
        let route = route_drafting(2);
        let mut state = ReportState::new("q", "m");
        assert_eq!(route(&state), "more");

        state.apply(ReportUpdate::Drafted(vec![DraftFragment::Section("S1".into())]));
        assert_eq!(route(&state), "more");
        state.apply(ReportUpdate::Drafted(vec![DraftFragment::Complete]));
        assert_eq!(route(&state), "done");

        let mut capped = ReportState::new("q", "m");
        capped.apply(ReportUpdate::Drafted(vec![
            DraftFragment::Section("S1".into()),
            DraftFragment::Section("S2".into()),
        ]));
        assert_eq!(route(&capped), "done");
    }

    #[test]
    fn test_search_query_prefers_company() {
        let state = ReportState::new("Should I buy Apple?", "m")
            .with_symbol(Some("AAPL".into()))
            .with_name(Some("Apple Inc.".into()));
        assert!(search_query(&state).ends_with("for AAPL Apple Inc."));

        let state = ReportState::new("Is the chip sector overheated?", "m");
        assert!(search_query(&state).starts_with("Is the chip sector overheated. Latest"));
    }

    #[tokio::test]
    async fn test_plan_node_uses_low_temperature() {
        let llm = MockLlm::with_default("- Executive summary\n- Overview");
        let node = PlanNode::new(Arc::new(llm.clone()), ModelConfig::new("m"));
        let state = ReportState::new("q", "m").with_symbol(Some("MSFT".into()));

        match node.run(&state).await.unwrap() {
            ReportUpdate::Plan(plan) => assert!(plan.starts_with("- Executive")),
            other => panic!("unexpected update: {:?}", other),
        }
        let request = &llm.requests()[0];
        assert_eq!(request.temperature, Some(0.2));
        assert!(request.prompt.contains("Company: MSFT"));
    }

    #[tokio::test]
    async fn test_empty_plan_is_malformed() {
        let node = PlanNode::new(Arc::new(MockLlm::with_default("  ")), ModelConfig::new("m"));
        let err = node.run(&ReportState::new("q", "m")).await.unwrap_err();
        assert!(matches!(err, SextantError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_draft_prompt_carries_existing_sections() {
        let llm = MockLlm::with_default(r#"{"section": "S2", "complete": false}"#);
        let node = DraftNode::new(Arc::new(llm.clone()), ModelConfig::new("m"));
        let mut state = ReportState::new("q", "m");
        state.apply(ReportUpdate::Drafted(vec![DraftFragment::Section("S1 text".into())]));

        node.run(&state).await.unwrap();
        let request = &llm.requests()[0];
        assert!(request.json);
        assert!(request.prompt.contains("Existing draft:\nS1 text"));
    }
}
