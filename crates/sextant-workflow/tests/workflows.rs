use std::sync::Arc;
use std::time::Duration;

use sextant_cache::{QueryCache, SqliteCacheStore};
use sextant_core::config::{ModelConfig, WorkflowConfig};
use sextant_core::error::SextantError;
use sextant_core::event::EventBus;
use sextant_core::types::{SourceContribution, SourceItem, SourcePayload, WorkflowEvent};
use sextant_sources::{CachedSource, ResearchAggregator, SourceRegistry, Throttle};
use sextant_test_utils::{items, FailingSource, MockLlm, StaticSource};
use sextant_workflow::plan::STAGES;
use sextant_workflow::{Confidence, Orchestrator, PlanRequest};

fn workflow(max_draft_iterations: usize, editorial_pass: bool) -> WorkflowConfig {
    WorkflowConfig {
        max_draft_iterations,
        editorial_pass,
        ..Default::default()
    }
}

fn aggregator(registry: SourceRegistry) -> Arc<ResearchAggregator> {
    Arc::new(ResearchAggregator::new(Arc::new(registry), Duration::from_secs(5)))
}

fn report_sources() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register(StaticSource::new(
        "web_search",
        SourcePayload::new(vec![SourceItem::new("AAPL Q3", "Revenue of 85.8 billion")]),
    ));
    registry.register(StaticSource::new("news_search", items(2)));
    registry
}

fn orchestrator(llm: &MockLlm, registry: SourceRegistry, workflow: &WorkflowConfig) -> Orchestrator {
    Orchestrator::new(
        Arc::new(llm.clone()),
        aggregator(registry),
        ModelConfig::new("test-model"),
        workflow,
    )
    .unwrap()
}

#[tokio::test]
async fn report_stops_on_completion_signal() {
    let llm = MockLlm::new();
    llm.push_ok("- Executive summary\n- Financials");
    llm.push_ok(r#"{"section": "S1", "complete": false}"#);
    llm.push_ok(r#"{"section": "S2", "complete": false}"#);
    llm.push_ok(r#"{"section": "", "complete": true}"#);

    let orch = orchestrator(&llm, report_sources(), &workflow(10, false));
    let response = orch.run_report("Should I buy Apple?", Some("AAPL"), Some("Apple")).await;

    assert!(response.error.is_none());
    assert!(!response.exhausted);
    // One plan call and exactly three drafting calls
    assert_eq!(llm.call_count(), 4);

    let report = response.final_report.unwrap();
    assert!(report.contains("S1\n\nS2"));
    assert!(!report.contains("PLAN_COMPLETE"));
    assert_eq!(response.plan.as_deref(), Some("- Executive summary\n- Financials"));
    assert_eq!(response.model, "test-model");
    assert_eq!(response.evidence.unwrap().sources.len(), 2);
}

#[tokio::test]
async fn legacy_sentinel_also_stops_drafting() {
    let llm = MockLlm::new();
    llm.push_ok("plan");
    llm.push_ok("S1");
    llm.push_ok("S2\n\nPLAN_COMPLETE");

    let orch = orchestrator(&llm, report_sources(), &workflow(10, false));
    let response = orch.run_report("q", None, None).await;

    assert_eq!(llm.call_count(), 3);
    let report = response.final_report.unwrap();
    assert!(report.contains("S1\n\nS2"));
    assert!(!report.contains("PLAN_COMPLETE"));
}

#[tokio::test]
async fn draft_loop_is_capped_when_the_drafter_never_finishes() {
    let llm = MockLlm::with_default("   ");
    llm.push_ok("plan");

    let orch = orchestrator(&llm, report_sources(), &workflow(3, false));
    let response = orch.run_report("q", Some("AAPL"), None).await;

    assert!(response.exhausted);
    assert!(response.error.is_none());
    assert_eq!(llm.call_count(), 1 + 3);
    let report = response.final_report.unwrap();
    assert!(report.contains("some planned sections may be missing"));
}

#[tokio::test]
async fn draft_cap_above_the_step_budget_still_assembles() {
    let llm = MockLlm::with_default("   ");
    llm.push_ok("plan");
    let config = WorkflowConfig {
        max_draft_iterations: 100,
        max_steps: 64,
        editorial_pass: false,
        ..Default::default()
    };

    let orch = orchestrator(&llm, report_sources(), &config);
    let response = orch.run_report("q", Some("AAPL"), None).await;

    assert!(response.error.is_none(), "{:?}", response.error);
    assert!(response.exhausted);
    assert_eq!(llm.call_count(), 1 + 100);
    assert!(response
        .final_report
        .unwrap()
        .contains("some planned sections may be missing"));
}

#[tokio::test]
async fn drafting_failure_halts_with_partial_state() {
    let llm = MockLlm::new();
    llm.push_ok("plan");
    llm.push_ok(r#"{"section": "S1"}"#);
    llm.push_err(SextantError::transport("test-model", "HTTP 503 Service Unavailable"));

    let orch = orchestrator(&llm, report_sources(), &workflow(10, false));
    let response = orch.run_report("q", None, None).await;

    let error = response.error.unwrap();
    assert!(error.starts_with("draft: "), "{}", error);
    assert!(error.contains("503"));
    assert_eq!(response.plan.as_deref(), Some("plan"));
    assert!(response.evidence.is_some());
    assert!(response.final_report.is_none());
}

#[tokio::test]
async fn unavailable_sources_still_produce_an_annotated_report() {
    let mut registry = SourceRegistry::new();
    registry.register(FailingSource::new("web_search", "connection reset"));
    let llm = MockLlm::new();
    llm.push_ok("plan");
    llm.push_ok(r#"{"section": "Revenue grew 12% to 90 billion.", "complete": true}"#);

    let orch = orchestrator(&llm, registry, &workflow(10, true));
    let response = orch.run_report("q", None, None).await;

    let evidence = response.evidence.unwrap();
    assert!(matches!(evidence.get("web_search"), Some(SourceContribution::Unavailable { .. })));
    assert_eq!(
        evidence.get("news_search"),
        Some(&SourceContribution::unavailable("no adapter registered"))
    );

    let report = response.final_report.unwrap();
    assert!(report.contains("No external evidence was retrieved"));
    assert!(report.contains("estimates: 12, 90."));
    assert!(report.contains("**Confidence Level:** Low"));
    // Synthesis is skipped when there is no evidence at all
    assert!(report.contains("No evidence was available for: news_search, web_search."));
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn repeated_reports_are_served_from_the_cache() {
    let cache = QueryCache::new(Arc::new(SqliteCacheStore::in_memory().unwrap()));
    let web = StaticSource::new("web_search", items(3));
    let news = StaticSource::new("news_search", items(1)).with_source_type("web_search");
    let throttle = Arc::new(Throttle::new(Duration::ZERO));
    let day = Duration::from_secs(86_400);

    let mut registry = SourceRegistry::new();
    registry.register(CachedSource::new(Arc::new(web.clone()), cache.clone(), throttle.clone(), day));
    registry.register(CachedSource::new(Arc::new(news.clone()), cache.clone(), throttle, day));

    let llm = MockLlm::with_default(r#"{"section": "", "complete": true}"#);
    let orch = orchestrator(&llm, registry, &workflow(10, false));

    for _ in 0..2 {
        let response = orch.run_report("q", Some("AAPL"), None).await;
        assert!(response.error.is_none());
    }
    assert_eq!(web.calls(), 1);
    assert_eq!(news.calls(), 1);
    assert_eq!(cache.stats().unwrap().total_entries, 2);
}

fn plan_sources() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register(StaticSource::new(
        "web_search",
        SourcePayload::new(vec![SourceItem::new("Rust jobs", "Demand for Axum and Tokio grows")]),
    ));
    registry.register(StaticSource::new(
        "hackernews",
        SourcePayload::new(vec![SourceItem::new("Show HN: Axum 0.8", "release notes")]),
    ));
    registry.register(StaticSource::new("github_trends", items(2)));
    registry.register(FailingSource::new("youtube", "quota exceeded"));
    registry
}

fn plan_request() -> PlanRequest {
    PlanRequest {
        topic: "rust".into(),
        experience_level: "intermediate".into(),
        strengths: vec!["ownership".into()],
        weaknesses: vec!["async".into(), "macros".into()],
        score: 64,
    }
}

#[tokio::test]
async fn plan_runs_every_stage_in_order() {
    let llm = MockLlm::new();
    llm.on(
        "You extract emerging technologies",
        r#"{"emerging_technologies": ["Axum", "Bevy"]}"#,
    );
    llm.on(
        "You analyze skill gaps",
        r#"{"critical_gaps": ["async"], "emerging_skills": ["axum"], "foundational_skills": ["traits"]}"#,
    );
    llm.on(
        "You define measurable learning objectives",
        r#"{"objectives": [{"title": "Async", "estimated_weeks": 3}, {"title": "Web", "estimated_weeks": 3}]}"#,
    );
    llm.on(
        "You design curricula",
        r#"{"modules": [{"title": "Async Rust", "duration_weeks": 2, "topics": ["futures"], "learning_outcomes": ["explain polling"]}]}"#,
    );
    llm.on(
        "You curate learning resources",
        r#"{"resources": [{"title": "Async Book", "type": "book", "difficulty": "intermediate", "url_pattern": "https://rust-lang.github.io/async-book"}]}"#,
    );
    llm.on(
        "You propose portfolio projects",
        r#"{"projects": [{"title": "Chat server", "difficulty": "advanced", "technologies": ["tokio"]}]}"#,
    );

    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let orch = orchestrator(&llm, plan_sources(), &workflow(10, true)).with_events(bus);
    let response = orch.run_plan(plan_request()).await;

    assert!(response.error.is_none());
    let plan = response.plan;
    // 3 + 3 weeks clamps up to the minimum
    assert_eq!(plan.timeline_weeks, 8);
    assert_eq!(plan.priority_skills, vec!["async"]);
    assert_eq!(plan.learning_modules.len(), 1);

    let module = &plan.learning_modules[0];
    assert_eq!(module.weekly_breakdown.len(), 2);
    assert_eq!(module.weekly_breakdown[0].theme, "Week 1: futures");
    assert_eq!(module.resources[0].title, "Async Book");
    assert_eq!(plan.project_ideas[0].title, "Chat server");

    assert_eq!(plan.market_trends.len(), 2);
    assert_eq!(plan.market_trends[0].trend_name, "Axum");
    assert_eq!(plan.market_trends[0].mentions, 2);
    assert!(!plan.market_trends[1].evidenced);
    assert_eq!(plan.confidence, Confidence::Medium);
    assert!(plan.assumptions.iter().any(|a| a.contains("youtube")));

    let mut started = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let WorkflowEvent::StageStarted { node, .. } = event {
            started.push(node);
        }
    }
    assert_eq!(started, STAGES);
}

#[tokio::test]
async fn plan_degrades_when_the_backend_is_down() {
    let llm = MockLlm::new();
    let orch = orchestrator(&llm, plan_sources(), &workflow(10, true));
    let response = orch.run_plan(plan_request()).await;

    assert!(response.error.is_none());
    let plan = response.plan;
    assert_eq!(plan.priority_skills, vec!["async", "macros"]);
    assert_eq!(plan.timeline_weeks, 12);
    assert!(plan.learning_modules.is_empty());
    assert!(plan
        .assumptions
        .iter()
        .any(|a| a.starts_with("Stage fell back to defaults: analyze_gaps")));
}

#[tokio::test]
async fn halted_plan_returns_the_fallback_outline() {
    let llm = MockLlm::new();
    let config = WorkflowConfig {
        max_steps: 3,
        ..Default::default()
    };
    let orch = orchestrator(&llm, plan_sources(), &config);
    let response = orch.run_plan(plan_request()).await;

    assert!(response.error.unwrap().contains("Workflow exhausted"));
    assert_eq!(
        response.plan.priority_skills,
        vec!["Core rust concepts", "Best practices", "Real-world applications"]
    );
    assert_eq!(response.plan.timeline_weeks, 12);
}
