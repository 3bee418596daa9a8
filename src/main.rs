use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sextant_cache::{QueryCache, SqliteCacheStore};
use sextant_core::config::{
    AppConfig, CacheConfig, GithubConfig, ModelConfig, SerperConfig, SourcesConfig,
    WorkflowConfig, YoutubeConfig,
};
use sextant_core::event::EventBus;
use sextant_core::traits::LlmClient;
use sextant_core::types::WorkflowEvent;
use sextant_sources::{ResearchAggregator, SourceRegistry};
use sextant_workflow::{LearningPlan, Orchestrator, PlanRequest, ReportResponse};

#[derive(Parser)]
#[command(name = "sextant", version, about = "Evidence-backed research reports and learning plans")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sextant.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a question and write an equity report
    Report {
        /// The question to answer
        #[arg(trailing_var_arg = true, required = true)]
        question: Vec<String>,
        /// Ticker symbol of the company
        #[arg(long)]
        symbol: Option<String>,
        /// Company name
        #[arg(long)]
        name: Option<String>,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build a personalized learning plan
    Plan {
        #[arg(long)]
        topic: String,
        /// Experience level (beginner, intermediate, advanced)
        #[arg(long, default_value = "intermediate")]
        level: String,
        /// A strength from the assessment (repeatable)
        #[arg(long = "strength")]
        strengths: Vec<String>,
        /// A weakness from the assessment (repeatable)
        #[arg(long = "weakness")]
        weaknesses: Vec<String>,
        /// Assessment score out of 100
        #[arg(long, default_value_t = 0)]
        score: u32,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or maintain the query cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry counts per source
    Stats,
    /// Delete expired and invalidated entries
    Purge,
    /// Mark entries invalid without deleting them
    Invalidate {
        /// Only entries of this source
        #[arg(long)]
        source: Option<String>,
        /// Only entries whose key starts with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sextant=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Completions need no config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "sextant", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Cache { action } => {
            let cache = open_cache(&config)?;
            run_cache(&cache, action)?;
        }
        Commands::Report {
            question,
            symbol,
            name,
            json,
        } => {
            let question = question.join(" ");
            let orchestrator = build_orchestrator(&config, json)?;
            let response = orchestrator
                .run_report(&question, symbol.as_deref(), name.as_deref())
                .await;
            print_report(&response, json)?;
            if let Some(error) = response.error {
                anyhow::bail!("report failed: {}", error);
            }
        }
        Commands::Plan {
            topic,
            level,
            strengths,
            weaknesses,
            score,
            json,
        } => {
            let orchestrator = build_orchestrator(&config, json)?;
            let response = orchestrator
                .run_plan(PlanRequest {
                    topic,
                    experience_level: level,
                    strengths,
                    weaknesses,
                    score,
                })
                .await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_plan(&response.plan);
            }
            if let Some(error) = response.error {
                warn!(error = %error, "Learning plan fell back to the minimal outline");
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Explicit config file, then ~/.sextant/config.toml, then the environment.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    if let Some(home) = dirs_home() {
        let fallback = home.join(".sextant").join("config.toml");
        if fallback.exists() {
            info!(path = %fallback.display(), "Using config from home directory");
            return Ok(AppConfig::load(&fallback)?);
        }
    }

    warn!(path = %path.display(), "Config file not found, using environment");
    Ok(create_env_config())
}

fn create_env_config() -> AppConfig {
    let model = match std::env::var("OPENAI_API_KEY") {
        Ok(key) => ModelConfig {
            api_key: Some(key),
            ..ModelConfig::new("gpt-4o-mini")
        },
        // Local Ollama
        Err(_) => ModelConfig {
            provider: "ollama".to_string(),
            ..ModelConfig::new("llama3.2")
        },
    };

    let sources = SourcesConfig {
        serper: std::env::var("SERPER_API_KEY").ok().map(|api_key| SerperConfig {
            api_key,
            results: 10,
            country: "us".to_string(),
        }),
        github: Some(GithubConfig {
            token: std::env::var("GITHUB_TOKEN").ok(),
            per_page: 30,
        }),
        youtube: std::env::var("YOUTUBE_API_KEY").ok().map(|api_key| YoutubeConfig {
            api_key,
            max_results: 25,
        }),
        ..Default::default()
    };

    AppConfig {
        workspace: "~/.sextant".to_string(),
        model,
        fallback_models: vec![],
        cache: CacheConfig::default(),
        sources,
        workflow: WorkflowConfig::default(),
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn open_cache(config: &AppConfig) -> anyhow::Result<QueryCache> {
    let store = SqliteCacheStore::open(&config.cache_path())?;
    Ok(QueryCache::new(Arc::new(store)))
}

fn build_orchestrator(config: &AppConfig, quiet: bool) -> anyhow::Result<Orchestrator> {
    let cache = open_cache(config)?;
    let registry = Arc::new(SourceRegistry::with_builtins(config, cache));
    let aggregator = Arc::new(ResearchAggregator::new(registry, config.sources.timeout()));
    let llm: Arc<dyn LlmClient> = Arc::from(sextant_llm::create_client(config));

    let orchestrator = Orchestrator::new(llm, aggregator, config.model.clone(), &config.workflow)?;
    if quiet {
        return Ok(orchestrator);
    }

    let bus = Arc::new(EventBus::default());
    spawn_progress_printer(&bus);
    Ok(orchestrator.with_events(bus))
}

/// Print stage progress to stderr so stdout stays clean for the result.
fn spawn_progress_printer(bus: &EventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                WorkflowEvent::RunStarted { workflow, .. } => {
                    eprintln!("\x1b[1m{}\x1b[0m", workflow);
                }
                WorkflowEvent::StageStarted { node, iteration, .. } => {
                    if iteration > 1 {
                        eprintln!("  \x1b[36m→ {} (#{})\x1b[0m", node, iteration);
                    } else {
                        eprintln!("  \x1b[36m→ {}\x1b[0m", node);
                    }
                }
                WorkflowEvent::StageCompleted { node, elapsed_ms, .. } => {
                    eprintln!("  \x1b[32m✓ {} ({}ms)\x1b[0m", node, elapsed_ms);
                }
                WorkflowEvent::StageFailed { node, error, .. } => {
                    eprintln!("  \x1b[31m✗ {}: {}\x1b[0m", node, error);
                }
                WorkflowEvent::IterationCapReached { node, cap, .. } => {
                    eprintln!("  \x1b[33m! {} stopped after {} iterations\x1b[0m", node, cap);
                }
                WorkflowEvent::RunFinished { status, .. } => {
                    eprintln!("\x1b[2m[{:?}]\x1b[0m", status);
                }
            }
        }
    });
}

fn run_cache(cache: &QueryCache, action: CacheAction) -> anyhow::Result<()> {
    match action {
        CacheAction::Stats => {
            let stats = cache.stats()?;
            println!(
                "{} entries ({} active, {} expired, {} invalidated)",
                stats.total_entries,
                stats.active_entries,
                stats.expired_entries,
                stats.invalidated_entries
            );
            for source in &stats.by_source {
                println!(
                    "  {:<16} {:>6} entries {:>8} hits",
                    source.source, source.entries, source.total_hits
                );
            }
        }
        CacheAction::Purge => {
            let removed = cache.purge_expired()?;
            println!("Purged {} entries", removed);
        }
        CacheAction::Invalidate { source, prefix } => {
            let count = cache.invalidate(source.as_deref(), prefix.as_deref())?;
            println!("Invalidated {} entries", count);
        }
    }
    Ok(())
}

fn print_report(response: &ReportResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }
    match &response.final_report {
        Some(report) => println!("{}", report),
        None => {
            if let Some(plan) = &response.plan {
                println!("Research plan:\n{}", plan);
            }
        }
    }
    Ok(())
}

fn print_plan(plan: &LearningPlan) {
    println!("# Learning plan: {} ({} weeks)\n", plan.topic, plan.timeline_weeks);

    if !plan.priority_skills.is_empty() {
        println!("## Priority skills");
        for skill in &plan.priority_skills {
            println!("- {}", skill);
        }
        println!();
    }

    for module in &plan.learning_modules {
        println!("## {} ({} weeks)", module.title, module.duration_weeks);
        if !module.description.is_empty() {
            println!("{}", module.description);
        }
        for week in &module.weekly_breakdown {
            println!("- {}", week.theme);
        }
        for resource in &module.resources {
            println!("  * [{}] {} <{}>", resource.kind, resource.title, resource.url);
        }
        println!();
    }

    if !plan.project_ideas.is_empty() {
        println!("## Projects");
        for project in &plan.project_ideas {
            println!("- {} ({:?}, {} weeks)", project.title, project.difficulty, project.duration_weeks);
        }
        println!();
    }

    if !plan.market_trends.is_empty() {
        println!("## Market trends");
        for trend in &plan.market_trends {
            println!("- {} ({} mentions)", trend.trend_name, trend.mentions);
        }
        println!();
    }

    if !plan.assumptions.is_empty() {
        println!("## Assumptions");
        for assumption in &plan.assumptions {
            println!("- {}", assumption);
        }
        println!();
    }
    println!("**Confidence Level:** {}", plan.confidence);
}
