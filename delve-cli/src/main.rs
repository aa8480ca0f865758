//! Delve CLI - command-line interface for deep research sessions
//!
//! A session asks clarifying questions, expands the research tree, prints the
//! learnings and writes the final report to the output directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use delve_clients::{DelveLlmClient, FirecrawlSearchClient};
use delve_core::{
    init_logging, log_operation_error, log_operation_start, log_operation_success,
    performance::measure_async, DelveConfig, DelveError, ErrorContext, LoggingConfig,
};
use delve_research::{
    Clarification, ClarificationPlanner, ProgressEvent, ReportStore, ReportSynthesizer,
    ResearchError, ResearchGoal, ResearchOrchestrator, ResearchResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "delve")]
#[command(about = "Recursive web research with LLM-written reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a topic and write a report
    Research {
        /// Research topic
        topic: String,

        /// Sibling queries per level
        #[arg(short, long)]
        breadth: Option<usize>,

        /// Recursive levels below the root
        #[arg(short, long)]
        depth: Option<usize>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the clarifying questions
        #[arg(long)]
        no_clarify: bool,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let loaded = load_config(cli.config.as_deref());

    let mut logging_config = loaded
        .as_ref()
        .map(|(config, _)| config.logging.clone())
        .unwrap_or_else(|_| LoggingConfig::default());
    if cli.verbose {
        logging_config = logging_config.verbose();
    }

    init_logging(&logging_config).map_err(|e| DelveError::Config {
        message: format!("Failed to initialize logging: {}", e),
        source: Some(e),
        context: ErrorContext::new("cli")
            .with_operation("init_logging")
            .with_suggestion("Check logging configuration"),
    })?;

    info!("Starting delve v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Research {
            topic,
            breadth,
            depth,
            output,
            no_clarify,
        } => {
            let (config, path) = loaded?;
            match path {
                Some(path) => info!("Loaded configuration from {:?}", path),
                None => info!("No configuration file found, using defaults"),
            }
            handle_research(topic, breadth, depth, output, no_clarify, config).await?;
        }
        Commands::Config {
            show,
            init,
            validate,
        } => {
            handle_config(show, init, validate, cli.config.as_deref()).await?;
        }
    }

    Ok(())
}

/// Load the explicit config file, else the first default location that exists
fn load_config(explicit: Option<&Path>) -> Result<(DelveConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let config = DelveConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        return Ok((config, Some(path.to_path_buf())));
    }

    for path in DelveConfig::default_paths() {
        if path.exists() {
            let config = DelveConfig::from_file(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            return Ok((config, Some(path)));
        }
    }

    Ok((DelveConfig::default(), None))
}

async fn handle_research(
    topic: String,
    breadth: Option<usize>,
    depth: Option<usize>,
    output: Option<PathBuf>,
    no_clarify: bool,
    mut config: DelveConfig,
) -> Result<()> {
    if let Some(breadth) = breadth {
        config.research.breadth = breadth;
    }
    if let Some(depth) = depth {
        config.research.depth = depth;
    }
    if let Some(output) = output {
        config.output.directory = output.to_string_lossy().to_string();
    }
    config.validate()?;

    log_operation_start!(
        "research_session",
        topic = %topic,
        breadth = config.research.breadth,
        depth = config.research.depth
    );

    let llm = Arc::new(
        DelveLlmClient::new(config.llm.clone(), config.research.llm_timeout_secs)
            .await
            .map_err(|e| {
                log_operation_error!("create_llm_client", e);
                e
            })?,
    );
    let search = Arc::new(FirecrawlSearchClient::new(
        &config.search,
        config.research.search_timeout_secs,
    )?);

    println!("🔎 Researching: {}", topic);

    // Step 1: clarify the research direction
    let goal = if no_clarify || config.output.max_clarifying_questions == 0 {
        ResearchGoal::new(topic.as_str())
    } else {
        println!("🤔 Generating clarifying questions...");
        let planner = ClarificationPlanner::new(
            llm.clone(),
            config.retry.with_attempts(config.research.planner_attempts),
        );
        let questions = planner
            .generate(&topic, config.output.max_clarifying_questions)
            .await;
        let clarifications = ask_questions(&questions).await?;
        ResearchGoal::new(topic.as_str()).with_clarifications(clarifications)
    };

    // Step 2: expand the research tree
    println!(
        "\n🚀 Starting research (breadth {}, depth {}). Press Ctrl-C to stop early.",
        config.research.breadth, config.research.depth
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling research run");
            signal_token.cancel();
        }
    });

    let (sender, receiver) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_progress(receiver));

    let orchestrator =
        ResearchOrchestrator::new(llm.clone(), search, config.research.clone(), &config.retry)
            .with_progress(sender);
    let result = measure_async("research_run", orchestrator.run(&goal, &cancel)).await;
    // closes the progress channel
    drop(orchestrator);
    let _ = printer.await;

    print_summary(&result);

    // Step 3: write the report
    let report = if result.is_cancelled() {
        println!("\n⏹️  Research cancelled; writing the learnings gathered so far.");
        ReportSynthesizer::fallback_report(&goal, &result)
    } else {
        println!("\n📝 Writing final report...");
        let synthesizer = ReportSynthesizer::new(
            llm,
            config.retry.with_attempts(config.research.synthesis_attempts),
        );
        match synthesizer.synthesize(&goal, &result).await {
            Ok(report) => report,
            Err(ResearchError::SynthesisFailure { message, result }) => {
                log_operation_error!("synthesize_report", message);
                println!("❌ Report synthesis failed: {}", message);
                println!("   Falling back to the raw learnings.");
                ReportSynthesizer::fallback_report(&goal, &result)
            }
            Err(e) => return Err(e.into()),
        }
    };

    println!("\n{}", report);

    let store = ReportStore::from_config(&config.output);
    let saved = store.save(&goal.topic, &report, &result).await?;
    println!("\n💾 Report saved to: {}", saved.report_path.display());
    println!("🔗 Sources saved to: {}", saved.sources_path.display());

    log_operation_success!(
        "research_session",
        learnings = result.learnings.len(),
        sources = result.sources.len(),
        cancelled = result.is_cancelled()
    );

    Ok(())
}

async fn ask_questions(questions: &[String]) -> Result<Vec<Clarification>> {
    if questions.is_empty() {
        println!("No clarifying questions were generated.");
        return Ok(Vec::new());
    }

    println!("\n❓ Please answer the following questions:");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut clarifications = Vec::with_capacity(questions.len());

    for (i, question) in questions.iter().enumerate() {
        stdout
            .write_all(format!("\nQuestion {}: {}\nAnswer: ", i + 1, question).as_bytes())
            .await?;
        stdout.flush().await?;

        let answer = lines.next_line().await?.unwrap_or_default();
        clarifications.push(Clarification {
            question: question.clone(),
            answer: answer.trim().to_string(),
        });
    }

    Ok(clarifications)
}

async fn print_progress(mut receiver: mpsc::UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = receiver.recv().await {
        match event {
            ProgressEvent::LevelStarted { level, nodes } => {
                println!("\n📚 Level {}: expanding {} node(s)", level + 1, nodes);
            }
            ProgressEvent::QueryCompleted {
                query,
                pages,
                learnings,
                ..
            } => {
                println!("   ✅ {} ({} pages, {} learnings)", query, pages, learnings);
            }
            ProgressEvent::QueryFailed { query, message } => {
                println!("   ⚠️  {} failed: {}", query, message);
            }
            ProgressEvent::LevelFinished {
                level,
                queries,
                learnings,
            } => {
                println!(
                    "   📊 Level {} done: {} queries, {} learnings",
                    level + 1,
                    queries,
                    learnings
                );
            }
        }
    }
}

fn print_summary(result: &ResearchResult) {
    println!("\n🧠 Learnings:");
    if result.learnings.is_empty() {
        println!("   (none)");
    }
    for learning in &result.learnings {
        println!(" - {}", learning.text);
    }

    let stats = &result.stats;
    println!("\n📊 Statistics:");
    println!("   • Queries executed: {}", stats.queries_executed);
    println!(
        "   • Search calls: {} ({} queries failed)",
        stats.search_calls, stats.search_failures
    );
    println!(
        "   • Pages extracted: {} ({} failed)",
        stats.pages_extracted, stats.extraction_failures
    );
    println!(
        "   • Duplicate queries skipped: {}",
        stats.duplicate_queries_skipped
    );
    println!("   • Sources: {}", result.sources.len());
}

async fn handle_config(
    show: bool,
    init: bool,
    validate: bool,
    explicit: Option<&Path>,
) -> Result<()> {
    if init {
        let config_path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);

        if config_path.exists() {
            println!(
                "⚠️  Configuration already exists at: {:?} (left unchanged)",
                config_path
            );
        } else {
            DelveConfig::default().save_to_file(&config_path)?;
            println!("✅ Configuration initialized at: {:?}", config_path);
            println!(
                "📝 Set OPENAI_API_KEY and FIRECRAWL_API_KEY (or edit the file) before running research."
            );
        }
    }

    if show {
        let (config, path) = load_config(explicit)?;
        match path {
            Some(path) => println!("📋 Current configuration ({}):", path.display()),
            None => println!("📋 Current configuration (defaults):"),
        }
        println!("{}", toml::to_string_pretty(&redacted(config))?);
    }

    if validate {
        match load_config(explicit).and_then(|(config, _)| Ok(config.validate()?)) {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {:#}", e);
                return Err(e);
            }
        }
    }

    if !show && !init && !validate {
        println!("Nothing to do. Use --show, --init or --validate.");
    }

    Ok(())
}

/// Default location written by `delve config --init`
fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .map(|d| d.join("delve").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("delve.toml"))
}

/// Copy of the config with API keys masked
fn redacted(mut config: DelveConfig) -> DelveConfig {
    const MASK: &str = "********";
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some(MASK.to_string());
    }
    if config.search.api_key.is_some() {
        config.search.api_key = Some(MASK.to_string());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn research_flags_parse() {
        let cli = Cli::try_parse_from([
            "delve",
            "research",
            "effects of caffeine on sleep",
            "--breadth",
            "3",
            "-d",
            "1",
            "--no-clarify",
        ])
        .unwrap();

        match cli.command {
            Commands::Research {
                topic,
                breadth,
                depth,
                output,
                no_clarify,
            } => {
                assert_eq!(topic, "effects of caffeine on sleep");
                assert_eq!(breadth, Some(3));
                assert_eq!(depth, Some(1));
                assert_eq!(output, None);
                assert!(no_clarify);
            }
            Commands::Config { .. } => panic!("expected research command"),
        }
    }

    #[test]
    fn explicit_config_is_loaded() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("delve.toml");
        std::fs::write(&path, "[research]\nbreadth = 7\n").unwrap();

        let (config, loaded_from) = load_config(Some(&path)).unwrap();
        assert_eq!(config.research.breadth, 7);
        assert_eq!(config.research.depth, 2);
        assert_eq!(loaded_from, Some(path));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_config(Some(&temp_dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn redaction_masks_keys() {
        let mut config = DelveConfig::default();
        config.llm.api_key = Some("sk-secret".to_string());

        let shown = redacted(config);
        assert_eq!(shown.llm.api_key.as_deref(), Some("********"));
        assert_eq!(shown.search.api_key, None);
    }
}
