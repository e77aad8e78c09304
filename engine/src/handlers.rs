//! Command handlers for CLI operations
//!
//! - run: assess one persona
//! - interview: assess the person at the keyboard
//! - batch: assess a directory of personas concurrently
//! - history / replay: read results back from the database
//! - status: provider health
//! - config show / validate

use anyhow::{Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SinkKind};
use crate::console::ConsoleSubject;
use crate::db::Database;
use crate::interview::{AnswerGenerator, BatchRunner, BatchSummary, ScenarioDirector};
use crate::llm::generator::LlmAnswerGenerator;
use crate::llm::router::LLMRouter;
use crate::personas::{Persona, PersonaBook};
use crate::report::{JsonlSink, NullSink, ReportSink};
use sdk::errors::{AssessmentError, AssessmentErrorExt};
use sdk::types::Report;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// The configured sink, plus the database behind it when there is one
struct Output {
    sink: Arc<dyn ReportSink>,
    database: Option<Database>,
}

impl Output {
    async fn open(config: &Config) -> Result<Self> {
        match config.output.sink {
            SinkKind::Sqlite => {
                let database = Database::new(&config.database_path())
                    .await
                    .context("Failed to open database")?;
                Ok(Self {
                    sink: Arc::new(database.assessments()),
                    database: Some(database),
                })
            }
            SinkKind::Jsonl => Ok(Self {
                sink: Arc::new(
                    JsonlSink::open(&config.output.jsonl_file)
                        .await
                        .context("Failed to open results file")?,
                ),
                database: None,
            }),
            SinkKind::None => Ok(Self {
                sink: Arc::new(NullSink),
                database: None,
            }),
        }
    }

    async fn close(self) -> Result<()> {
        if let Some(database) = self.database {
            database.close().await?;
        }
        Ok(())
    }
}

fn llm_generator(config: &Config, personas: PersonaBook) -> Arc<LlmAnswerGenerator> {
    let router = Arc::new(LLMRouter::from_config(&config.llm));
    Arc::new(LlmAnswerGenerator::new(router, Arc::new(personas)))
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping at the next round boundary");
            token.cancel();
        }
    });
}

fn print_report(report: &Report) {
    println!("Subject: {}", report.subject_id);
    println!("Session: {}", report.session_id);
    println!();

    for result in &report.results {
        let mut flags = Vec::new();
        if result.low_confidence {
            flags.push("low confidence");
        }
        if result.clamped {
            flags.push("clamped");
        }
        println!(
            "  {}. {:<36} {:>2}  {:<9} ({} rounds){}",
            result.dimension_id,
            result.name,
            result.score,
            result.level.as_str(),
            result.rounds_used,
            if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            }
        );
    }

    println!();
    match report.overall_level {
        Some(level) => println!(
            "Total: {} / 420 (average {:.1}, {})",
            report.aggregate_score,
            report.average_score,
            level.as_str()
        ),
        None => println!(
            "Incomplete: {} of 7 dimensions scored, {} points so far",
            report.results.len(),
            report.aggregate_score
        ),
    }
}

fn emit_report(report: &Report, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print_report(report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

/// Print whatever a finished session produced, failing if it failed
fn finish_session(outcome: Result<Report, AssessmentError>, format: OutputFormat) -> Result<()> {
    match outcome {
        Ok(report) => emit_report(&report, format),
        Err(e) => {
            if let Some(partial) = e.partial_report() {
                emit_report(partial, format)?;
            }
            if let OutputFormat::Text = format {
                println!("✗ {}", e.user_hint());
            }
            Err(e.into())
        }
    }
}

async fn run_one(
    director: &ScenarioDirector,
    subject_id: &str,
) -> Result<Result<Report, AssessmentError>> {
    let mut session = director.start_session(subject_id)?;
    cancel_on_ctrl_c(session.cancellation_token());
    Ok(director.run_to_completion(&mut session).await)
}

/// Assess one virtual subject
pub async fn handle_run(persona_path: PathBuf, config: &Config, format: OutputFormat) -> Result<()> {
    let persona = Persona::load_file(&persona_path).await?;
    let subject_id = persona.id.clone();

    if let OutputFormat::Text = format {
        println!("Assessing {} ({})", persona.name, subject_id);
        println!();
    }

    let generator = llm_generator(config, PersonaBook::new([persona]));
    let output = Output::open(config).await?;
    let director = ScenarioDirector::from_config(&config.interview, generator, Arc::clone(&output.sink));

    let outcome = run_one(&director, &subject_id).await?;
    output.close().await?;
    finish_session(outcome, format)
}

/// Assess the person at the keyboard
pub async fn handle_interview(subject_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    println!("CCTDI interview for {}. Answer each question and press Enter.", subject_id);

    let inner: Arc<dyn AnswerGenerator> = llm_generator(config, PersonaBook::default());
    let generator = Arc::new(ConsoleSubject::new(inner));
    let output = Output::open(config).await?;
    let director = ScenarioDirector::from_config(&config.interview, generator, Arc::clone(&output.sink));

    let outcome = run_one(&director, &subject_id).await?;
    output.close().await?;
    finish_session(outcome, format)
}

/// Assess every persona in a directory
pub async fn handle_batch(
    personas_dir: Option<PathBuf>,
    workers: Option<usize>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let dir = personas_dir.unwrap_or_else(|| config.batch.personas_dir.clone());
    let workers = workers.unwrap_or(config.batch.workers);

    let personas = Persona::load_dir(&dir).await?;
    if personas.is_empty() {
        anyhow::bail!("No persona files (*.txt) found in {}", dir.display());
    }
    let subject_ids: Vec<String> = personas.iter().map(|p| p.id.clone()).collect();

    if let OutputFormat::Text = format {
        println!(
            "Assessing {} subjects from {} with {} workers",
            subject_ids.len(),
            dir.display(),
            workers
        );
        println!();
    }

    let generator = llm_generator(config, PersonaBook::new(personas));
    let output = Output::open(config).await?;
    let director = Arc::new(ScenarioDirector::from_config(
        &config.interview,
        generator,
        Arc::clone(&output.sink),
    ));

    let runner = BatchRunner::new(director, workers);
    cancel_on_ctrl_c(runner.cancellation_token());

    let started = Instant::now();
    let outcomes = runner.run(subject_ids).await;
    let summary = BatchSummary::from_outcomes(&outcomes);
    output.close().await?;

    match format {
        OutputFormat::Text => {
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(report) if report.is_complete() => println!(
                        "✓ {:<20} {:>3} / 420  {:<9} {:.1}s",
                        outcome.subject_id,
                        report.aggregate_score,
                        report.overall_level.map(|l| l.as_str()).unwrap_or("-"),
                        outcome.elapsed.as_secs_f64()
                    ),
                    Ok(report) => println!(
                        "- {:<20} incomplete ({} of 7 dimensions)",
                        outcome.subject_id,
                        report.results.len()
                    ),
                    Err(e) => println!("✗ {:<20} {}", outcome.subject_id, e),
                }
            }

            println!();
            println!(
                "Finished {} subjects in {:.1}s: {} complete, {} not",
                summary.completed,
                started.elapsed().as_secs_f64(),
                summary.succeeded,
                summary.failed
            );
            if let (Some(mean), Some(max), Some(min)) =
                (summary.mean_aggregate, summary.max_aggregate, summary.min_aggregate)
            {
                println!("Aggregate scores: mean {:.1}, max {}, min {}", mean, max, min);
            }
        }
        OutputFormat::Json => {
            let subjects: Vec<_> = outcomes
                .iter()
                .map(|o| {
                    json!({
                        "subject_id": o.subject_id,
                        "elapsed_ms": o.elapsed.as_millis() as u64,
                        "report": o.report(),
                        "error": o.result.as_ref().err().map(|e| e.to_string()),
                    })
                })
                .collect();
            let output = json!({
                "summary": summary,
                "subjects": subjects,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show recent assessments
pub async fn handle_history(limit: u32, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let sessions = database
        .assessments()
        .recent_sessions(limit)
        .await
        .context("Failed to fetch assessment history")?;

    match format {
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("No assessments in history");
            } else {
                println!("Assessment History (last {}):", limit);
                println!();

                for session in &sessions {
                    println!("Session: {}", session.session_id);
                    println!("  Subject: {}", session.subject_id);
                    println!(
                        "  Score: {} ({} dimensions, {})",
                        session.aggregate_score,
                        session.dimensions,
                        session
                            .overall_level
                            .map(|l| l.as_str())
                            .unwrap_or(session.completeness.as_str())
                    );
                    println!("  Finished: {}", session.finished_at.format("%Y-%m-%d %H:%M:%S"));
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "sessions": sessions,
                "count": sessions.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Show the transcript and report of one session
pub async fn handle_replay(session_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let repo = database.assessments();

    let report = repo
        .load_report(&session_id)
        .await
        .context("Failed to fetch report")?
        .ok_or_else(|| anyhow::anyhow!("Session not found: {}", session_id))?;
    let turns = repo
        .session_turns(&session_id)
        .await
        .context("Failed to fetch transcript")?;

    match format {
        OutputFormat::Text => {
            println!("Session Replay: {}", session_id);
            println!();

            let mut current = 0;
            for record in &turns {
                if record.dimension_id != current {
                    current = record.dimension_id;
                    let name = sdk::types::Dimension::by_id(current)
                        .map(|d| d.name)
                        .unwrap_or("?");
                    println!("== {}. {} ==", current, name);
                }
                println!("[{}] ({}) Q: {}", record.turn.round, record.turn.mode, record.turn.question);
                if record.turn.is_answered() {
                    println!("    A: {}", record.turn.answer);
                } else {
                    println!("    A: (no answer)");
                }
            }

            println!();
            print_report(&report);
        }
        OutputFormat::Json => {
            let output = json!({
                "report": report,
                "turns": turns,
                "turn_count": turns.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Show provider availability
pub async fn handle_status(config: &Config, format: OutputFormat) -> Result<()> {
    let router = LLMRouter::from_config(&config.llm);
    let health = router.check_health().await;

    match format {
        OutputFormat::Text => {
            println!("Default provider: {}", config.llm.default_provider);
            for (name, healthy) in &health {
                println!("  {} {}", if *healthy { "✓" } else { "✗" }, name);
            }
        }
        OutputFormat::Json => {
            let providers: Vec<_> = health
                .iter()
                .map(|(name, healthy)| json!({ "name": name, "healthy": healthy }))
                .collect();
            let output = json!({
                "default_provider": config.llm.default_provider,
                "providers": providers
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", config.to_toml()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

/// Check the configuration file at `path`
pub fn handle_config_validate(path: &Path, format: OutputFormat) -> Result<()> {
    let result = Config::load_from_path(path);

    match format {
        OutputFormat::Text => match &result {
            Ok(_) => println!("✓ {} is valid", path.display()),
            Err(e) => println!("✗ {}: {}", path.display(), e),
        },
        OutputFormat::Json => {
            let output = json!({
                "path": path.display().to_string(),
                "valid": result.is_ok(),
                "error": result.as_ref().err().map(|e| e.to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    result.map(|_| ()).map_err(Into::into)
}
