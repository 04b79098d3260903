//! `roundtable` CLI.
//!
//! ```bash
//! # Debate every question, results rewritten after each one
//! OPENAI_API_KEY=... GEMINI_API_KEY=... roundtable run --questions questions.json
//!
//! # First 10 questions only, verbose
//! RUST_LOG=debug roundtable run --questions questions.json --limit 10
//!
//! # Score a results file against grader labels
//! roundtable evaluate --results results.json --labels evaluation.json
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use roundtable_agents::backends::build_backends;
use roundtable_agents::config::{ProviderEnv, RoundtableConfig};
use roundtable_agents::driver::{load_questions, Driver};
use roundtable_agents::evaluate::evaluate_files;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a debate for each question in a JSON file
    Run {
        /// Path to roundtable.toml
        #[arg(long, default_value = "roundtable.toml")]
        config: PathBuf,

        /// JSON list of {"id", "question"}
        #[arg(long)]
        questions: PathBuf,

        /// Where to write results
        #[arg(long, default_value = "results.json")]
        output: PathBuf,

        /// Only run the first N questions
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print an accuracy report for a results file
    Evaluate {
        #[arg(long, default_value = "results.json")]
        results: PathBuf,

        /// Grader labels, one entry per question
        #[arg(long, default_value = "evaluation.json")]
        labels: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Run {
            config,
            questions,
            output,
            limit,
        } => {
            let config = RoundtableConfig::from_file(&config)?;
            let backends = build_backends(&config, &ProviderEnv::from_env())?;
            let mut questions = load_questions(&questions)?;
            if let Some(limit) = limit {
                questions.truncate(limit);
            }
            info!(
                questions = questions.len(),
                participants = config.participants.len(),
                output = %output.display(),
                "Roundtable starting"
            );

            let driver = Driver::new(&config, backends);
            let summary = driver.run_all(&questions, &output).await?;
            info!(
                total = summary.total,
                decided = summary.decided,
                undecided = summary.undecided,
                failed = summary.failed,
                "Run complete"
            );
        }
        Command::Evaluate { results, labels } => {
            let report = evaluate_files(&results, &labels)?;
            print!("{}", report.render());
        }
    }
    Ok(())
}
