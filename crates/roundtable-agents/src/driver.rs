//! Question loop — one isolated debate per question.
//!
//! Every question gets fresh backend sessions, so a failure (or a poisoned
//! conversation) in one question never leaks into the next. A failed
//! question is recorded with its error and the loop moves on. The results
//! file is rewritten after every question.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use coordination::debate::{
    DebateOrchestrator, DebatePhase, DebateRecord, Judgment, Participant, PhaseTracker,
};
use coordination::SessionConfig;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backends::BackendSet;
use crate::config::{ParticipantConfig, RoundtableConfig};

/// One input question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: u64,
    pub question: String,
}

/// How a question's debate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Decided,
    NoJudge,
    NoCandidates,
    Failed,
}

/// One entry of the results file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub id: u64,
    pub question: String,
    pub status: QuestionStatus,
    #[serde(flatten)]
    pub record: DebateRecord,
    pub error: Option<String>,
    /// Phase that was running when the debate failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<DebatePhase>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Totals over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub decided: usize,
    pub undecided: usize,
    pub failed: usize,
}

impl RunSummary {
    fn add(&mut self, status: QuestionStatus) {
        self.total += 1;
        match status {
            QuestionStatus::Decided => self.decided += 1,
            QuestionStatus::NoJudge | QuestionStatus::NoCandidates => self.undecided += 1,
            QuestionStatus::Failed => self.failed += 1,
        }
    }
}

/// Read a JSON list of `{id, question}`.
pub fn load_questions(path: &Path) -> Result<Vec<Question>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse questions in {}", path.display()))
}

/// Write the results file (pretty JSON array).
pub fn save_results(path: &Path, results: &[QuestionResult]) -> Result<()> {
    let json = serde_json::to_string_pretty(results).context("Failed to serialize results")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Runs debates for a list of questions.
pub struct Driver {
    participants: Vec<ParticipantConfig>,
    session: SessionConfig,
    backends: BackendSet,
    orchestrator: DebateOrchestrator,
}

impl Driver {
    pub fn new(config: &RoundtableConfig, backends: BackendSet) -> Self {
        Self {
            participants: config.participants.clone(),
            session: config.debate.session_config(),
            backends,
            orchestrator: DebateOrchestrator::new(config.debate.debate_config()),
        }
    }

    /// Open fresh sessions for every configured participant.
    async fn open_participants(&self) -> Result<Vec<Participant>> {
        let mut participants = Vec::with_capacity(self.participants.len());
        for p in &self.participants {
            let backend = self
                .backends
                .get(&p.provider)
                .with_context(|| format!("no backend configured for provider {}", p.provider))?;
            let participant = Participant::connect(
                p.display_name(),
                backend.as_ref(),
                &p.model,
                self.session.clone(),
            )
            .await
            .with_context(|| format!("Failed to open session for {}", p.display_name()))?;
            participants.push(participant);
        }
        Ok(participants)
    }

    /// Run one question. Never fails: errors are recorded in the result.
    pub async fn run_question(&self, question: &Question) -> QuestionResult {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(id = question.id, question = %question.question, "processing question");

        let mut phases = PhaseTracker::new(Uuid::new_v4().to_string());
        let outcome = match self.open_participants().await {
            Ok(participants) => self
                .orchestrator
                .run_tracked(&question.question, &participants, &mut phases)
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(outcome) => {
                let status = match &outcome.judgment {
                    Judgment::Decided(_) => QuestionStatus::Decided,
                    Judgment::NoJudge => QuestionStatus::NoJudge,
                    Judgment::NoCandidates => QuestionStatus::NoCandidates,
                };
                info!(id = question.id, elapsed_ms, "{}", outcome.summary_line());
                QuestionResult {
                    id: question.id,
                    question: question.question.clone(),
                    status,
                    record: outcome.into_record(),
                    error: None,
                    failed_phase: None,
                    started_at,
                    elapsed_ms,
                }
            }
            Err(e) => {
                let failed_phase = phases.failed_in();
                error!(
                    id = question.id,
                    phase = ?failed_phase,
                    error = %format!("{e:#}"),
                    "question failed"
                );
                QuestionResult {
                    id: question.id,
                    question: question.question.clone(),
                    status: QuestionStatus::Failed,
                    record: DebateRecord::default(),
                    error: Some(format!("{e:#}")),
                    failed_phase,
                    started_at,
                    elapsed_ms,
                }
            }
        }
    }

    /// Run every question in order, saving results after each one.
    pub async fn run_all(&self, questions: &[Question], output: &Path) -> Result<RunSummary> {
        let mut results = Vec::with_capacity(questions.len());
        let mut summary = RunSummary::default();
        for (n, question) in questions.iter().enumerate() {
            let result = self.run_question(question).await;
            summary.add(result.status);
            results.push(result);
            save_results(output, &results)?;
            info!(done = n + 1, total = questions.len(), "progress");
        }
        if summary.failed > 0 {
            warn!(failed = summary.failed, "some questions failed");
        }
        Ok(summary)
    }
}
