//! Debate orchestrator — sequences the phases of one question's debate.
//!
//! ```text
//! RoleSelection ─▶ InitialSolve ─▶ PeerReview ─▶ Refinement ─▶ Judgment ─▶ Complete
//!   (everyone)       (solvers)       (solvers)     (solvers)     (judge)
//! ```
//!
//! Every phase fans out through the [`PhaseRunner`] and must finish
//! completely before the next one starts. Each task receives its own input
//! struct (session handle plus prompt), so nothing is shared between tasks
//! except the participant's own session, which only that task locks.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::DebateError;
use super::phase::{PhaseRunner, PhaseTask};
use super::prompts::{PromptBuilder, TriviaPrompts};
use super::roles::{RoleAllocator, RoleAssignment};
use super::router;
use super::state::{DebatePhase, PhaseTracker};
use super::types::{
    DebateRecord, FeedbackBundle, FeedbackList, Judgment, RefinedSolution, Refinement,
    RoleConfidence, RolePreferenceReply, Solution, SolverAnswer, Verdict,
};
use crate::backend::Backend;
use crate::session::{BackendSession, SessionConfig, SessionError, SharedSession};

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    /// Maximum backend calls in flight within one phase.
    pub concurrency_limit: usize,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
        }
    }
}

/// One model taking part in a debate.
#[derive(Debug, Clone)]
pub struct Participant {
    pub name: String,
    pub provider: String,
    pub model: String,
    session: SharedSession,
}

impl Participant {
    pub fn new(name: impl Into<String>, session: BackendSession) -> Self {
        Self {
            name: name.into(),
            provider: session.provider().to_string(),
            model: session.model().to_string(),
            session: session.shared(),
        }
    }

    /// Open a fresh session on `backend` and wrap it as a participant.
    pub async fn connect(
        name: impl Into<String>,
        backend: &dyn Backend,
        model: &str,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let conversation =
            backend
                .new_session(model)
                .await
                .map_err(|source| SessionError::Upstream {
                    provider: backend.provider().to_string(),
                    model: model.to_string(),
                    source,
                })?;
        let session = BackendSession::new(backend.provider(), model, conversation, config);
        Ok(Self::new(name, session))
    }

    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }
}

/// Everything one debate produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateOutcome {
    pub debate_id: String,
    pub question: String,
    pub confidences: Vec<RoleConfidence>,
    pub assignment: RoleAssignment,
    pub initial_solutions: Vec<Solution>,
    pub peer_feedbacks: Vec<FeedbackBundle>,
    pub refined_solutions: Vec<RefinedSolution>,
    pub judgment: Judgment,
    pub phases: PhaseTracker,
}

impl DebateOutcome {
    pub fn verdict(&self) -> Option<&Verdict> {
        self.judgment.verdict()
    }

    /// The per-question record handed to persistence.
    pub fn into_record(self) -> DebateRecord {
        DebateRecord {
            initial_solutions: self.initial_solutions,
            peer_feedbacks: self.peer_feedbacks,
            refined_solutions: self.refined_solutions,
            final_verdict: self.judgment.into_verdict(),
        }
    }

    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        let judge = self
            .assignment
            .judge()
            .map(|j| j.participant.as_str())
            .unwrap_or("-");
        format!(
            "[{}] judge={} solvers={} | {}",
            self.debate_id,
            judge,
            self.assignment.solver_count(),
            self.judgment
        )
    }
}

// ── Per-task inputs ──────────────────────────────────────────────────

struct RoleTask {
    session: SharedSession,
    prompt: String,
}

struct SolveTask {
    session: SharedSession,
    solver_id: String,
    model: String,
    prompt: String,
}

struct ReviewTask {
    session: SharedSession,
    reviewer_id: String,
    /// `None` when there is nobody else to review.
    prompt: Option<String>,
}

struct RefineTask {
    session: SharedSession,
    solver_id: String,
    prompt: String,
}

struct JudgeTask {
    session: SharedSession,
    prompt: String,
}

/// A solver's seat for the rest of the debate.
struct Seat {
    participant: String,
    solver_id: String,
    model: String,
    session: SharedSession,
}

async fn report_roles(task: RoleTask) -> Result<RolePreferenceReply, SessionError> {
    let mut session = task.session.lock().await;
    session.send_structured(&task.prompt).await
}

async fn solve(task: SolveTask) -> Result<Solution, SessionError> {
    let mut session = task.session.lock().await;
    let response: SolverAnswer = session.send_structured(&task.prompt).await?;
    Ok(Solution {
        solver_id: task.solver_id,
        model: task.model,
        response,
    })
}

async fn review(task: ReviewTask) -> Result<FeedbackBundle, SessionError> {
    let Some(prompt) = task.prompt else {
        debug!(reviewer = %task.reviewer_id, "no peers to review");
        return Ok(FeedbackBundle {
            reviewer_id: task.reviewer_id,
            feedbacks: Vec::new(),
        });
    };

    let mut session = task.session.lock().await;
    let list: FeedbackList = session.send_structured(&prompt).await?;
    let before = list.feedbacks.len();
    let feedbacks: Vec<_> = list
        .feedbacks
        .into_iter()
        .filter(|item| item.solution_id != task.reviewer_id)
        .collect();
    if feedbacks.len() != before {
        warn!(
            reviewer = %task.reviewer_id,
            dropped = before - feedbacks.len(),
            "dropped self-review feedback"
        );
    }
    Ok(FeedbackBundle {
        reviewer_id: task.reviewer_id,
        feedbacks,
    })
}

async fn refine(task: RefineTask) -> Result<RefinedSolution, SessionError> {
    let mut session = task.session.lock().await;
    let refined_response: Refinement = session.send_structured(&task.prompt).await?;
    Ok(RefinedSolution {
        solver_id: task.solver_id,
        refined_response,
    })
}

async fn decide(task: JudgeTask) -> Result<Verdict, SessionError> {
    let mut session = task.session.lock().await;
    session.send_structured(&task.prompt).await
}

/// Runs complete debates.
pub struct DebateOrchestrator {
    runner: PhaseRunner,
    allocator: RoleAllocator,
    prompts: Arc<dyn PromptBuilder>,
}

/// Reject an empty or ambiguous participant list before any phase runs.
fn check_participants(participants: &[Participant]) -> Result<(), DebateError> {
    if participants.is_empty() {
        return Err(DebateError::NoParticipants);
    }
    let mut seen = HashSet::new();
    match participants.iter().find(|p| !seen.insert(p.name.as_str())) {
        Some(dup) => Err(DebateError::DuplicateParticipant(dup.name.clone())),
        None => Ok(()),
    }
}

impl DebateOrchestrator {
    pub fn new(config: DebateConfig) -> Self {
        Self::with_prompts(config, Arc::new(TriviaPrompts))
    }

    pub fn with_prompts(config: DebateConfig, prompts: Arc<dyn PromptBuilder>) -> Self {
        Self {
            runner: PhaseRunner::new(config.concurrency_limit),
            allocator: RoleAllocator,
            prompts,
        }
    }

    /// Run all phases for one question.
    ///
    /// Any terminal failure aborts the debate; no partial outcome is returned.
    /// Use [`run_tracked`](Self::run_tracked) to keep the phase history of a
    /// failed debate.
    pub async fn run(
        &self,
        question: &str,
        participants: &[Participant],
    ) -> Result<DebateOutcome, DebateError> {
        let mut phases = PhaseTracker::new(Uuid::new_v4().to_string());
        self.run_tracked(question, participants, &mut phases).await
    }

    /// Run all phases, recording transitions in a tracker the caller owns.
    ///
    /// On failure the tracker ends in [`DebatePhase::Failed`] and
    /// [`PhaseTracker::failed_in`] names the phase that was running.
    pub async fn run_tracked(
        &self,
        question: &str,
        participants: &[Participant],
        phases: &mut PhaseTracker,
    ) -> Result<DebateOutcome, DebateError> {
        let result = match check_participants(participants) {
            Ok(()) => self.run_phases(question, participants, phases).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            error!(
                debate_id = %phases.debate_id,
                phase = %phases.phase,
                error = %err,
                "debate failed"
            );
            phases.fail(&err.to_string());
        }
        result
    }

    async fn run_phases(
        &self,
        question: &str,
        participants: &[Participant],
        phases: &mut PhaseTracker,
    ) -> Result<DebateOutcome, DebateError> {
        // 1. Role selection
        phases.advance(DebatePhase::RoleSelection, "debate started")?;
        info!(debate_id = %phases.debate_id, participants = participants.len(), "role selection");
        let role_tasks = participants
            .iter()
            .map(|p| {
                PhaseTask::new(
                    p.name.clone(),
                    RoleTask {
                        session: p.session(),
                        prompt: self.prompts.role_selection(),
                    },
                )
            })
            .collect();
        let confidences: Vec<RoleConfidence> = self
            .runner
            .run(DebatePhase::RoleSelection, role_tasks, report_roles)
            .await?
            .into_iter()
            .map(|r| RoleConfidence::from_reply(r.participant, r.output))
            .collect();
        let assignment = self.allocator.assign(&confidences)?;
        let seats: Vec<Seat> = assignment
            .solvers()
            .filter_map(|entry| {
                let participant = participants.iter().find(|p| p.name == entry.participant)?;
                Some(Seat {
                    participant: participant.name.clone(),
                    solver_id: entry.solver_id.clone()?,
                    model: participant.model.clone(),
                    session: participant.session(),
                })
            })
            .collect();
        info!(
            judge = assignment.judge().map(|j| j.participant.as_str()).unwrap_or("-"),
            solvers = seats.len(),
            "roles assigned"
        );

        // 2. Initial solve
        phases.advance(DebatePhase::InitialSolve, "roles assigned")?;
        let solve_tasks = seats
            .iter()
            .map(|seat| {
                PhaseTask::new(
                    seat.participant.clone(),
                    SolveTask {
                        session: seat.session.clone(),
                        solver_id: seat.solver_id.clone(),
                        model: seat.model.clone(),
                        prompt: self.prompts.solve(question),
                    },
                )
            })
            .collect();
        let initial_solutions: Vec<Solution> = self
            .runner
            .run(DebatePhase::InitialSolve, solve_tasks, solve)
            .await?
            .into_iter()
            .map(|r| r.output)
            .collect();
        for s in &initial_solutions {
            info!(
                solver = %s.solver_id,
                model = %s.model,
                answer = %s.response.answer,
                "initial answer"
            );
        }

        // 3. Peer review
        phases.advance(DebatePhase::PeerReview, "initial solutions collected")?;
        let review_tasks = seats
            .iter()
            .map(|seat| {
                let others: Vec<Solution> = initial_solutions
                    .iter()
                    .filter(|s| s.solver_id != seat.solver_id)
                    .cloned()
                    .collect();
                let prompt = (!others.is_empty()).then(|| self.prompts.review(question, &others));
                PhaseTask::new(
                    seat.participant.clone(),
                    ReviewTask {
                        session: seat.session.clone(),
                        reviewer_id: seat.solver_id.clone(),
                        prompt,
                    },
                )
            })
            .collect();
        let peer_feedbacks: Vec<FeedbackBundle> = self
            .runner
            .run(DebatePhase::PeerReview, review_tasks, review)
            .await?
            .into_iter()
            .map(|r| r.output)
            .collect();
        for bundle in &peer_feedbacks {
            for item in bundle.items() {
                debug!(
                    reviewer = %bundle.reviewer_id,
                    target = %item.solution_id,
                    assessment = %item.overall_assessment,
                    "peer feedback"
                );
            }
        }

        // 4. Refinement
        phases.advance(DebatePhase::Refinement, "peer reviews collected")?;
        let refine_tasks = seats
            .iter()
            .map(|seat| {
                let routed = router::route(&peer_feedbacks, &seat.solver_id);
                debug!(solver = %seat.solver_id, items = routed.len(), "feedback routed");
                PhaseTask::new(
                    seat.participant.clone(),
                    RefineTask {
                        session: seat.session.clone(),
                        solver_id: seat.solver_id.clone(),
                        prompt: self.prompts.refine(question, &routed),
                    },
                )
            })
            .collect();
        let refined_solutions: Vec<RefinedSolution> = self
            .runner
            .run(DebatePhase::Refinement, refine_tasks, refine)
            .await?
            .into_iter()
            .map(|r| r.output)
            .collect();
        for r in &refined_solutions {
            let refined = &r.refined_response;
            info!(
                solver = %r.solver_id,
                answer = %refined.refined_answer,
                confidence = refined.confidence,
                accepted = refined.accepted_changes(),
                critiques = refined.changes_made.len(),
                "refined answer"
            );
        }

        // 5. Judgment
        phases.advance(DebatePhase::Judgment, "refinements collected")?;
        let judge = assignment
            .judge()
            .and_then(|entry| participants.iter().find(|p| p.name == entry.participant));
        let judgment = match judge {
            None => {
                warn!("no judge assigned, debate ends without a verdict");
                Judgment::NoJudge
            }
            Some(_) if initial_solutions.is_empty() => {
                warn!("judge has no solutions to choose from");
                Judgment::NoCandidates
            }
            Some(judge) => {
                let prompt = self.prompts.judge(
                    question,
                    &initial_solutions,
                    &peer_feedbacks,
                    &refined_solutions,
                );
                let task = PhaseTask::new(
                    judge.name.clone(),
                    JudgeTask {
                        session: judge.session(),
                        prompt,
                    },
                );
                let results = self
                    .runner
                    .run(DebatePhase::Judgment, vec![task], decide)
                    .await?;
                let Some(verdict) = results.into_iter().next().map(|r| r.output) else {
                    return Err(DebateError::TaskPanicked {
                        phase: DebatePhase::Judgment,
                        participant: judge.name.clone(),
                        detail: "judge task returned no result".to_string(),
                    });
                };
                if !initial_solutions.iter().any(|s| s.solver_id == verdict.winner) {
                    warn!(winner = %verdict.winner, "verdict names an unknown solver");
                }
                info!(
                    judge = %judge.name,
                    winner = %verdict.winner,
                    answer = %verdict.winning_answer,
                    confidence = verdict.confidence,
                    "verdict"
                );
                Judgment::Decided(verdict)
            }
        };
        phases.advance(DebatePhase::Complete, "judgment done")?;

        Ok(DebateOutcome {
            debate_id: phases.debate_id.clone(),
            question: question.to_string(),
            confidences,
            assignment,
            initial_solutions,
            peer_feedbacks,
            refined_solutions,
            judgment,
            phases: phases.clone(),
        })
    }
}

impl Default for DebateOrchestrator {
    fn default() -> Self {
        Self::new(DebateConfig::default())
    }
}
