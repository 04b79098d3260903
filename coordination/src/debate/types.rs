//! Debate data model — every value produced and consumed by the phases.
//!
//! Field names match the per-question JSON record handed to persistence.
//! Reply types (`*Reply`, `SolverAnswer`, `FeedbackList`, `Refinement`,
//! `Verdict`) double as the structured-output schemas sent to backends.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::session::StructuredReply;

/// Role of a participant in the debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Role {
    /// Produces and refines a candidate answer.
    Solver,
    /// Picks the winning answer.
    Judge,
}

impl Role {
    /// Match a free-form role label from a model reply.
    pub fn parse_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.eq_ignore_ascii_case("judge") {
            Some(Self::Judge)
        } else if label.eq_ignore_ascii_case("solver") {
            Some(Self::Solver)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Solver => write!(f, "Solver"),
            Self::Judge => write!(f, "Judge"),
        }
    }
}

// ── Role selection ───────────────────────────────────────────────────

/// Confidence score for one role, as reported by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RoleScore {
    /// `"Solver"` or `"Judge"`.
    pub role: String,
    /// Self-rated suitability in [0, 1].
    pub score: f64,
}

/// Structured reply to the role-selection prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RolePreferenceReply {
    /// Roles in order of preference.
    #[serde(default)]
    pub role_preferences: Vec<String>,
    pub confidence_by_role: Vec<RoleScore>,
    #[serde(default)]
    pub reasoning: String,
}

impl StructuredReply for RolePreferenceReply {}

/// A participant's self-assessment for both roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleConfidence {
    /// Participant name.
    pub participant: String,
    /// Solver score, if the model reported one.
    pub solver: Option<f64>,
    /// Judge score, if the model reported one.
    pub judge: Option<f64>,
    pub preferences: Vec<String>,
    pub reasoning: String,
}

impl RoleConfidence {
    /// Build from a model reply; scores are clamped into [0, 1], NaN dropped.
    pub fn from_reply(participant: impl Into<String>, reply: RolePreferenceReply) -> Self {
        let mut solver = None;
        let mut judge = None;
        for entry in &reply.confidence_by_role {
            if entry.score.is_nan() {
                continue;
            }
            let score = entry.score.clamp(0.0, 1.0);
            match Role::parse_label(&entry.role) {
                Some(Role::Judge) if judge.is_none() => judge = Some(score),
                Some(Role::Solver) if solver.is_none() => solver = Some(score),
                _ => {}
            }
        }
        Self {
            participant: participant.into(),
            solver,
            judge,
            preferences: reply.role_preferences,
            reasoning: reply.reasoning,
        }
    }

    /// Judge score in [0, 1]; an absent or NaN score is 0.0.
    pub fn judge_score(&self) -> f64 {
        match self.judge {
            Some(score) if !score.is_nan() => score.clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

// ── Initial solve ────────────────────────────────────────────────────

/// A solver's answer to the question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SolverAnswer {
    /// Short answer text.
    pub answer: String,
    /// Reasoning behind the answer.
    pub explanation: String,
}

impl StructuredReply for SolverAnswer {
    fn validate(self) -> Result<Self, String> {
        if self.answer.trim().is_empty() {
            return Err("answer is empty".to_string());
        }
        Ok(self)
    }
}

/// One solver's initial solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub solver_id: String,
    pub model: String,
    pub response: SolverAnswer,
}

// ── Peer review ──────────────────────────────────────────────────────

/// A concrete error a reviewer found in a solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReviewError {
    pub location: String,
    pub error_type: String,
    pub description: String,
    pub severity: String,
}

/// Detailed review of one solution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Evaluation {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub errors: Vec<ReviewError>,
    #[serde(default)]
    pub suggested_changes: Vec<String>,
}

/// A critique of exactly one named solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FeedbackItem {
    /// Solver id of the solution being critiqued.
    pub solution_id: String,
    pub evaluation: Evaluation,
    pub overall_assessment: String,
}

/// Structured reply to the peer-review prompt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FeedbackList {
    pub feedbacks: Vec<FeedbackItem>,
}

impl StructuredReply for FeedbackList {
    fn validate(self) -> Result<Self, String> {
        if let Some(item) = self
            .feedbacks
            .iter()
            .find(|item| item.solution_id.trim().is_empty())
        {
            return Err(format!(
                "feedback item without solution_id: {}",
                item.overall_assessment
            ));
        }
        Ok(self)
    }
}

/// Everything one reviewer wrote in one review pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackBundle {
    pub reviewer_id: String,
    pub feedbacks: Vec<FeedbackItem>,
}

impl FeedbackBundle {
    pub fn items(&self) -> &[FeedbackItem] {
        &self.feedbacks
    }
}

/// A feedback item together with the reviewer who wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedFeedback {
    pub reviewer_id: String,
    pub feedback: FeedbackItem,
}

// ── Refinement ───────────────────────────────────────────────────────

/// How the solver responded to one critique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChangeResponse {
    pub critique: String,
    pub response: String,
    /// Solver's own judgment; never overridden by the orchestrator.
    pub accepted: bool,
}

/// Structured reply to the refinement prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Refinement {
    #[serde(default)]
    pub changes_made: Vec<ChangeResponse>,
    pub refined_solution: String,
    pub refined_answer: String,
    pub confidence: f64,
}

impl Refinement {
    pub fn accepted_changes(&self) -> usize {
        self.changes_made.iter().filter(|c| c.accepted).count()
    }
}

impl StructuredReply for Refinement {
    fn validate(mut self) -> Result<Self, String> {
        if self.refined_answer.trim().is_empty() {
            return Err("refined_answer is empty".to_string());
        }
        self.confidence = clamp_unit(self.confidence)?;
        Ok(self)
    }
}

/// One solver's refined solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedSolution {
    pub solver_id: String,
    pub refined_response: Refinement,
}

// ── Judgment ─────────────────────────────────────────────────────────

/// The judge's final decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Verdict {
    /// Solver id of the winning solution.
    pub winner: String,
    /// The winning answer text, verbatim.
    pub winning_answer: String,
    pub confidence: f64,
    pub reasoning: String,
}

impl StructuredReply for Verdict {
    fn validate(mut self) -> Result<Self, String> {
        if self.winner.trim().is_empty() {
            return Err("winner is empty".to_string());
        }
        self.confidence = clamp_unit(self.confidence)?;
        Ok(self)
    }
}

/// Result of the judgment phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Judgment {
    /// The judge produced a verdict.
    Decided(Verdict),
    /// No participant was assigned the Judge role.
    NoJudge,
    /// A judge exists but there were no solutions to judge.
    NoCandidates,
}

impl Judgment {
    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            Self::Decided(verdict) => Some(verdict),
            _ => None,
        }
    }

    pub fn into_verdict(self) -> Option<Verdict> {
        match self {
            Self::Decided(verdict) => Some(verdict),
            _ => None,
        }
    }
}

impl std::fmt::Display for Judgment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decided(v) => write!(f, "decided: {} ({})", v.winner, v.winning_answer),
            Self::NoJudge => write!(f, "no judge assigned"),
            Self::NoCandidates => write!(f, "no solutions to judge"),
        }
    }
}

// ── Record ───────────────────────────────────────────────────────────

/// Full per-question artifact handed to persistence and evaluation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebateRecord {
    pub initial_solutions: Vec<Solution>,
    pub peer_feedbacks: Vec<FeedbackBundle>,
    pub refined_solutions: Vec<RefinedSolution>,
    pub final_verdict: Option<Verdict>,
}

fn clamp_unit(value: f64) -> Result<f64, String> {
    if value.is_nan() {
        return Err("confidence is not a number".to_string());
    }
    Ok(value.clamp(0.0, 1.0))
}
