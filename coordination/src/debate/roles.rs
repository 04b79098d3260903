//! Role allocation — exactly one Judge, everyone else a Solver.

use serde::{Deserialize, Serialize};

use super::error::DebateError;
use super::types::{Role, RoleConfidence};

/// Role assigned to one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    pub participant: String,
    pub role: Role,
    /// `solver_N` for solvers, `None` for the judge.
    pub solver_id: Option<String>,
}

/// Mapping from participant to role, in participant order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    entries: Vec<RoleEntry>,
}

impl RoleAssignment {
    pub fn entries(&self) -> &[RoleEntry] {
        &self.entries
    }

    pub fn role_of(&self, participant: &str) -> Option<Role> {
        self.entries
            .iter()
            .find(|e| e.participant == participant)
            .map(|e| e.role)
    }

    /// The judge, if any participant holds the role.
    pub fn judge(&self) -> Option<&RoleEntry> {
        self.entries.iter().find(|e| e.role == Role::Judge)
    }

    /// Solvers in participant order.
    pub fn solvers(&self) -> impl Iterator<Item = &RoleEntry> {
        self.entries.iter().filter(|e| e.role == Role::Solver)
    }

    pub fn solver_count(&self) -> usize {
        self.solvers().count()
    }
}

/// Picks the judge by maximum self-reported judge confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleAllocator;

impl RoleAllocator {
    /// Assign roles to the participants behind `confidences`, in their order.
    ///
    /// The highest judge score wins the Judge role; the first participant
    /// listed wins a tie. Scores are read through
    /// [`RoleConfidence::judge_score`], so a missing or NaN score is 0.0 and
    /// out-of-range values are clamped to [0, 1]. Solvers are numbered
    /// `solver_1..` in participant order, skipping the judge.
    pub fn assign(&self, confidences: &[RoleConfidence]) -> Result<RoleAssignment, DebateError> {
        let first = confidences.first().ok_or(DebateError::NoParticipants)?;
        let mut judge_index = 0;
        let mut best = first.judge_score();
        for (index, confidence) in confidences.iter().enumerate().skip(1) {
            let score = confidence.judge_score();
            if score > best {
                best = score;
                judge_index = index;
            }
        }

        let mut next_solver = 1;
        let entries = confidences
            .iter()
            .enumerate()
            .map(|(index, confidence)| {
                if index == judge_index {
                    RoleEntry {
                        participant: confidence.participant.clone(),
                        role: Role::Judge,
                        solver_id: None,
                    }
                } else {
                    let solver_id = format!("solver_{next_solver}");
                    next_solver += 1;
                    RoleEntry {
                        participant: confidence.participant.clone(),
                        role: Role::Solver,
                        solver_id: Some(solver_id),
                    }
                }
            })
            .collect();

        Ok(RoleAssignment { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf(name: &str, judge: Option<f64>) -> RoleConfidence {
        RoleConfidence {
            participant: name.to_string(),
            solver: Some(0.5),
            judge,
            preferences: vec![],
            reasoning: String::new(),
        }
    }

    #[test]
    fn test_highest_judge_score_wins() {
        let assignment = RoleAllocator
            .assign(&[
                conf("a", Some(0.2)),
                conf("b", Some(0.9)),
                conf("c", Some(0.5)),
            ])
            .unwrap();
        assert_eq!(assignment.judge().unwrap().participant, "b");
        let solvers: Vec<_> = assignment
            .solvers()
            .map(|e| (e.participant.as_str(), e.solver_id.as_deref().unwrap()))
            .collect();
        assert_eq!(solvers, vec![("a", "solver_1"), ("c", "solver_2")]);
    }

    #[test]
    fn test_tie_goes_to_first_listed() {
        let assignment = RoleAllocator
            .assign(&[
                conf("a", Some(0.3)),
                conf("b", Some(0.8)),
                conf("c", Some(0.8)),
            ])
            .unwrap();
        assert_eq!(assignment.judge().unwrap().participant, "b");
        assert_eq!(assignment.role_of("c"), Some(Role::Solver));
    }

    #[test]
    fn test_exactly_one_judge_for_any_scores() {
        let score_sets: Vec<Vec<Option<f64>>> = vec![
            vec![None, None, None],
            vec![Some(0.0), Some(0.0)],
            vec![Some(1.0), Some(1.0), Some(1.0), Some(1.0)],
            vec![None, Some(0.1), None],
            vec![Some(0.4), Some(0.7), Some(0.2), Some(0.7), Some(0.1)],
        ];
        for scores in score_sets {
            let confidences: Vec<_> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| conf(&format!("p{i}"), *s))
                .collect();
            let assignment = RoleAllocator.assign(&confidences).unwrap();
            let judges = assignment
                .entries()
                .iter()
                .filter(|e| e.role == Role::Judge)
                .count();
            assert_eq!(judges, 1);
            assert_eq!(assignment.solver_count(), confidences.len() - 1);
        }
    }

    #[test]
    fn test_missing_scores_pick_first() {
        let assignment = RoleAllocator
            .assign(&[conf("a", None), conf("b", None)])
            .unwrap();
        assert_eq!(assignment.judge().unwrap().participant, "a");
    }

    #[test]
    fn test_non_finite_scores_still_yield_one_judge() {
        let assignment = RoleAllocator
            .assign(&[conf("a", Some(f64::NAN)), conf("b", Some(f64::NAN))])
            .unwrap();
        assert_eq!(assignment.judge().unwrap().participant, "a");
        assert_eq!(assignment.solver_count(), 1);

        let assignment = RoleAllocator
            .assign(&[conf("a", Some(f64::NEG_INFINITY))])
            .unwrap();
        assert_eq!(assignment.judge().unwrap().participant, "a");

        // NaN ranks as 0.0, so a small positive score beats it.
        let assignment = RoleAllocator
            .assign(&[conf("a", Some(f64::NAN)), conf("b", Some(0.05))])
            .unwrap();
        assert_eq!(assignment.judge().unwrap().participant, "b");
    }

    #[test]
    fn test_out_of_range_scores_are_clamped() {
        // 7.0 and 1.0 both clamp to 1.0, so the first listed keeps the tie.
        let assignment = RoleAllocator
            .assign(&[conf("a", Some(1.0)), conf("b", Some(7.0))])
            .unwrap();
        assert_eq!(assignment.judge().unwrap().participant, "a");
        assert_eq!(conf("c", Some(7.0)).judge_score(), 1.0);
        assert_eq!(conf("d", Some(f64::NEG_INFINITY)).judge_score(), 0.0);
    }

    #[test]
    fn test_single_participant_is_judge() {
        let assignment = RoleAllocator.assign(&[conf("solo", Some(0.1))]).unwrap();
        assert_eq!(assignment.judge().unwrap().participant, "solo");
        assert_eq!(assignment.solver_count(), 0);
    }

    #[test]
    fn test_zero_participants_is_error() {
        let err = RoleAllocator.assign(&[]).unwrap_err();
        assert!(matches!(err, DebateError::NoParticipants));
    }
}
