//! Offline evaluation of a results file against correctness labels.
//!
//! Labels come from an external grader, one entry per question:
//!
//! ```json
//! {"question_number": 1, "is_correct": true,
//!  "solver_details": [{"solver_id": "solver_1", "type": "initial", "is_correct": true, "answer": "4"}]}
//! ```
//!
//! Metrics:
//! - system accuracy: questions where the judged answer is correct
//! - average initial / refined solver accuracy
//! - improvement rate: incorrect → correct among initial/refined pairs
//! - majority-vote baseline over initial answers (case and whitespace insensitive)
//! - consensus rate, and judge efficacy on questions where solvers disagreed

use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const BAR_WIDTH: usize = 30;

/// Which answer a solver label grades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerKind {
    Initial,
    Refined,
}

/// Correctness of one solver answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverLabel {
    pub solver_id: String,
    #[serde(rename = "type")]
    pub kind: AnswerKind,
    pub is_correct: bool,
    #[serde(default)]
    pub answer: String,
}

/// Correctness labels for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionLabel {
    pub question_number: u64,
    /// Whether the system's final (judged) answer was correct.
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub solver_details: Vec<SolverLabel>,
}

#[derive(Debug, Deserialize)]
struct ResultId {
    id: u64,
}

/// Raw counts; percentages are derived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    pub questions: usize,
    pub system_correct: usize,
    pub initial_answers: usize,
    pub initial_correct: usize,
    pub refined_answers: usize,
    pub refined_correct: usize,
    pub solver_pairs: usize,
    pub improved: usize,
    pub regressed: usize,
    pub voting_correct: usize,
    pub consensus: usize,
    pub disagreements: usize,
    pub judge_correct_in_disagreement: usize,
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

impl EvaluationReport {
    pub fn system_accuracy(&self) -> f64 {
        percent(self.system_correct, self.questions)
    }

    pub fn initial_accuracy(&self) -> f64 {
        percent(self.initial_correct, self.initial_answers)
    }

    pub fn refined_accuracy(&self) -> f64 {
        percent(self.refined_correct, self.refined_answers)
    }

    pub fn improvement_rate(&self) -> f64 {
        percent(self.improved, self.solver_pairs)
    }

    pub fn voting_accuracy(&self) -> f64 {
        percent(self.voting_correct, self.questions)
    }

    pub fn consensus_rate(&self) -> f64 {
        percent(self.consensus, self.questions)
    }

    pub fn judge_efficacy(&self) -> f64 {
        percent(self.judge_correct_in_disagreement, self.disagreements)
    }

    /// Text report with ASCII bars.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(40);
        let _ = writeln!(out, "{rule}\nEVALUATION\n{rule}");
        let _ = writeln!(out, "\n[System-Level Performance]");
        let _ = writeln!(
            out,
            "Overall Accuracy:   {}/{} ({:.1}%)",
            self.system_correct,
            self.questions,
            self.system_accuracy()
        );
        let _ = writeln!(
            out,
            "Improvement Rate:   {:.1}% (solvers incorrect->correct, {} regressed)",
            self.improvement_rate(),
            self.regressed
        );
        let _ = writeln!(
            out,
            "Consensus Rate:     {}/{} ({:.1}%)",
            self.consensus,
            self.questions,
            self.consensus_rate()
        );
        let _ = writeln!(
            out,
            "Judge Efficacy:     {}/{} ({:.1}%) [in disagreement]",
            self.judge_correct_in_disagreement,
            self.disagreements,
            self.judge_efficacy()
        );

        let _ = writeln!(out, "\n[Comparison to Baselines]");
        let _ = writeln!(out, "System (Debate):    {:.1}%", self.system_accuracy());
        let _ = writeln!(out, "Simple Voting:      {:.1}%", self.voting_accuracy());
        let _ = writeln!(out, "Avg Initial (Solo): {:.1}%", self.initial_accuracy());
        let _ = writeln!(out, "Avg Refined (Solo): {:.1}%", self.refined_accuracy());

        let _ = writeln!(out, "\n{rule}");
        let bars = [
            ("System", self.system_accuracy()),
            ("Voting", self.voting_accuracy()),
            ("Initial", self.initial_accuracy()),
            ("Refined", self.refined_accuracy()),
            ("Improvement", self.improvement_rate()),
        ];
        let width = bars.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        for (label, score) in bars {
            let _ = writeln!(out, "{label:<width$} | {} | {score:.1}%", bar(score));
        }
        let _ = writeln!(out, "{rule}");
        out
    }
}

fn bar(score: f64) -> String {
    let filled = ((score.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

fn normalize(answer: &str) -> String {
    answer.trim().to_lowercase()
}

/// Keep the last label per solver id, in first-seen order.
fn by_solver(details: &[SolverLabel], kind: AnswerKind) -> Vec<&SolverLabel> {
    let mut order: Vec<&SolverLabel> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for label in details.iter().filter(|l| l.kind == kind) {
        match index.get(label.solver_id.as_str()) {
            Some(&i) => order[i] = label,
            None => {
                index.insert(label.solver_id.as_str(), order.len());
                order.push(label);
            }
        }
    }
    order
}

/// Most common normalized answer; the first one seen wins a tie.
fn majority(answers: &[String]) -> Option<&str> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for answer in answers {
        match counts.iter_mut().find(|(a, _)| *a == answer.as_str()) {
            Some((_, n)) => *n += 1,
            None => counts.push((answer.as_str(), 1)),
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (answer, n) in counts {
        if best.map_or(true, |(_, top)| n > top) {
            best = Some((answer, n));
        }
    }
    best.map(|(answer, _)| answer)
}

/// Compute the report for `result_ids` (questions that were run) against `labels`.
///
/// Every result counts toward the question total; results without a label
/// contribute nothing else.
pub fn evaluate(result_ids: &[u64], labels: &[QuestionLabel]) -> EvaluationReport {
    let label_map: HashMap<u64, &QuestionLabel> =
        labels.iter().map(|l| (l.question_number, l)).collect();
    let mut report = EvaluationReport {
        questions: result_ids.len(),
        ..EvaluationReport::default()
    };

    for id in result_ids {
        let Some(label) = label_map.get(id) else {
            continue;
        };
        if label.is_correct {
            report.system_correct += 1;
        }

        let initial = by_solver(&label.solver_details, AnswerKind::Initial);
        let refined = by_solver(&label.solver_details, AnswerKind::Refined);

        for init in &initial {
            report.initial_answers += 1;
            if init.is_correct {
                report.initial_correct += 1;
            }
            if let Some(after) = refined.iter().find(|r| r.solver_id == init.solver_id) {
                report.solver_pairs += 1;
                match (init.is_correct, after.is_correct) {
                    (false, true) => report.improved += 1,
                    (true, false) => report.regressed += 1,
                    _ => {}
                }
            }
        }
        for r in &refined {
            report.refined_answers += 1;
            if r.is_correct {
                report.refined_correct += 1;
            }
        }

        if initial.is_empty() {
            continue;
        }
        let answers: Vec<String> = initial.iter().map(|l| normalize(&l.answer)).collect();
        if let Some(top) = majority(&answers) {
            let voted_right = initial
                .iter()
                .any(|l| l.is_correct && normalize(&l.answer) == top);
            if voted_right {
                report.voting_correct += 1;
            }
        }
        if answers.iter().all(|a| *a == answers[0]) {
            report.consensus += 1;
        } else {
            report.disagreements += 1;
            if label.is_correct {
                report.judge_correct_in_disagreement += 1;
            }
        }
    }
    report
}

/// Load both files and evaluate.
pub fn evaluate_files(results_path: &Path, labels_path: &Path) -> Result<EvaluationReport> {
    let results = std::fs::read_to_string(results_path)
        .with_context(|| format!("Failed to read {}", results_path.display()))?;
    let results: Vec<ResultId> = serde_json::from_str(&results)
        .with_context(|| format!("Failed to parse results in {}", results_path.display()))?;
    let labels = std::fs::read_to_string(labels_path)
        .with_context(|| format!("Failed to read {}", labels_path.display()))?;
    let labels: Vec<QuestionLabel> = serde_json::from_str(&labels)
        .with_context(|| format!("Failed to parse labels in {}", labels_path.display()))?;

    let ids: Vec<u64> = results.iter().map(|r| r.id).collect();
    Ok(evaluate(&ids, &labels))
}
