//! Prompt construction for each debate phase.
//!
//! The orchestrator only needs *some* text per phase; the wording lives
//! behind [`PromptBuilder`] so callers can swap it without touching phase
//! sequencing. [`TriviaPrompts`] is the default set, tuned for short-answer
//! trivia questions.

use std::fmt::Write;

use super::types::{FeedbackBundle, FeedbackItem, RefinedSolution, RoutedFeedback, Solution};

/// Builds the prompt text for every phase.
pub trait PromptBuilder: Send + Sync {
    /// Ask a participant to rate itself for the Solver and Judge roles.
    fn role_selection(&self) -> String;

    /// Ask a solver for its initial answer.
    fn solve(&self, question: &str) -> String;

    /// Ask a solver to review its peers' solutions (never its own).
    fn review(&self, question: &str, others: &[Solution]) -> String;

    /// Ask a solver to refine its answer given the feedback routed to it.
    fn refine(&self, question: &str, feedback: &[RoutedFeedback]) -> String;

    /// Ask the judge for a verdict over the whole debate.
    fn judge(
        &self,
        question: &str,
        solutions: &[Solution],
        feedbacks: &[FeedbackBundle],
        refinements: &[RefinedSolution],
    ) -> String;
}

/// Default prompts for the "What? Where? When?" style trivia game.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriviaPrompts;

impl PromptBuilder for TriviaPrompts {
    fn role_selection(&self) -> String {
        r#"You are taking part in a multi-agent team answering questions from the intellectual game "What? Where? When?". The game rewards broad knowledge, logical thinking and connecting non-obvious clues into a creative answer.

Two roles are available:

1. **Solver** - analyses the question, connects the clues and proposes an answer. Solvers later review each other's answers and refine their own.
2. **Judge** - reads every solver's answer, the peer reviews and the refined answers, and picks the single best answer.

Rate how well suited you are to each role. Reply with your roles in order of preference, a confidence score between 0 and 1 for each of "Solver" and "Judge", and your reasoning."#
            .to_string()
    }

    fn solve(&self, question: &str) -> String {
        format!(
            "Solve the following question from \"What? Where? When?\".\n\n\
             ## Question\n\n{question}\n\n\
             Think it through step by step, then reply with a short `answer` \
             (a few words at most) and an `explanation` of how you got there."
        )
    }

    fn review(&self, question: &str, others: &[Solution]) -> String {
        let mut prompt = format!(
            "## Question\n\n{question}\n\n\
             Other solvers proposed the solutions below. Review each one \
             critically: list strengths, weaknesses, concrete errors (with \
             location, error_type, description and severity) and suggested \
             changes, plus an overall assessment. Use the solver id shown in \
             each heading as the `solution_id` of your feedback.\n"
        );
        for solution in others {
            let _ = write!(
                prompt,
                "\n### {}\n\nAnswer: {}\n\nExplanation: {}\n",
                solution.solver_id, solution.response.answer, solution.response.explanation
            );
        }
        prompt
    }

    fn refine(&self, question: &str, feedback: &[RoutedFeedback]) -> String {
        let mut prompt = format!("## Question\n\n{question}\n\n");
        if feedback.is_empty() {
            prompt.push_str(
                "No reviewer commented on your solution. Re-examine your answer \
                 on your own and either confirm it or improve it.\n",
            );
        } else {
            prompt.push_str(
                "Reviewers left the feedback below on your solution. For each \
                 critique, respond and state whether you accept it. Then give \
                 your refined explanation, refined answer and a confidence \
                 between 0 and 1.\n",
            );
            for routed in feedback {
                let _ = write!(prompt, "\n### From {}\n\n", routed.reviewer_id);
                push_evaluation(&mut prompt, &routed.feedback);
            }
        }
        prompt
    }

    fn judge(
        &self,
        question: &str,
        solutions: &[Solution],
        feedbacks: &[FeedbackBundle],
        refinements: &[RefinedSolution],
    ) -> String {
        let mut prompt = format!(
            "You are the Judge.\n\n## Question\n\n{question}\n\n## Initial solutions\n"
        );
        for s in solutions {
            let _ = write!(
                prompt,
                "\n### {} ({})\n\nAnswer: {}\n\nExplanation: {}\n",
                s.solver_id, s.model, s.response.answer, s.response.explanation
            );
        }

        prompt.push_str("\n## Peer reviews\n");
        for bundle in feedbacks {
            for item in bundle.items() {
                let _ = write!(
                    prompt,
                    "\n### {} on {}\n\n",
                    bundle.reviewer_id, item.solution_id
                );
                push_evaluation(&mut prompt, item);
            }
        }

        prompt.push_str("\n## Refined solutions\n");
        for r in refinements {
            let refined = &r.refined_response;
            let _ = write!(
                prompt,
                "\n### {}\n\nAnswer: {} (confidence {:.2}, accepted {}/{} critiques)\n\nExplanation: {}\n",
                r.solver_id,
                refined.refined_answer,
                refined.confidence,
                refined.accepted_changes(),
                refined.changes_made.len(),
                refined.refined_solution
            );
        }

        prompt.push_str(
            "\nPick the best final answer. Reply with the `winner` solver id, \
             the exact `winning_answer` text, your `confidence` between 0 and 1 \
             and your `reasoning`.",
        );
        prompt
    }
}

/// Full evaluation of one review item, followed by its overall assessment.
fn push_evaluation(prompt: &mut String, item: &FeedbackItem) {
    let eval = &item.evaluation;
    push_list(prompt, "Strengths", &eval.strengths);
    push_list(prompt, "Weaknesses", &eval.weaknesses);
    let errors: Vec<String> = eval
        .errors
        .iter()
        .map(|e| {
            format!(
                "[{}] {} at {}: {}",
                e.severity, e.error_type, e.location, e.description
            )
        })
        .collect();
    push_list(prompt, "Errors", &errors);
    push_list(prompt, "Suggested changes", &eval.suggested_changes);
    let _ = writeln!(prompt, "Overall: {}", item.overall_assessment);
}

fn push_list(prompt: &mut String, title: &str, entries: &[String]) {
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(prompt, "{title}:");
    for entry in entries {
        let _ = writeln!(prompt, "- {entry}");
    }
}
