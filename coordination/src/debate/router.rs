//! Feedback routing — each solver sees only critiques aimed at it.

use super::types::{FeedbackBundle, RoutedFeedback};

/// Collect every feedback item targeting `target_solver_id`, across all
/// bundles, keeping the reviewer that wrote it. Bundle order and item order
/// within a bundle are preserved.
pub fn route(bundles: &[FeedbackBundle], target_solver_id: &str) -> Vec<RoutedFeedback> {
    bundles
        .iter()
        .flat_map(|bundle| {
            bundle
                .items()
                .iter()
                .filter(|item| item.solution_id == target_solver_id)
                .map(|item| RoutedFeedback {
                    reviewer_id: bundle.reviewer_id.clone(),
                    feedback: item.clone(),
                })
        })
        .collect()
}
