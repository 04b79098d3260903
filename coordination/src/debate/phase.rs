//! Phase runner — bounded fan-out/fan-in of independent participant tasks.
//!
//! ```text
//! tasks[0..n] ──JoinSet::spawn──▶ (Semaphore, limit k) ──join_next──▶ slots[index]
//! ```
//!
//! Each task carries its own input struct; results are put back by
//! submission index, so output order never depends on completion order.
//!
//! ## Failure policy
//!
//! Fail-fast: the first terminal task failure aborts the remaining tasks and
//! fails the whole phase. There is no partial-success continuation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::error::DebateError;
use super::state::DebatePhase;
use crate::session::SessionError;

/// One unit of phase work, addressed to a participant.
#[derive(Debug, Clone)]
pub struct PhaseTask<I> {
    /// Identity the result will be tagged with.
    pub participant: String,
    pub input: I,
}

impl<I> PhaseTask<I> {
    pub fn new(participant: impl Into<String>, input: I) -> Self {
        Self {
            participant: participant.into(),
            input,
        }
    }
}

/// A task result tagged with its originating participant.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseResult<O> {
    pub participant: String,
    pub output: O,
}

/// Runs the tasks of one phase concurrently, at most `limit` at a time.
#[derive(Debug, Clone)]
pub struct PhaseRunner {
    limit: usize,
}

impl PhaseRunner {
    /// A limit of 0 is treated as 1.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `work` over every task and wait for all of them.
    ///
    /// Returns one result per task, in submission order, or the first
    /// terminal failure.
    pub async fn run<I, O, F, Fut>(
        &self,
        phase: DebatePhase,
        tasks: Vec<PhaseTask<I>>,
        work: F,
    ) -> Result<Vec<PhaseResult<O>>, DebateError>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, SessionError>> + Send + 'static,
    {
        let total = tasks.len();
        if total == 0 {
            debug!(%phase, "no tasks to run");
            return Ok(Vec::new());
        }

        let sem = Arc::new(Semaphore::new(self.limit));
        let work = Arc::new(work);
        let mut participants = Vec::with_capacity(total);
        let mut task_index = HashMap::with_capacity(total);
        let mut join_set: JoinSet<(usize, Result<O, SessionError>)> = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            participants.push(task.participant.clone());
            let sem = sem.clone();
            let work = work.clone();
            let input = task.input;

            let handle = join_set.spawn(async move {
                // The semaphore is never closed, so acquire cannot fail.
                let _permit = sem.acquire_owned().await.ok();
                (index, (*work)(input).await)
            });
            task_index.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<O>> = std::iter::repeat_with(|| None).take(total).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, Ok(output))) => {
                    debug!(%phase, participant = %participants[index], "task complete");
                    slots[index] = Some(output);
                }
                Ok((index, Err(source))) => {
                    join_set.abort_all();
                    warn!(
                        %phase,
                        participant = %participants[index],
                        error = %source,
                        "task failed, aborting phase"
                    );
                    return Err(DebateError::PhaseFailed {
                        phase,
                        participant: participants[index].clone(),
                        source,
                    });
                }
                Err(join_err) => {
                    join_set.abort_all();
                    let participant = task_index
                        .get(&join_err.id())
                        .and_then(|index| participants.get(*index).cloned())
                        .unwrap_or_else(|| "unknown".to_string());
                    warn!(%phase, %participant, error = %join_err, "task panicked, aborting phase");
                    return Err(DebateError::TaskPanicked {
                        phase,
                        participant,
                        detail: join_err.to_string(),
                    });
                }
            }
        }

        let results = slots
            .into_iter()
            .zip(participants)
            .filter_map(|(output, participant)| {
                output.map(|output| PhaseResult {
                    participant,
                    output,
                })
            })
            .collect::<Vec<_>>();
        debug_assert_eq!(results.len(), total);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::backend::BackendError;

    fn tasks(n: usize) -> Vec<PhaseTask<usize>> {
        (0..n).map(|i| PhaseTask::new(format!("p{i}"), i)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_submission_order_not_completion_order() {
        let runner = PhaseRunner::new(8);
        // Later tasks finish first.
        let results = runner
            .run(DebatePhase::InitialSolve, tasks(5), |i: usize| async move {
                tokio::time::sleep(Duration::from_millis(100 * (5 - i as u64))).await;
                Ok::<_, SessionError>(i * 10)
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.participant, format!("p{i}"));
            assert_eq!(result.output, i * 10);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_completion_orders_keep_identity() {
        let delays = [30u64, 0, 50, 10, 40, 20];
        let runner = PhaseRunner::new(3);
        let inputs: Vec<_> = delays
            .iter()
            .enumerate()
            .map(|(i, d)| PhaseTask::new(format!("solver_{}", i + 1), (i, *d)))
            .collect();
        let results = runner
            .run(DebatePhase::PeerReview, inputs, |(i, d): (usize, u64)| async move {
                tokio::time::sleep(Duration::from_millis(d)).await;
                Ok::<_, SessionError>(format!("solver_{}", i + 1))
            })
            .await
            .unwrap();
        assert_eq!(results.len(), delays.len());
        assert!(results.iter().all(|r| r.participant == r.output));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_is_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runner = PhaseRunner::new(2);

        let inputs: Vec<_> = (0..6)
            .map(|i| PhaseTask::new(format!("p{i}"), (in_flight.clone(), peak.clone())))
            .collect();
        runner
            .run(
                DebatePhase::Refinement,
                inputs,
                |(in_flight, peak): (Arc<AtomicUsize>, Arc<AtomicUsize>)| async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, SessionError>(())
                },
            )
            .await
            .unwrap();
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    // Known limitation: one failed participant fails the whole phase, even
    // when every other participant succeeded.
    #[tokio::test(start_paused = true)]
    async fn test_single_failure_fails_whole_phase() {
        let runner = PhaseRunner::new(4);
        let err = runner
            .run(DebatePhase::InitialSolve, tasks(4), |i: usize| async move {
                if i == 2 {
                    return Err(SessionError::RetriesExhausted {
                        provider: "scripted".into(),
                        model: "m".into(),
                        attempts: 4,
                        last: BackendError::rate_limited("scripted", "429"),
                    });
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(i)
            })
            .await
            .unwrap_err();

        match err {
            DebateError::PhaseFailed {
                phase, participant, ..
            } => {
                assert_eq!(phase, DebatePhase::InitialSolve);
                assert_eq!(participant, "p2");
            }
            other => panic!("expected PhaseFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_task_fails_phase() {
        let runner = PhaseRunner::new(2);
        let err = runner
            .run(DebatePhase::Judgment, tasks(1), |_i: usize| async move {
                if true {
                    panic!("boom");
                }
                Ok::<usize, SessionError>(0)
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DebateError::TaskPanicked { ref participant, .. } if participant == "p0"
        ));
    }

    #[tokio::test]
    async fn test_empty_phase_returns_empty() {
        let runner = PhaseRunner::new(0);
        assert_eq!(runner.limit(), 1);
        let results = runner
            .run(DebatePhase::PeerReview, Vec::<PhaseTask<()>>::new(), |_| async {
                Ok::<(), SessionError>(())
            })
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
