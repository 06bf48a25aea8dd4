//! Admission-controlled dispatch loop
//!
//! For each shard in plan order the dispatcher polls the queue until fewer
//! than `max_concurrent` jobs carry the configured job name, then writes
//! the shard's artifact and submits it. A rejected submission is logged and
//! skipped. The loop ends once every shard has been attempted; it never
//! waits for submitted jobs to finish.

use shard_core::{Config, QueryErrorPolicy, ShardIndex, WorkPlan};
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::builder::ArtifactBuilder;
use crate::error::{DispatchError, QueueError};
use crate::queue::{ClusterQueue, JobId};

/// A shard the scheduler accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedShard {
    pub shard: ShardIndex,
    pub job_id: JobId,
}

/// A shard whose submission failed during this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedShard {
    pub shard: ShardIndex,
    pub reason: String,
}

/// Outcome of one pass over a work plan
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub submitted: Vec<SubmittedShard>,
    pub rejected: Vec<RejectedShard>,
    /// Number of times the loop slept waiting for queue headroom
    pub admission_waits: u64,
}

impl DispatchSummary {
    pub fn attempted(&self) -> usize {
        self.submitted.len() + self.rejected.len()
    }
}

/// Dispatches work plans onto a cluster queue
pub struct Dispatcher<Q> {
    queue: Q,
    builder: ArtifactBuilder,
    job_name: String,
    max_concurrent: usize,
    poll_interval: Duration,
    on_query_error: QueryErrorPolicy,
    max_query_failures: u32,
}

impl<Q: ClusterQueue> Dispatcher<Q> {
    pub fn new(config: &Config, queue: Q) -> Self {
        Self {
            queue,
            builder: ArtifactBuilder::new(config),
            job_name: config.job_name.clone(),
            max_concurrent: config.max_concurrent,
            poll_interval: config.poll_interval,
            on_query_error: config.on_query_error,
            max_query_failures: config.max_query_failures,
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Submits every shard of the plan, in order
    pub async fn run(&self, plan: &WorkPlan) -> Result<DispatchSummary, DispatchError> {
        self.builder
            .layout()
            .ensure_dirs()
            .map_err(DispatchError::Prepare)?;

        info!(
            "Dispatching {} shard(s) as '{}' (max concurrent: {}, poll interval: {:?})",
            plan.len(),
            self.job_name,
            self.max_concurrent,
            self.poll_interval
        );

        let total = plan.len();
        let mut summary = DispatchSummary::default();

        for (position, shard) in plan.iter().enumerate() {
            summary.admission_waits += self.wait_for_headroom().await?;

            match self.submit_shard(shard).await {
                Ok(job_id) => {
                    info!(
                        "Submitted shard {} as job {} ({}/{})",
                        shard,
                        job_id,
                        position + 1,
                        total
                    );
                    summary.submitted.push(SubmittedShard { shard, job_id });
                }
                Err(e) => {
                    error!(
                        "Failed to submit shard {} ({}/{}): {}",
                        shard,
                        position + 1,
                        total,
                        e
                    );
                    if let Err(cleanup) = self.builder.discard(shard) {
                        warn!(
                            "Failed to remove artifact for rejected shard {}: {}",
                            shard, cleanup
                        );
                    }
                    summary.rejected.push(RejectedShard {
                        shard,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Dispatch finished: {} submitted, {} rejected, {} admission wait(s)",
            summary.submitted.len(),
            summary.rejected.len(),
            summary.admission_waits
        );

        Ok(summary)
    }

    /// Blocks until the queue holds fewer than `max_concurrent` jobs
    ///
    /// # Returns
    /// The number of poll delays slept before headroom appeared
    async fn wait_for_headroom(&self) -> Result<u64, DispatchError> {
        let mut waits = 0;
        let mut consecutive_failures = 0u32;

        loop {
            match self.queue.count_running(&self.job_name).await {
                Ok(running) if running < self.max_concurrent => {
                    debug!("{} job(s) queued, admitting next shard", running);
                    return Ok(waits);
                }
                Ok(running) => {
                    consecutive_failures = 0;
                    debug!(
                        "{} job(s) queued (max {}), waiting {:?}",
                        running, self.max_concurrent, self.poll_interval
                    );
                }
                Err(e) => {
                    consecutive_failures += 1;
                    self.handle_query_error(e, consecutive_failures)?;
                }
            }

            time::sleep(self.poll_interval).await;
            waits += 1;
        }
    }

    /// Applies the configured query error policy
    fn handle_query_error(&self, error: QueueError, failures: u32) -> Result<(), DispatchError> {
        match self.on_query_error {
            QueryErrorPolicy::Abort => Err(DispatchError::Queue(error)),
            QueryErrorPolicy::AssumeFull => {
                if self.max_query_failures > 0 && failures >= self.max_query_failures {
                    return Err(DispatchError::QueryExhausted {
                        failures,
                        last: error,
                    });
                }
                warn!(
                    "{} (attempt {}), assuming queue is full",
                    error, failures
                );
                Ok(())
            }
        }
    }

    async fn submit_shard(&self, shard: ShardIndex) -> Result<JobId, DispatchError> {
        let artifact = self
            .builder
            .build(shard)
            .map_err(|source| DispatchError::Artifact { shard, source })?;

        Ok(self.queue.submit(&artifact).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shard_core::ShardLayout;
    use async_trait::async_trait;
    use std::collections::{HashSet, VecDeque};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Count(usize),
        CountFailed,
        Submit(PathBuf),
    }

    /// Queue that replays scripted running counts and records every call
    struct ScriptedQueue {
        counts: Mutex<VecDeque<Option<usize>>>,
        reject: HashSet<String>,
        events: Mutex<Vec<Event>>,
        artifacts: Mutex<Vec<String>>,
        next_id: Mutex<u64>,
    }

    impl ScriptedQueue {
        /// `None` entries script a failed query; an exhausted script reports 0
        fn new(counts: Vec<Option<usize>>) -> Self {
            Self {
                counts: Mutex::new(counts.into()),
                reject: HashSet::new(),
                events: Mutex::new(Vec::new()),
                artifacts: Mutex::new(Vec::new()),
                next_id: Mutex::new(100),
            }
        }

        fn rejecting(mut self, file_name: &str) -> Self {
            self.reject.insert(file_name.to_string());
            self
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClusterQueue for ScriptedQueue {
        async fn submit(&self, artifact: &Path) -> Result<JobId, QueueError> {
            self.events
                .lock()
                .unwrap()
                .push(Event::Submit(artifact.to_path_buf()));

            let content = std::fs::read_to_string(artifact).expect("artifact exists at submit");
            self.artifacts.lock().unwrap().push(content);

            let name = artifact.file_name().unwrap().to_string_lossy().to_string();
            if self.reject.contains(&name) {
                return Err(QueueError::Submission {
                    artifact: name,
                    reason: "sbatch: error: invalid partition".to_string(),
                });
            }

            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            Ok(JobId::new(next_id.to_string()))
        }

        async fn count_running(&self, job_name: &str) -> Result<usize, QueueError> {
            let scripted = self.counts.lock().unwrap().pop_front().unwrap_or(Some(0));
            match scripted {
                Some(count) => {
                    self.events.lock().unwrap().push(Event::Count(count));
                    Ok(count)
                }
                None => {
                    self.events.lock().unwrap().push(Event::CountFailed);
                    Err(QueueError::Query {
                        job_name: job_name.to_string(),
                        reason: "slurm_load_jobs error: Socket timed out".to_string(),
                    })
                }
            }
        }
    }

    fn test_config(root: &Path, max_concurrent: usize) -> Config {
        Config {
            cache_dir: root.join("cache"),
            log_dir: root.join("logs"),
            output_dir: root.join("output"),
            error_log: root.join("error_logs.txt"),
            max_concurrent,
            poll_interval: Duration::from_millis(2),
            ..Config::default()
        }
    }

    fn plan(raw: &[u64]) -> WorkPlan {
        WorkPlan::new(raw.iter().copied().map(ShardIndex::new)).unwrap()
    }

    /// Every submission must follow a count below the ceiling
    fn assert_admission_respected(events: &[Event], max_concurrent: usize) {
        for pair in events.windows(2) {
            if let Event::Submit(path) = &pair[1] {
                match &pair[0] {
                    Event::Count(n) => assert!(
                        *n < max_concurrent,
                        "submitted {} right after observing {} running",
                        path.display(),
                        n
                    ),
                    other => panic!("submission of {} preceded by {:?}", path.display(), other),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_creates_run_directories() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path(), 1);
        let dispatcher = Dispatcher::new(&config, ScriptedQueue::new(vec![]));

        dispatcher.run(&WorkPlan::default()).await.unwrap();

        assert!(config.cache_dir.is_dir());
        assert!(config.log_dir.is_dir());
        assert!(config.output_dir.is_dir());
    }

    #[tokio::test]
    async fn test_single_slot_scenario() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path(), 1);
        let queue = ScriptedQueue::new(vec![
            Some(0),
            Some(1),
            Some(1),
            Some(0),
            Some(1),
            Some(0),
        ]);
        let dispatcher = Dispatcher::new(&config, queue);

        let summary = dispatcher.run(&plan(&[0, 1, 2])).await.unwrap();

        assert_eq!(summary.submitted.len(), 3);
        assert!(summary.rejected.is_empty());
        assert_eq!(summary.admission_waits, 3);

        let layout = ShardLayout::from_config(&config);
        let events = dispatcher.queue().events();
        let submitted: Vec<PathBuf> = events
            .iter()
            .filter_map(|e| match e {
                Event::Submit(path) => Some(path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            submitted,
            vec![
                layout.artifact_path(ShardIndex::new(0)),
                layout.artifact_path(ShardIndex::new(1)),
                layout.artifact_path(ShardIndex::new(2)),
            ]
        );
        assert_eq!(
            events,
            vec![
                Event::Count(0),
                Event::Submit(submitted[0].clone()),
                Event::Count(1),
                Event::Count(1),
                Event::Count(0),
                Event::Submit(submitted[1].clone()),
                Event::Count(1),
                Event::Count(0),
                Event::Submit(submitted[2].clone()),
            ]
        );
        assert_admission_respected(&events, 1);

        let job_ids: Vec<&str> = summary.submitted.iter().map(|s| s.job_id.as_str()).collect();
        assert_eq!(job_ids, vec!["101", "102", "103"]);
    }

    #[tokio::test]
    async fn test_artifacts_are_identical_across_runs() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path(), 4);
        let dispatcher = Dispatcher::new(&config, ScriptedQueue::new(vec![]));

        dispatcher.run(&plan(&[5])).await.unwrap();
        dispatcher.run(&plan(&[5])).await.unwrap();

        let artifacts = dispatcher.queue().artifacts.lock().unwrap().clone();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0], artifacts[1]);
        assert!(artifacts[0].ends_with("shard-worker 5\n"));
    }

    #[tokio::test]
    async fn test_saturated_queue_keeps_polling_with_delay() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path(), 2);
        let mut script = vec![Some(5); 25];
        script.push(Some(1));
        let dispatcher = Dispatcher::new(&config, ScriptedQueue::new(script));

        let started = Instant::now();
        let summary = dispatcher.run(&plan(&[0])).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(summary.submitted.len(), 1);
        assert_eq!(summary.admission_waits, 25);
        assert!(
            elapsed >= config.poll_interval * 25,
            "polled without sleeping: {:?}",
            elapsed
        );

        let events = dispatcher.queue().events();
        assert_eq!(events.len(), 27);
        assert_admission_respected(&events, 2);
    }

    #[tokio::test]
    async fn test_rejected_submission_does_not_block_plan() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path(), 2);
        let queue = ScriptedQueue::new(vec![]).rejecting("sbatch_script_000001.sh");
        let dispatcher = Dispatcher::new(&config, queue);

        let summary = dispatcher.run(&plan(&[0, 1, 2])).await.unwrap();

        let submitted: Vec<ShardIndex> = summary.submitted.iter().map(|s| s.shard).collect();
        assert_eq!(submitted, vec![ShardIndex::new(0), ShardIndex::new(2)]);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.rejected[0].shard, ShardIndex::new(1));
        assert!(summary.rejected[0].reason.contains("invalid partition"));
        assert_eq!(summary.attempted(), 3);

        // The rejected shard reads as pending again; the others stay submitted
        let layout = ShardLayout::from_config(&config);
        assert!(layout.artifact_path(ShardIndex::new(0)).exists());
        assert!(!layout.artifact_path(ShardIndex::new(1)).exists());
        assert!(layout.artifact_path(ShardIndex::new(2)).exists());

        let submissions = dispatcher
            .queue()
            .events()
            .iter()
            .filter(|e| matches!(e, Event::Submit(_)))
            .count();
        assert_eq!(submissions, 3);
    }

    #[tokio::test]
    async fn test_query_error_aborts_under_abort_policy() {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path(), 2);
        config.on_query_error = QueryErrorPolicy::Abort;
        let dispatcher = Dispatcher::new(&config, ScriptedQueue::new(vec![Some(0), None]));

        let err = dispatcher.run(&plan(&[0, 1])).await.unwrap_err();

        assert!(matches!(err, DispatchError::Queue(QueueError::Query { .. })));
        let submissions = dispatcher
            .queue()
            .events()
            .iter()
            .filter(|e| matches!(e, Event::Submit(_)))
            .count();
        assert_eq!(submissions, 1);
    }

    #[tokio::test]
    async fn test_query_error_backs_off_under_assume_full_policy() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path(), 2);
        let dispatcher =
            Dispatcher::new(&config, ScriptedQueue::new(vec![None, None, Some(1)]));

        let summary = dispatcher.run(&plan(&[0])).await.unwrap();

        assert_eq!(summary.submitted.len(), 1);
        assert_eq!(summary.admission_waits, 2);
        assert_eq!(
            dispatcher.queue().events()[..3],
            [Event::CountFailed, Event::CountFailed, Event::Count(1)]
        );
    }

    #[tokio::test]
    async fn test_query_errors_exhaust_after_limit() {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path(), 2);
        config.max_query_failures = 3;
        let dispatcher = Dispatcher::new(&config, ScriptedQueue::new(vec![None; 10]));

        let err = dispatcher.run(&plan(&[0])).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::QueryExhausted { failures: 3, .. }
        ));
        assert_eq!(dispatcher.queue().events().len(), 3);
    }

    #[tokio::test]
    async fn test_saturation_resets_query_failure_streak() {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path(), 1);
        config.max_query_failures = 2;
        let script = vec![None, Some(3), None, Some(3), None, Some(0)];
        let dispatcher = Dispatcher::new(&config, ScriptedQueue::new(script));

        let summary = dispatcher.run(&plan(&[0])).await.unwrap();
        assert_eq!(summary.submitted.len(), 1);
        assert_eq!(summary.admission_waits, 5);
    }
}
