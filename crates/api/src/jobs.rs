use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    DailyScan,
    PriceUpdate,
}

/// What a finished job reports back.
#[derive(Debug, Clone, Default)]
pub struct JobOutcome {
    pub scan_id: Option<Uuid>,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub job: JobKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub scan_id: Option<Uuid>,
    pub detail: Option<String>,
    pub error: Option<String>,
}

impl JobRun {
    pub fn is_running(&self) -> bool {
        self.finished_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub running: bool,
    pub jobs: Vec<JobRun>,
}

/// Latest run per job kind, shared across handlers. At most one run of a kind
/// is in flight per process.
#[derive(Clone, Default)]
pub struct JobTracker {
    runs: Arc<Mutex<BTreeMap<JobKind, JobRun>>>,
}

impl JobTracker {
    /// Records a new run, or returns `None` when one of the same kind is still going.
    pub async fn start(&self, job: JobKind) -> Option<DateTime<Utc>> {
        let mut runs = self.runs.lock().await;
        if runs.get(&job).is_some_and(JobRun::is_running) {
            return None;
        }
        let started_at = Utc::now();
        runs.insert(
            job,
            JobRun {
                job,
                started_at,
                finished_at: None,
                scan_id: None,
                detail: None,
                error: None,
            },
        );
        Some(started_at)
    }

    pub async fn finish(&self, job: JobKind, outcome: &anyhow::Result<JobOutcome>) {
        let mut runs = self.runs.lock().await;
        let Some(run) = runs.get_mut(&job) else {
            return;
        };
        run.finished_at = Some(Utc::now());
        match outcome {
            Ok(o) => {
                run.scan_id = o.scan_id;
                run.detail = Some(o.detail.clone());
            }
            Err(err) => run.error = Some(format!("{err:#}")),
        }
    }

    pub async fn status(&self) -> JobStatus {
        let runs = self.runs.lock().await;
        JobStatus {
            running: runs.values().any(JobRun::is_running),
            jobs: runs.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_run_per_kind_at_a_time() {
        let jobs = JobTracker::default();
        assert!(jobs.start(JobKind::DailyScan).await.is_some());
        assert!(jobs.start(JobKind::DailyScan).await.is_none());
        assert!(jobs.start(JobKind::PriceUpdate).await.is_some());

        let status = jobs.status().await;
        assert!(status.running);
        assert_eq!(status.jobs.len(), 2);

        let scan_id = Uuid::new_v4();
        let done = Ok(JobOutcome {
            scan_id: Some(scan_id),
            detail: "3 opportunities persisted".to_string(),
        });
        jobs.finish(JobKind::DailyScan, &done).await;
        jobs.finish(JobKind::PriceUpdate, &Err(anyhow::anyhow!("quote feed down")))
            .await;

        let status = jobs.status().await;
        assert!(!status.running);
        assert_eq!(status.jobs[0].scan_id, Some(scan_id));
        assert_eq!(status.jobs[1].error.as_deref(), Some("quote feed down"));

        // A finished kind can start again.
        assert!(jobs.start(JobKind::DailyScan).await.is_some());
    }

    #[tokio::test]
    async fn finishing_an_unknown_kind_is_ignored() {
        let jobs = JobTracker::default();
        jobs.finish(JobKind::DailyScan, &Ok(JobOutcome::default())).await;
        assert!(jobs.status().await.jobs.is_empty());
    }
}
