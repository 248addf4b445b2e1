//! The job repository: serialized read-modify-write per job id.
//!
//! The job document is the single mutable shared structure per job. Every
//! mutation goes through `update`, which is atomic per key, so concurrent
//! segment tasks can write back their outcomes without losing sibling
//! updates, and a concurrent reader always sees monotonically increasing
//! progress.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use adreel_models::{GenerationJob, JobId, JobStatusSnapshot};

use crate::error::{JobStoreError, JobStoreResult};

/// Mutation applied atomically to one job.
pub type JobMutation = Box<dyn FnOnce(&mut GenerationJob) + Send>;

/// Keyed job repository. Implementations must make `update` an atomic
/// read-modify-write per job id.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails if the id already exists.
    async fn create(&self, job: GenerationJob) -> JobStoreResult<()>;

    /// Fetch a job by id.
    async fn get(&self, id: &JobId) -> JobStoreResult<GenerationJob>;

    /// Atomically mutate a job, returning the updated document.
    async fn update(&self, id: &JobId, mutation: JobMutation) -> JobStoreResult<GenerationJob>;

    /// Read-only status projection for pollers.
    async fn snapshot(&self, id: &JobId) -> JobStoreResult<JobStatusSnapshot> {
        Ok(self.get(id).await?.snapshot())
    }
}

/// In-memory store: a keyed map behind a mutex.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, GenerationJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: GenerationJob) -> JobStoreResult<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(job.id.as_str()) {
            return Err(JobStoreError::AlreadyExists(job.id.clone()));
        }
        debug!(job_id = %job.id, "created job");
        jobs.insert(job.id.as_str().to_string(), job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> JobStoreResult<GenerationJob> {
        let jobs = self.jobs.lock().await;
        jobs.get(id.as_str())
            .cloned()
            .ok_or_else(|| JobStoreError::NotFound(id.clone()))
    }

    async fn update(&self, id: &JobId, mutation: JobMutation) -> JobStoreResult<GenerationJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(id.as_str())
            .ok_or_else(|| JobStoreError::NotFound(id.clone()))?;
        mutation(job);
        Ok(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::{AssetStatus, StoryboardId};
    use std::sync::Arc;

    fn new_job(segments: u32) -> GenerationJob {
        GenerationJob::new(StoryboardId::from_string("sb"), 0..segments)
    }

    #[tokio::test]
    async fn create_get_round_trip() {
        let store = MemoryJobStore::new();
        let job = new_job(2);
        let id = job.id.clone();

        store.create(job).await.unwrap();
        let fetched = store.get(&id).await.unwrap();
        assert_eq!(fetched.assets.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = MemoryJobStore::new();
        let job = new_job(1);
        store.create(job.clone()).await.unwrap();
        assert!(matches!(
            store.create(job).await,
            Err(JobStoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn update_missing_job_is_not_found() {
        let store = MemoryJobStore::new();
        let result = store
            .update(&JobId::from_string("ghost"), Box::new(|_| {}))
            .await;
        assert!(matches!(result, Err(JobStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_updates_do_not_lose_writes() {
        let store = Arc::new(MemoryJobStore::new());
        let job = new_job(8);
        let id = job.id.clone();
        store.create(job).await.unwrap();

        let mut handles = Vec::new();
        for segment_id in 0..8u32 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(
                        &id,
                        Box::new(move |job| {
                            if let Some(asset) = job.asset_mut(segment_id) {
                                asset.complete(format!("https://cdn/seg{segment_id}.mp4"));
                            }
                            job.refresh_status();
                        }),
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let final_job = store.get(&id).await.unwrap();
        assert!(final_job
            .assets
            .iter()
            .all(|a| a.status == AssetStatus::Completed));
        assert_eq!(final_job.snapshot().overall_progress, 100);
    }

    #[tokio::test]
    async fn snapshot_shows_incremental_progress() {
        let store = MemoryJobStore::new();
        let job = new_job(4);
        let id = job.id.clone();
        store.create(job).await.unwrap();

        store
            .update(
                &id,
                Box::new(|job| {
                    job.asset_mut(0).unwrap().complete("https://cdn/0.mp4");
                }),
            )
            .await
            .unwrap();

        let snapshot = store.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.overall_progress, 25);
    }
}
