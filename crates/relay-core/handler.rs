use async_trait::async_trait;

use crate::job::Job;

/// Implemented once per job type and registered with a worker pool. The core
/// only cares that `handle` runs to completion and returns an error or not;
/// argument binding and any ambient context beyond `Job` itself are left to
/// the implementor.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), anyhow::Error>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), anyhow::Error>> + Send,
{
    async fn handle(&self, job: &Job) -> Result<(), anyhow::Error> {
        (self)(job.clone()).await
    }
}
