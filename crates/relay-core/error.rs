use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Redis error {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Redis connection error {0}")]
    StoreError(#[from] relay_store::Error),

    #[error("Failed to serialize or deserialize a job: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid cron expression: {0}")]
    InvalidSchedule(#[from] cron::error::Error),

    #[error("Worker pool already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, Error>;
