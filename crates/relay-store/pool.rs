use std::{env, ops::Deref, sync::Arc};

use crate::error::{Error, Result};

/// A cloneable handle to a deadpool-managed Redis connection pool, plus the
/// key prefix that every caller-visible key is namespaced under.
#[derive(Clone)]
pub struct RedisPool(Arc<RedisPoolInner>);

struct RedisPoolInner {
    pool: deadpool_redis::Pool,
    key_prefix: String,
}

impl Deref for RedisPool {
    type Target = deadpool_redis::Pool;

    fn deref(&self) -> &Self::Target {
        &self.0.pool
    }
}

impl RedisPool {
    /// Build a pool. `connection` defaults to the `REDIS_URL` environment variable;
    /// `key_prefix` defaults to an empty namespace.
    pub fn new(connection: Option<String>, key_prefix: Option<String>) -> Result<RedisPool> {
        let redis_url = connection
            .or_else(|| env::var("REDIS_URL").ok())
            .ok_or(Error::MissingConnectionString)?;

        let pool = deadpool_redis::Config {
            url: Some(redis_url),
            connection: None,
            pool: None,
        }
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))?;

        Ok(RedisPool(Arc::new(RedisPoolInner {
            pool,
            key_prefix: key_prefix.unwrap_or_default(),
        })))
    }

    pub fn pool(&self) -> &deadpool_redis::Pool {
        &self.0.pool
    }

    pub fn key_prefix(&self) -> &str {
        self.0.key_prefix.as_str()
    }

    pub async fn get(&self) -> Result<deadpool_redis::Connection> {
        self.0.pool.get().await.map_err(Error::from)
    }
}
