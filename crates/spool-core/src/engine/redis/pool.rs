//! Job pool: body storage with store-enforced expiry.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::domain::{Job, QueueName};
use crate::error::{EngineError, Result};

/// Byte store keyed `j/{ns}/{queue}/{job_id}`, TTL enforced by the store.
#[derive(Clone)]
pub struct JobPool {
    conn: ConnectionManager,
}

impl JobPool {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Write the body. `ttl_seconds == 0` writes without expiry; a duplicate
    /// ID is overwritten.
    pub async fn add(&self, job: &Job, ttl_seconds: u32) -> Result<()> {
        let name = QueueName::new(&job.namespace, &job.queue)?;
        let key = name.pool_key(&job.id.to_string());
        let mut conn = self.conn.clone();
        if ttl_seconds > 0 {
            conn.set_ex::<_, _, ()>(&key, &job.body, u64::from(ttl_seconds))
                .await?;
        } else {
            conn.set::<_, _, ()>(&key, &job.body).await?;
        }
        Ok(())
    }

    /// Fetch a body and its remaining TTL (0 = no expiry). Missing keys
    /// surface as [`EngineError::NotFound`].
    pub async fn get(&self, name: &QueueName, job_id: &str) -> Result<(Vec<u8>, u32)> {
        let key = name.pool_key(job_id);
        let mut conn = self.conn.clone();
        // GET and TTL in one transaction so the pair is consistent.
        let (body, ttl): (Option<Vec<u8>>, i64) = redis::pipe()
            .atomic()
            .get(&key)
            .ttl(&key)
            .query_async(&mut conn)
            .await?;
        match body {
            Some(body) => Ok((body, if ttl > 0 { ttl as u32 } else { 0 })),
            None => Err(EngineError::NotFound),
        }
    }

    /// Idempotent.
    pub async fn delete(&self, name: &QueueName, job_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(name.pool_key(job_id)).await?;
        Ok(())
    }
}
