//! Redis backed at-least-once job queue.
//!
//! Jobs wait in a ready list, move atomically to a processing list while they
//! run and are removed once handled. Failed attempts wait in a sorted set
//! scored by the time they become due.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::processor::{EmailProcessor, JobOutcome};
use super::{EmailJob, RetryPolicy, TaskQueue};
use crate::error::AppError;

const READY_KEY: &str = "email_jobs:ready";
const PROCESSING_KEY: &str = "email_jobs:processing";
const DELAYED_KEY: &str = "email_jobs:delayed";

/// Promotion batch size per poll.
const PROMOTE_BATCH: isize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub id: Uuid,
    pub job: EmailJob,
    /// Attempts already made
    pub attempt: u32,
    pub max_attempts: u32,
}

impl JobEnvelope {
    pub fn new(job: EmailJob, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            attempt: 0,
            max_attempts,
        }
    }

    /// The envelope to schedule after the current attempt failed, if any attempts remain.
    pub fn after_failure(&self) -> Option<Self> {
        let attempt = self.attempt + 1;
        (attempt < self.max_attempts).then(|| Self {
            attempt,
            ..self.clone()
        })
    }
}

pub struct RedisTaskQueue {
    client: redis::Client,
    policy: RetryPolicy,
}

impl RedisTaskQueue {
    pub fn new(client: redis::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, AppError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Puts jobs left in the processing list by a previous process back on the ready list.
    pub async fn recover_orphans(&self) -> Result<usize, AppError> {
        let mut conn = self.connection().await?;
        let mut recovered = 0;
        loop {
            let moved: Option<String> = redis::cmd("RPOPLPUSH")
                .arg(PROCESSING_KEY)
                .arg(READY_KEY)
                .query_async(&mut conn)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            tracing::warn!("Re-queued {} interrupted email jobs", recovered);
        }
        Ok(recovered)
    }

    async fn promote_due(&self, conn: &mut MultiplexedConnection) -> Result<(), AppError> {
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(DELAYED_KEY)
            .arg("-inf")
            .arg(now_ms)
            .arg("LIMIT")
            .arg(0)
            .arg(PROMOTE_BATCH)
            .query_async(conn)
            .await?;

        for raw in due {
            // only the runner that removes the entry promotes it
            let removed: i64 = conn.zrem(DELAYED_KEY, &raw).await?;
            if removed == 1 {
                let _: i64 = conn.lpush(READY_KEY, &raw).await?;
            }
        }
        Ok(())
    }

    /// Runs at most one job. Returns whether one was found.
    async fn run_next(&self, conn: &mut MultiplexedConnection, processor: &EmailProcessor) -> Result<bool, AppError> {
        self.promote_due(conn).await?;

        let raw: Option<String> = redis::cmd("RPOPLPUSH")
            .arg(READY_KEY)
            .arg(PROCESSING_KEY)
            .query_async(conn)
            .await?;
        let Some(raw) = raw else {
            return Ok(false);
        };

        let envelope: JobEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!("Dropping malformed email job {:?}: {}", raw, e);
                let _: i64 = conn.lrem(PROCESSING_KEY, 1, &raw).await?;
                return Ok(true);
            }
        };

        tracing::info!(
            "Running email job {} ({}) attempt {}/{}",
            envelope.id,
            envelope.job.kind(),
            envelope.attempt + 1,
            envelope.max_attempts
        );
        let result = processor.process(&envelope.job).await;

        match result {
            Ok(JobOutcome::Sent { notification_log_id }) => {
                tracing::info!("Email job {} delivered notification {}", envelope.id, notification_log_id);
            }
            Ok(JobOutcome::Skipped { reason }) => {
                tracing::info!("Email job {} skipped: {}", envelope.id, reason);
            }
            Err(e) => match envelope.after_failure() {
                Some(next) => {
                    let delay = self.policy.next_delay(next.attempt);
                    let due_ms = Utc::now().timestamp_millis() + delay.as_millis() as i64;
                    let payload = serde_json::to_string(&next)
                        .map_err(|e| AppError::internal(format!("serialize email job: {e}")))?;
                    let _: i64 = conn.zadd(DELAYED_KEY, payload, due_ms).await?;
                    tracing::warn!(
                        "Email job {} failed ({}), retrying in {}ms",
                        envelope.id,
                        e,
                        delay.as_millis()
                    );
                }
                None => {
                    tracing::error!(
                        "Email job {} failed permanently after {} attempts: {}",
                        envelope.id,
                        envelope.max_attempts,
                        e
                    );
                }
            },
        }

        let _: i64 = conn.lrem(PROCESSING_KEY, 1, &raw).await?;
        Ok(true)
    }

    /// Drains the queue forever, sleeping `poll` whenever it is empty.
    /// One connection is held across ticks and reopened after an error.
    pub async fn run(self: Arc<Self>, processor: Arc<EmailProcessor>, poll: Duration) {
        tracing::info!("Email job runner started");
        let mut conn: Option<MultiplexedConnection> = None;
        loop {
            if conn.is_none() {
                match self.connection().await {
                    Ok(fresh) => conn = Some(fresh),
                    Err(e) => {
                        tracing::error!("Email job runner cannot reach redis: {}", e);
                        tokio::time::sleep(poll).await;
                        continue;
                    }
                }
            }
            let Some(current) = conn.as_mut() else {
                continue;
            };

            match self.run_next(current, &processor).await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(poll).await,
                Err(e) => {
                    tracing::error!("Email job runner error: {}", e);
                    conn = None;
                    tokio::time::sleep(poll).await;
                }
            }
        }
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn submit(&self, job: EmailJob) -> Result<(), AppError> {
        let envelope = JobEnvelope::new(job, self.policy.max_attempts);
        let payload =
            serde_json::to_string(&envelope).map_err(|e| AppError::internal(format!("serialize email job: {e}")))?;

        let mut conn = self.connection().await?;
        let _: i64 = conn.lpush(READY_KEY, payload).await?;
        tracing::debug!("Queued email job {} ({})", envelope.id, envelope.job.kind());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_attempts_run_out() {
        let first = JobEnvelope::new(EmailJob::OverdueNotification { checkout_id: Uuid::new_v4() }, 3);
        let second = first.after_failure().unwrap();
        let third = second.after_failure().unwrap();

        assert_eq!(second.attempt, 1);
        assert_eq!(third.attempt, 2);
        assert_eq!(third.id, first.id);
        assert!(third.after_failure().is_none());
    }

    #[test]
    fn single_attempt_is_never_retried() {
        let only = JobEnvelope::new(EmailJob::SendNotification { notification_log_id: Uuid::new_v4() }, 1);
        assert!(only.after_failure().is_none());
    }

    #[test]
    fn envelope_wire_format() {
        let envelope = JobEnvelope::new(EmailJob::SendNotification { notification_log_id: Uuid::new_v4() }, 3);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["maxAttempts"], 3);
        assert_eq!(json["job"]["kind"], "send_notification");

        let back: JobEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope);
    }

    struct NoMail;

    #[async_trait]
    impl crate::jobs::Mailer for NoMail {
        async fn send(&self, _email: &crate::jobs::OutgoingEmail) -> Result<(), AppError> {
            Err(AppError::internal("no mail in this test"))
        }
    }

    /// Needs a scratch redis: `REDIS_URL=redis://127.0.0.1/15 cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn runner_drains_several_jobs_on_one_connection() {
        use crate::lifecycle::{SystemClock, memory::MemoryStore};

        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/15".into());
        let queue = RedisTaskQueue::new(
            redis::Client::open(url).unwrap(),
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(10),
            },
        );
        let mut conn = queue.connection().await.unwrap();
        let _: i64 = conn.del(&[READY_KEY, PROCESSING_KEY, DELAYED_KEY][..]).await.unwrap();

        for _ in 0..3 {
            queue
                .submit(EmailJob::SendNotification { notification_log_id: Uuid::new_v4() })
                .await
                .unwrap();
        }
        let processor = EmailProcessor::new(Arc::new(MemoryStore::new()), Arc::new(NoMail), Arc::new(SystemClock));

        for _ in 0..3 {
            assert!(queue.run_next(&mut conn, &processor).await.unwrap());
        }
        assert!(!queue.run_next(&mut conn, &processor).await.unwrap());

        let processing: i64 = conn.llen(PROCESSING_KEY).await.unwrap();
        assert_eq!(processing, 0);
    }
}
