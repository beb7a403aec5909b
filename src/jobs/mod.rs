//! Background email delivery: job definitions, the submission port, the Redis
//! backed runner, the processor that renders and sends, and the overdue sweep.

pub mod email;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod sweep;

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub use email::{EmailService, Mailer, OutgoingEmail};
pub use processor::EmailProcessor;
pub use queue::RedisTaskQueue;
pub use retry::RetryPolicy;
pub use sweep::{OverdueSweep, SweepReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmailJob {
    /// Deliver a notification log that already holds its subject and body
    SendNotification { notification_log_id: Uuid },
    /// Render and deliver an overdue reminder for a checkout
    #[serde(rename = "send_overdue_notification")]
    OverdueNotification { checkout_id: Uuid },
}

impl EmailJob {
    pub fn kind(&self) -> &'static str {
        match self {
            EmailJob::SendNotification { .. } => "send_notification",
            EmailJob::OverdueNotification { .. } => "send_overdue_notification",
        }
    }
}

/// At-least-once job submission.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(&self, job: EmailJob) -> Result<(), AppError>;
}

/// Keeps submitted jobs in memory instead of running them.
#[derive(Debug, Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<EmailJob>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<EmailJob> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn take(&self) -> Vec<EmailJob> {
        std::mem::take(&mut *self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn submit(&self, job: EmailJob) -> Result<(), AppError> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_wire_format() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(EmailJob::OverdueNotification { checkout_id: id }).unwrap();
        assert_eq!(json["kind"], "send_overdue_notification");
        assert_eq!(json["checkout_id"], id.to_string());

        let json = serde_json::to_value(EmailJob::SendNotification { notification_log_id: id }).unwrap();
        assert_eq!(json["kind"], "send_notification");
    }

    #[tokio::test]
    async fn recording_queue_keeps_submission_order() {
        let queue = RecordingQueue::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        queue.submit(EmailJob::SendNotification { notification_log_id: a }).await.unwrap();
        queue.submit(EmailJob::OverdueNotification { checkout_id: b }).await.unwrap();

        assert_eq!(
            queue.take(),
            vec![
                EmailJob::SendNotification { notification_log_id: a },
                EmailJob::OverdueNotification { checkout_id: b },
            ]
        );
        assert!(queue.jobs().is_empty());
    }
}
