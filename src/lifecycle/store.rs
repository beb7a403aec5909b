use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Checkout, CheckoutDetail, Laptop, LaptopStatus, LostFoundEvent, LostFoundEventDetail, NewAuditLog,
    NewLostFoundEvent, NewNotification, NotificationLog, OverdueDedupKey, User,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Selection over checkout rows. Every field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct CheckoutFilter {
    pub user_id: Option<Uuid>,
    pub laptop_id: Option<Uuid>,
    pub active_only: bool,
    /// Only checkouts with `checked_out_at` strictly before this instant
    pub checked_out_before: Option<DateTime<Utc>>,
    pub order: CheckoutOrder,
}

impl CheckoutFilter {
    pub fn matches(&self, checkout: &Checkout) -> bool {
        self.user_id.is_none_or(|id| checkout.user_id == id)
            && self.laptop_id.is_none_or(|id| checkout.laptop_id == id)
            && (!self.active_only || checkout.is_active())
            && self.checked_out_before.is_none_or(|cutoff| checkout.checked_out_at < cutoff)
    }
}

/// Persistence seen by the lifecycle manager, the job processor and the auth layer.
///
/// Reads outside a transaction never take row locks.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    /// Non-deleted user by id.
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Non-deleted user by login email.
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Non-deleted laptop by its `LAP-` identifier.
    async fn laptop_by_unique_id(&self, unique_id: &str) -> Result<Option<Laptop>>;

    async fn active_checkout_for_laptop(&self, laptop_id: Uuid) -> Result<Option<CheckoutDetail>>;

    async fn checkout_detail(&self, id: Uuid) -> Result<Option<CheckoutDetail>>;

    async fn list_checkouts(&self, filter: &CheckoutFilter) -> Result<Vec<CheckoutDetail>>;

    /// Newest first. `since` bounds `event_timestamp` from below.
    async fn list_lost_found_events(
        &self,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<LostFoundEventDetail>>;

    /// Most recent overdue log for `key` created at or after `since`.
    async fn recent_overdue_notification(
        &self,
        key: &OverdueDedupKey,
        since: DateTime<Utc>,
    ) -> Result<Option<NotificationLog>>;

    async fn notification(&self, id: Uuid) -> Result<Option<NotificationLog>>;

    async fn insert_notification(&self, new: NewNotification) -> Result<NotificationLog>;

    async fn mark_notification_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Sets status `failed`, bumps `retry_count` and records the error.
    async fn mark_notification_failed(&self, id: Uuid, error: &str, at: DateTime<Utc>) -> Result<()>;
}

/// A single atomic unit of lifecycle work. Dropping it without `commit` discards every write.
#[async_trait]
pub trait StoreTx: Send {
    /// Loads a non-deleted laptop and holds it exclusively until the transaction ends.
    async fn lock_laptop(&mut self, unique_id: &str) -> Result<Option<Laptop>>;

    /// Loads a non-deleted user and holds it exclusively until the transaction ends.
    async fn lock_user(&mut self, id: Uuid) -> Result<Option<User>>;

    async fn active_checkout_for_laptop(&mut self, laptop_id: Uuid) -> Result<Option<Checkout>>;

    /// The user's active checkout together with the laptop it holds.
    async fn active_checkout_for_user(&mut self, user_id: Uuid) -> Result<Option<(Checkout, Laptop)>>;

    async fn insert_checkout(&mut self, laptop_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<Checkout>;

    async fn complete_checkout(&mut self, id: Uuid, at: DateTime<Utc>) -> Result<Checkout>;

    async fn set_laptop_status(&mut self, laptop_id: Uuid, status: LaptopStatus, at: DateTime<Utc>) -> Result<Laptop>;

    async fn insert_audit(&mut self, entry: NewAuditLog) -> Result<()>;

    async fn insert_notification(&mut self, new: NewNotification) -> Result<NotificationLog>;

    async fn insert_lost_found_event(&mut self, new: NewLostFoundEvent) -> Result<LostFoundEvent>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
