use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::store::{CheckoutFilter, CheckoutOrder, Datastore, StoreTx};
use crate::error::{AppError, Result};
use crate::models::{
    AuditLog, Checkout, CheckoutDetail, CheckoutStatus, Laptop, LaptopStatus, LostFoundEvent, LostFoundEventDetail,
    NewAuditLog, NewLostFoundEvent, NewNotification, NotificationLog, NotificationStatus, OverdueDedupKey, User,
    UserSummary,
};
use crate::utils::error_codes;

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub users: HashMap<Uuid, User>,
    pub laptops: HashMap<Uuid, Laptop>,
    pub checkouts: Vec<Checkout>,
    pub lost_found_events: Vec<LostFoundEvent>,
    pub audit_logs: Vec<AuditLog>,
    pub notifications: Vec<NotificationLog>,
}

impl MemoryState {
    fn live_user(&self, id: Uuid) -> Option<&User> {
        self.users.get(&id).filter(|u| !u.is_deleted())
    }

    fn live_laptop(&self, unique_id: &str) -> Option<&Laptop> {
        self.laptops
            .values()
            .find(|l| l.unique_id == unique_id && l.deleted_at.is_none())
    }

    fn detail(&self, checkout: &Checkout) -> Option<CheckoutDetail> {
        Some(CheckoutDetail {
            checkout: checkout.clone(),
            laptop: self.laptops.get(&checkout.laptop_id)?.clone(),
            user: UserSummary::from(self.users.get(&checkout.user_id)?),
        })
    }

    fn event_detail(&self, event: &LostFoundEvent) -> Option<LostFoundEventDetail> {
        Some(LostFoundEventDetail {
            event: event.clone(),
            laptop: self.laptops.get(&event.laptop_id)?.clone(),
            original_user: UserSummary::from(self.users.get(&event.original_user_id)?),
            finder_user: UserSummary::from(self.users.get(&event.finder_user_id)?),
        })
    }

    fn active_for_laptop(&self, laptop_id: Uuid) -> Option<&Checkout> {
        self.checkouts.iter().find(|c| c.laptop_id == laptop_id && c.is_active())
    }

    fn push_notification(&mut self, new: NewNotification) -> NotificationLog {
        let log = NotificationLog {
            id: Uuid::new_v4(),
            notification_type: new.notification_type,
            recipient_email: new.recipient_email,
            recipient_user_id: new.recipient_user_id,
            subject: new.subject,
            body: new.body,
            related_entity_type: new.related_entity_type,
            related_entity_id: new.related_entity_id,
            status: NotificationStatus::Pending,
            retry_count: 0,
            error_message: None,
            sent_at: None,
            failed_at: None,
            created_at: new.created_at,
        };
        self.notifications.push(log.clone());
        log
    }

    fn notification_mut(&mut self, id: Uuid) -> Result<&mut NotificationLog> {
        self.notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| AppError::not_found(error_codes::NOT_FOUND_NOTIFICATION, "Notification not found"))
    }
}

/// In-process datastore. Transactions hold the whole state exclusively and
/// write back a staged copy on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_laptop(&self, laptop: Laptop) {
        self.state.lock().await.laptops.insert(laptop.id, laptop);
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.lock().await.live_user(id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| !u.is_deleted() && u.email == email)
            .cloned())
    }

    async fn laptop_by_unique_id(&self, unique_id: &str) -> Result<Option<Laptop>> {
        Ok(self.state.lock().await.live_laptop(unique_id).cloned())
    }

    async fn active_checkout_for_laptop(&self, laptop_id: Uuid) -> Result<Option<CheckoutDetail>> {
        let state = self.state.lock().await;
        Ok(state.active_for_laptop(laptop_id).and_then(|c| state.detail(c)))
    }

    async fn checkout_detail(&self, id: Uuid) -> Result<Option<CheckoutDetail>> {
        let state = self.state.lock().await;
        Ok(state.checkouts.iter().find(|c| c.id == id).and_then(|c| state.detail(c)))
    }

    async fn list_checkouts(&self, filter: &CheckoutFilter) -> Result<Vec<CheckoutDetail>> {
        let state = self.state.lock().await;
        let mut rows: Vec<CheckoutDetail> = state
            .checkouts
            .iter()
            .filter(|c| filter.matches(c))
            .filter_map(|c| state.detail(c))
            .collect();

        match filter.order {
            CheckoutOrder::NewestFirst => rows.sort_by(|a, b| b.checkout.checked_out_at.cmp(&a.checkout.checked_out_at)),
            CheckoutOrder::OldestFirst => rows.sort_by(|a, b| a.checkout.checked_out_at.cmp(&b.checkout.checked_out_at)),
        }
        Ok(rows)
    }

    async fn list_lost_found_events(
        &self,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<LostFoundEventDetail>> {
        let state = self.state.lock().await;
        let mut rows: Vec<LostFoundEventDetail> = state
            .lost_found_events
            .iter()
            .filter(|e| since.is_none_or(|s| e.event_timestamp >= s))
            .filter_map(|e| state.event_detail(e))
            .collect();
        rows.sort_by(|a, b| b.event.event_timestamp.cmp(&a.event.event_timestamp));
        if let Some(limit) = limit {
            rows.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(rows)
    }

    async fn recent_overdue_notification(
        &self,
        key: &OverdueDedupKey,
        since: DateTime<Utc>,
    ) -> Result<Option<NotificationLog>> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .iter()
            .filter(|n| key.matches(n, since))
            .max_by_key(|n| n.created_at)
            .cloned())
    }

    async fn notification(&self, id: Uuid) -> Result<Option<NotificationLog>> {
        Ok(self.state.lock().await.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn insert_notification(&self, new: NewNotification) -> Result<NotificationLog> {
        Ok(self.state.lock().await.push_notification(new))
    }

    async fn mark_notification_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        let log = state.notification_mut(id)?;
        log.status = NotificationStatus::Sent;
        log.sent_at = Some(at);
        Ok(())
    }

    async fn mark_notification_failed(&self, id: Uuid, error: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        let log = state.notification_mut(id)?;
        log.status = NotificationStatus::Failed;
        log.retry_count += 1;
        log.error_message = Some(error.to_string());
        log.failed_at = Some(at);
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_laptop(&mut self, unique_id: &str) -> Result<Option<Laptop>> {
        Ok(self.staged.live_laptop(unique_id).cloned())
    }

    async fn lock_user(&mut self, id: Uuid) -> Result<Option<User>> {
        Ok(self.staged.live_user(id).cloned())
    }

    async fn active_checkout_for_laptop(&mut self, laptop_id: Uuid) -> Result<Option<Checkout>> {
        Ok(self.staged.active_for_laptop(laptop_id).cloned())
    }

    async fn active_checkout_for_user(&mut self, user_id: Uuid) -> Result<Option<(Checkout, Laptop)>> {
        let Some(checkout) = self.staged.checkouts.iter().find(|c| c.user_id == user_id && c.is_active()) else {
            return Ok(None);
        };
        Ok(self
            .staged
            .laptops
            .get(&checkout.laptop_id)
            .map(|laptop| (checkout.clone(), laptop.clone())))
    }

    async fn insert_checkout(&mut self, laptop_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<Checkout> {
        // same guarantees as the partial unique indexes in Postgres
        if self.staged.active_for_laptop(laptop_id).is_some() {
            return Err(AppError::conflict(
                error_codes::VAL_LAPTOP_NOT_AVAILABLE,
                "Laptop already has an active checkout",
            ));
        }
        if self.staged.checkouts.iter().any(|c| c.user_id == user_id && c.is_active()) {
            return Err(AppError::conflict(
                error_codes::BIZ_USER_HAS_ACTIVE_CHECKOUT,
                "User already has an active checkout",
            ));
        }

        let checkout = Checkout {
            id: Uuid::new_v4(),
            laptop_id,
            user_id,
            checked_out_at: at,
            checked_in_at: None,
            status: CheckoutStatus::Active,
            created_at: at,
            updated_at: at,
        };
        self.staged.checkouts.push(checkout.clone());
        Ok(checkout)
    }

    async fn complete_checkout(&mut self, id: Uuid, at: DateTime<Utc>) -> Result<Checkout> {
        let checkout = self
            .staged
            .checkouts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::not_found(error_codes::NOT_FOUND_CHECKOUT, "Checkout not found"))?;
        checkout.status = CheckoutStatus::Completed;
        checkout.checked_in_at = Some(at);
        checkout.updated_at = at;
        Ok(checkout.clone())
    }

    async fn set_laptop_status(&mut self, laptop_id: Uuid, status: LaptopStatus, at: DateTime<Utc>) -> Result<Laptop> {
        let laptop = self
            .staged
            .laptops
            .get_mut(&laptop_id)
            .ok_or_else(|| AppError::not_found(error_codes::NOT_FOUND_LAPTOP, "Laptop not found"))?;
        laptop.status = status;
        laptop.updated_at = at;
        Ok(laptop.clone())
    }

    async fn insert_audit(&mut self, entry: NewAuditLog) -> Result<()> {
        self.staged.audit_logs.push(AuditLog {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            action: entry.action.as_str().to_string(),
            entity_type: NewAuditLog::ENTITY_TYPE.to_string(),
            entity_id: entry.laptop_id,
            details: Json(entry.details),
            created_at: entry.created_at,
        });
        Ok(())
    }

    async fn insert_notification(&mut self, new: NewNotification) -> Result<NotificationLog> {
        Ok(self.staged.push_notification(new))
    }

    async fn insert_lost_found_event(&mut self, new: NewLostFoundEvent) -> Result<LostFoundEvent> {
        let event = LostFoundEvent {
            id: Uuid::new_v4(),
            laptop_id: new.laptop_id,
            checkout_id: new.checkout_id,
            original_user_id: new.original_user_id,
            finder_user_id: new.finder_user_id,
            event_timestamp: new.event_timestamp,
            duration_minutes: new.duration_minutes,
        };
        self.staged.lost_found_events.push(event.clone());
        Ok(event)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn laptop(unique_id: &str) -> Laptop {
        let now = Utc::now();
        Laptop {
            id: Uuid::new_v4(),
            unique_id: unique_id.into(),
            serial_number: "SN-1".into(),
            make: "Lenovo".into(),
            model: "T14".into(),
            status: LaptopStatus::Available,
            qr_code_url: String::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        let l = laptop("LAP-00000000000000AA");
        store.insert_laptop(l.clone()).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.set_laptop_status(l.id, LaptopStatus::Retired, Utc::now()).await.unwrap();
        }

        let stored = store.laptop_by_unique_id(&l.unique_id).await.unwrap().unwrap();
        assert_eq!(stored.status, LaptopStatus::Available);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let l = laptop("LAP-00000000000000BB");
        store.insert_laptop(l.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.set_laptop_status(l.id, LaptopStatus::Maintenance, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.laptop_by_unique_id(&l.unique_id).await.unwrap().unwrap();
        assert_eq!(stored.status, LaptopStatus::Maintenance);
    }

    #[tokio::test]
    async fn second_active_checkout_for_laptop_is_rejected() {
        let store = MemoryStore::new();
        let l = laptop("LAP-00000000000000CC");
        store.insert_laptop(l.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_checkout(l.id, Uuid::new_v4(), Utc::now()).await.unwrap();
        let err = tx.insert_checkout(l.id, Uuid::new_v4(), Utc::now()).await.unwrap_err();
        assert_eq!(err.code(), error_codes::VAL_LAPTOP_NOT_AVAILABLE);
    }

    #[tokio::test]
    async fn soft_deleted_laptops_are_invisible() {
        let store = MemoryStore::new();
        let mut l = laptop("LAP-00000000000000DD");
        l.deleted_at = Some(Utc::now());
        store.insert_laptop(l.clone()).await;

        assert!(store.laptop_by_unique_id(&l.unique_id).await.unwrap().is_none());
        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_laptop(&l.unique_id).await.unwrap().is_none());
    }
}
