//! Laptop and checkout state transitions.
//!
//! Every mutating operation runs inside one datastore transaction that locks
//! the laptop row (and the user row where one is involved) before checking
//! preconditions. Notification jobs are submitted only after commit.

pub mod actions;
pub mod clock;
pub mod memory;
pub mod postgres;
pub mod store;

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::jobs::{EmailJob, TaskQueue};
use crate::models::{
    AuditAction, CheckoutDetail, Laptop, LaptopStatus, LostFoundEventDetail, NewAuditLog, NewLostFoundEvent,
    NewNotification, NotificationLog, NotificationType, UserSummary,
};
use crate::utils::error_codes;

pub use actions::{AvailableActions, available_actions, duration_minutes};
pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{CheckoutFilter, CheckoutOrder, Datastore, StoreTx};

pub const DEFAULT_OVERDUE_THRESHOLD_MINUTES: i64 = 1440;

/// Laptop as seen by a scanner: its current holder and what the requester may do.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStatusView {
    pub laptop: Laptop,
    pub checkout: Option<CheckoutDetail>,
    pub available_actions: AvailableActions,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportLostOutcome {
    pub message: String,
    pub laptop: Laptop,
}

pub struct AssetLifecycleManager {
    store: Arc<dyn Datastore>,
    tasks: Arc<dyn TaskQueue>,
    clock: Arc<dyn Clock>,
    admin_email: String,
}

impl AssetLifecycleManager {
    pub fn new(
        store: Arc<dyn Datastore>,
        tasks: Arc<dyn TaskQueue>,
        clock: Arc<dyn Clock>,
        admin_email: impl Into<String>,
    ) -> Self {
        Self {
            store,
            tasks,
            clock,
            admin_email: admin_email.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Datastore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn checkout(&self, laptop_unique_id: &str, user_id: Uuid) -> Result<CheckoutDetail> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let laptop = tx
            .lock_laptop(laptop_unique_id)
            .await?
            .ok_or_else(|| laptop_not_found(laptop_unique_id))?;

        if laptop.status != LaptopStatus::Available {
            return Err(AppError::invalid_state(
                error_codes::VAL_LAPTOP_NOT_AVAILABLE,
                format!(
                    "Laptop {} is not available for checkout. Current status: {}",
                    laptop.unique_id, laptop.status
                ),
            ));
        }

        let user = tx
            .lock_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(error_codes::NOT_FOUND_USER, "User not found"))?;

        if let Some((_, held)) = tx.active_checkout_for_user(user.id).await? {
            return Err(AppError::conflict(
                error_codes::BIZ_USER_HAS_ACTIVE_CHECKOUT,
                format!(
                    "User already has laptop {} checked out. Only one laptop per user is allowed.",
                    held.unique_id
                ),
            ));
        }

        let checkout = tx.insert_checkout(laptop.id, user.id, now).await?;
        let laptop = tx.set_laptop_status(laptop.id, LaptopStatus::CheckedOut, now).await?;
        tx.insert_audit(NewAuditLog {
            user_id: user.id,
            action: AuditAction::Checkout,
            laptop_id: laptop.id,
            details: json!({
                "laptopUniqueId": laptop.unique_id,
                "checkoutId": checkout.id,
                "userEmail": user.email,
            }),
            created_at: now,
        })
        .await?;
        tx.commit().await?;

        tracing::info!("Laptop {} checked out by user {}", laptop.unique_id, user.id);
        Ok(CheckoutDetail {
            checkout,
            laptop,
            user: UserSummary::from(&user),
        })
    }

    pub async fn checkin(&self, laptop_unique_id: &str, requesting_user_id: Uuid) -> Result<CheckoutDetail> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let laptop = tx
            .lock_laptop(laptop_unique_id)
            .await?
            .ok_or_else(|| laptop_not_found(laptop_unique_id))?;

        if laptop.status != LaptopStatus::CheckedOut {
            return Err(AppError::invalid_state(
                error_codes::VAL_LAPTOP_NOT_CHECKED_OUT,
                format!(
                    "Laptop {} is not currently checked out. Current status: {}",
                    laptop.unique_id, laptop.status
                ),
            ));
        }

        let active = tx
            .active_checkout_for_laptop(laptop.id)
            .await?
            .ok_or_else(|| no_active_checkout(&laptop))?;

        if active.user_id != requesting_user_id {
            return Err(AppError::forbidden(
                error_codes::PERM_UNAUTHORIZED_CHECKIN,
                "Only the user who checked out this laptop can check it in",
            ));
        }

        let holder = tx
            .lock_user(active.user_id)
            .await?
            .ok_or_else(|| AppError::not_found(error_codes::NOT_FOUND_USER, "User not found"))?;

        let checkout = tx.complete_checkout(active.id, now).await?;
        let laptop = tx.set_laptop_status(laptop.id, LaptopStatus::Available, now).await?;
        tx.insert_audit(NewAuditLog {
            user_id: requesting_user_id,
            action: AuditAction::Checkin,
            laptop_id: laptop.id,
            details: json!({
                "laptopUniqueId": laptop.unique_id,
                "checkoutId": checkout.id,
                "checkoutDurationMinutes": duration_minutes(active.checked_out_at, now),
            }),
            created_at: now,
        })
        .await?;
        tx.commit().await?;

        tracing::info!("Laptop {} checked in by user {}", laptop.unique_id, requesting_user_id);
        Ok(CheckoutDetail {
            checkout,
            laptop,
            user: UserSummary::from(&holder),
        })
    }

    /// Pulls the laptop out of circulation (`maintenance`) and alerts the admin.
    /// The checkout stays active until the laptop is reported found.
    pub async fn report_lost(&self, laptop_unique_id: &str, reporting_user_id: Uuid) -> Result<ReportLostOutcome> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let laptop = tx
            .lock_laptop(laptop_unique_id)
            .await?
            .ok_or_else(|| laptop_not_found(laptop_unique_id))?;

        let active = tx.active_checkout_for_laptop(laptop.id).await?.ok_or_else(|| {
            AppError::invalid_state(
                error_codes::VAL_LAPTOP_NOT_CHECKED_OUT,
                format!("Laptop {} is not currently checked out", laptop.unique_id),
            )
        })?;

        if active.user_id != reporting_user_id {
            return Err(AppError::forbidden(
                error_codes::PERM_UNAUTHORIZED_ACTION,
                "Only the user who checked out this laptop can report it lost",
            ));
        }

        let laptop = tx.set_laptop_status(laptop.id, LaptopStatus::Maintenance, now).await?;
        tx.insert_audit(NewAuditLog {
            user_id: reporting_user_id,
            action: AuditAction::ReportLost,
            laptop_id: laptop.id,
            details: json!({
                "laptopUniqueId": laptop.unique_id,
                "checkoutId": active.id,
            }),
            created_at: now,
        })
        .await?;
        let notification = tx
            .insert_notification(NewNotification {
                notification_type: NotificationType::LostFound,
                recipient_email: self.admin_email.clone(),
                recipient_user_id: None,
                subject: format!("Laptop Reported Lost: {}", laptop.unique_id),
                body: format!(
                    "Laptop {} ({} {}) has been reported lost by user {}",
                    laptop.unique_id, laptop.make, laptop.model, reporting_user_id
                ),
                related_entity_type: Some("laptop".to_string()),
                related_entity_id: Some(laptop.id),
                created_at: now,
            })
            .await?;
        tx.commit().await?;

        tracing::info!("Laptop {} reported lost by user {}", laptop.unique_id, reporting_user_id);
        self.dispatch(&[notification]).await;

        Ok(ReportLostOutcome {
            message: "Laptop reported as lost. Admin has been notified.".to_string(),
            laptop,
        })
    }

    /// Closes the open checkout of a lost laptop, records how long it was out,
    /// and notifies both the original holder and the finder.
    pub async fn report_found(&self, laptop_unique_id: &str, finder_user_id: Uuid) -> Result<LostFoundEventDetail> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let laptop = tx
            .lock_laptop(laptop_unique_id)
            .await?
            .ok_or_else(|| laptop_not_found(laptop_unique_id))?;

        let active = tx
            .active_checkout_for_laptop(laptop.id)
            .await?
            .ok_or_else(|| no_active_checkout(&laptop))?;

        let original = tx
            .lock_user(active.user_id)
            .await?
            .ok_or_else(|| AppError::not_found(error_codes::NOT_FOUND_USER, "Original user not found"))?;

        let finder = if finder_user_id == original.id {
            original.clone()
        } else {
            tx.lock_user(finder_user_id)
                .await?
                .ok_or_else(|| AppError::not_found(error_codes::NOT_FOUND_USER, "Finder user not found"))?
        };

        let minutes = duration_minutes(active.checked_out_at, now);
        let event = tx
            .insert_lost_found_event(NewLostFoundEvent {
                laptop_id: laptop.id,
                checkout_id: active.id,
                original_user_id: original.id,
                finder_user_id: finder.id,
                event_timestamp: now,
                duration_minutes: minutes,
            })
            .await?;
        tx.complete_checkout(active.id, now).await?;
        let laptop = tx.set_laptop_status(laptop.id, LaptopStatus::Available, now).await?;
        tx.insert_audit(NewAuditLog {
            user_id: finder.id,
            action: AuditAction::ReportFound,
            laptop_id: laptop.id,
            details: json!({
                "laptopUniqueId": laptop.unique_id,
                "checkoutId": active.id,
                "originalUserId": original.id,
                "finderUserId": finder.id,
                "durationMinutes": minutes,
            }),
            created_at: now,
        })
        .await?;

        let to_original = tx
            .insert_notification(NewNotification {
                notification_type: NotificationType::LostFound,
                recipient_email: original.email.clone(),
                recipient_user_id: Some(original.id),
                subject: "Your Lost Laptop Has Been Found".to_string(),
                body: format!(
                    "The laptop {} you checked out has been found and returned by {}.",
                    laptop.unique_id, finder.name
                ),
                related_entity_type: Some("laptop".to_string()),
                related_entity_id: Some(laptop.id),
                created_at: now,
            })
            .await?;
        let to_finder = tx
            .insert_notification(NewNotification {
                notification_type: NotificationType::LostFound,
                recipient_email: finder.email.clone(),
                recipient_user_id: Some(finder.id),
                subject: "Thank You for Returning Laptop".to_string(),
                body: format!(
                    "Thank you for returning laptop {}. The original user has been notified.",
                    laptop.unique_id
                ),
                related_entity_type: Some("laptop".to_string()),
                related_entity_id: Some(laptop.id),
                created_at: now,
            })
            .await?;
        tx.commit().await?;

        tracing::info!(
            "Laptop {} reported found by user {} after {} minutes",
            laptop.unique_id,
            finder.id,
            minutes
        );
        self.dispatch(&[to_original, to_finder]).await;

        Ok(LostFoundEventDetail {
            event,
            laptop,
            original_user: UserSummary::from(&original),
            finder_user: UserSummary::from(&finder),
        })
    }

    pub async fn active_checkouts(&self, user_id: Option<Uuid>) -> Result<Vec<CheckoutDetail>> {
        self.store
            .list_checkouts(&CheckoutFilter {
                user_id,
                active_only: true,
                ..Default::default()
            })
            .await
    }

    pub async fn checkout_history(&self, user_id: Option<Uuid>, laptop_id: Option<Uuid>) -> Result<Vec<CheckoutDetail>> {
        self.store
            .list_checkouts(&CheckoutFilter {
                user_id,
                laptop_id,
                ..Default::default()
            })
            .await
    }

    /// Active checkouts older than `threshold_minutes`, oldest first.
    pub async fn overdue_checkouts(&self, threshold_minutes: i64) -> Result<Vec<CheckoutDetail>> {
        let cutoff = self.clock.now() - Duration::minutes(threshold_minutes);
        self.store
            .list_checkouts(&CheckoutFilter {
                active_only: true,
                checked_out_before: Some(cutoff),
                order: CheckoutOrder::OldestFirst,
                ..Default::default()
            })
            .await
    }

    pub async fn lost_found_events(&self) -> Result<Vec<LostFoundEventDetail>> {
        self.store.list_lost_found_events(None, None).await
    }

    pub async fn checkout_status(&self, laptop_unique_id: &str, requesting_user_id: Uuid) -> Result<CheckoutStatusView> {
        let laptop = self
            .store
            .laptop_by_unique_id(laptop_unique_id)
            .await?
            .ok_or_else(|| laptop_not_found(laptop_unique_id))?;
        let checkout = self.store.active_checkout_for_laptop(laptop.id).await?;
        let available_actions =
            available_actions(laptop.status, checkout.as_ref().map(|c| &c.checkout), requesting_user_id);

        Ok(CheckoutStatusView {
            laptop,
            checkout,
            available_actions,
        })
    }

    /// The caller's active checkout, if any.
    pub async fn current_checkout(&self, user_id: Uuid) -> Result<Option<CheckoutDetail>> {
        Ok(self.active_checkouts(Some(user_id)).await?.into_iter().next())
    }

    /// Submits one delivery job per log. Failures are logged; the domain change already committed.
    async fn dispatch(&self, logs: &[NotificationLog]) {
        for log in logs {
            let job = EmailJob::SendNotification {
                notification_log_id: log.id,
            };
            if let Err(e) = self.tasks.submit(job).await {
                tracing::error!("Failed to enqueue notification {}: {}", log.id, e);
            }
        }
    }
}

fn laptop_not_found(unique_id: &str) -> AppError {
    AppError::not_found(error_codes::NOT_FOUND_LAPTOP, format!("Laptop {} not found", unique_id))
}

fn no_active_checkout(laptop: &Laptop) -> AppError {
    AppError::not_found(
        error_codes::NOT_FOUND_CHECKOUT,
        format!("No active checkout found for laptop {}", laptop.unique_id),
    )
}
