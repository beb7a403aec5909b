use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Overdue,
    LostFound,
    UserInvitation,
    PasswordReset,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Overdue => "overdue",
            NotificationType::LostFound => "lost_found",
            NotificationType::UserInvitation => "user_invitation",
            NotificationType::PasswordReset => "password_reset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Bounced,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLog {
    pub id: Uuid,
    pub notification_type: NotificationType,
    pub recipient_email: String,
    pub recipient_user_id: Option<Uuid>,
    pub subject: String,
    pub body: String,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<Uuid>,
    pub status: NotificationStatus,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub notification_type: NotificationType,
    pub recipient_email: String,
    pub recipient_user_id: Option<Uuid>,
    pub subject: String,
    pub body: String,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Identifies overdue reminders already sent for a checkout:
/// (type=overdue, recipientUserId, relatedEntityType=checkout, relatedEntityId).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverdueDedupKey {
    pub recipient_user_id: Uuid,
    pub checkout_id: Uuid,
}

impl OverdueDedupKey {
    pub const ENTITY_TYPE: &'static str = "checkout";

    pub fn matches(&self, log: &NotificationLog, since: DateTime<Utc>) -> bool {
        log.notification_type == NotificationType::Overdue
            && log.recipient_user_id == Some(self.recipient_user_id)
            && log.related_entity_type.as_deref() == Some(Self::ENTITY_TYPE)
            && log.related_entity_id == Some(self.checkout_id)
            && log.created_at >= since
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn overdue_log(user: Uuid, checkout: Uuid, created_at: DateTime<Utc>) -> NotificationLog {
        NotificationLog {
            id: Uuid::new_v4(),
            notification_type: NotificationType::Overdue,
            recipient_email: "holder@example.com".into(),
            recipient_user_id: Some(user),
            subject: "Reminder".into(),
            body: "overdue".into(),
            related_entity_type: Some("checkout".into()),
            related_entity_id: Some(checkout),
            status: NotificationStatus::Sent,
            retry_count: 0,
            error_message: None,
            sent_at: Some(created_at),
            failed_at: None,
            created_at,
        }
    }

    #[test]
    fn dedup_key_requires_every_component() {
        let now = Utc::now();
        let since = now - Duration::hours(24);
        let (user, checkout) = (Uuid::new_v4(), Uuid::new_v4());
        let key = OverdueDedupKey { recipient_user_id: user, checkout_id: checkout };

        assert!(key.matches(&overdue_log(user, checkout, now), since));
        assert!(!key.matches(&overdue_log(user, checkout, since - Duration::seconds(1)), since));
        assert!(!key.matches(&overdue_log(Uuid::new_v4(), checkout, now), since));
        assert!(!key.matches(&overdue_log(user, Uuid::new_v4(), now), since));

        let mut lost_found = overdue_log(user, checkout, now);
        lost_found.notification_type = NotificationType::LostFound;
        assert!(!key.matches(&lost_found, since));

        let mut wrong_entity = overdue_log(user, checkout, now);
        wrong_entity.related_entity_type = Some("laptop".into());
        assert!(!key.matches(&wrong_entity, since));
    }
}
