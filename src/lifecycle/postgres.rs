use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction, types::Json};
use uuid::Uuid;

use super::store::{CheckoutFilter, CheckoutOrder, Datastore, StoreTx};
use crate::error::{AppError, Result};
use crate::models::{
    Checkout, CheckoutDetail, CheckoutStatus, Laptop, LaptopStatus, LostFoundEvent, LostFoundEventDetail,
    NewAuditLog, NewLostFoundEvent, NewNotification, NotificationLog, OverdueDedupKey, Role, User, UserSummary,
};
use crate::utils::error_codes;

const CHECKOUT_DETAIL_SELECT: &str = r#"
    SELECT c.id, c.laptop_id, c.user_id, c.checked_out_at, c.checked_in_at, c.status,
           c.created_at, c.updated_at,
           l.unique_id AS l_unique_id, l.serial_number AS l_serial_number, l.make AS l_make,
           l.model AS l_model, l.status AS l_status, l.qr_code_url AS l_qr_code_url,
           l.created_at AS l_created_at, l.updated_at AS l_updated_at, l.deleted_at AS l_deleted_at,
           u.email AS u_email, u.name AS u_name, u.role AS u_role
    FROM checkouts c
    JOIN laptops l ON l.id = c.laptop_id
    JOIN users u ON u.id = c.user_id
"#;

const LOST_FOUND_DETAIL_SELECT: &str = r#"
    SELECT e.id, e.laptop_id, e.checkout_id, e.original_user_id, e.finder_user_id,
           e.event_timestamp, e.duration_minutes,
           l.unique_id AS l_unique_id, l.serial_number AS l_serial_number, l.make AS l_make,
           l.model AS l_model, l.status AS l_status, l.qr_code_url AS l_qr_code_url,
           l.created_at AS l_created_at, l.updated_at AS l_updated_at, l.deleted_at AS l_deleted_at,
           o.email AS o_email, o.name AS o_name, o.role AS o_role,
           f.email AS f_email, f.name AS f_name, f.role AS f_role
    FROM lost_found_events e
    JOIN laptops l ON l.id = e.laptop_id
    JOIN users o ON o.id = e.original_user_id
    JOIN users f ON f.id = e.finder_user_id
"#;

#[derive(FromRow)]
struct CheckoutDetailRow {
    id: Uuid,
    laptop_id: Uuid,
    user_id: Uuid,
    checked_out_at: DateTime<Utc>,
    checked_in_at: Option<DateTime<Utc>>,
    status: CheckoutStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    l_unique_id: String,
    l_serial_number: String,
    l_make: String,
    l_model: String,
    l_status: LaptopStatus,
    l_qr_code_url: String,
    l_created_at: DateTime<Utc>,
    l_updated_at: DateTime<Utc>,
    l_deleted_at: Option<DateTime<Utc>>,
    u_email: String,
    u_name: String,
    u_role: Role,
}

impl From<CheckoutDetailRow> for CheckoutDetail {
    fn from(row: CheckoutDetailRow) -> Self {
        CheckoutDetail {
            laptop: Laptop {
                id: row.laptop_id,
                unique_id: row.l_unique_id,
                serial_number: row.l_serial_number,
                make: row.l_make,
                model: row.l_model,
                status: row.l_status,
                qr_code_url: row.l_qr_code_url,
                created_at: row.l_created_at,
                updated_at: row.l_updated_at,
                deleted_at: row.l_deleted_at,
            },
            user: UserSummary {
                id: row.user_id,
                email: row.u_email,
                name: row.u_name,
                role: row.u_role,
            },
            checkout: Checkout {
                id: row.id,
                laptop_id: row.laptop_id,
                user_id: row.user_id,
                checked_out_at: row.checked_out_at,
                checked_in_at: row.checked_in_at,
                status: row.status,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        }
    }
}

#[derive(FromRow)]
struct LostFoundDetailRow {
    id: Uuid,
    laptop_id: Uuid,
    checkout_id: Uuid,
    original_user_id: Uuid,
    finder_user_id: Uuid,
    event_timestamp: DateTime<Utc>,
    duration_minutes: i64,
    l_unique_id: String,
    l_serial_number: String,
    l_make: String,
    l_model: String,
    l_status: LaptopStatus,
    l_qr_code_url: String,
    l_created_at: DateTime<Utc>,
    l_updated_at: DateTime<Utc>,
    l_deleted_at: Option<DateTime<Utc>>,
    o_email: String,
    o_name: String,
    o_role: Role,
    f_email: String,
    f_name: String,
    f_role: Role,
}

impl From<LostFoundDetailRow> for LostFoundEventDetail {
    fn from(row: LostFoundDetailRow) -> Self {
        LostFoundEventDetail {
            laptop: Laptop {
                id: row.laptop_id,
                unique_id: row.l_unique_id,
                serial_number: row.l_serial_number,
                make: row.l_make,
                model: row.l_model,
                status: row.l_status,
                qr_code_url: row.l_qr_code_url,
                created_at: row.l_created_at,
                updated_at: row.l_updated_at,
                deleted_at: row.l_deleted_at,
            },
            original_user: UserSummary {
                id: row.original_user_id,
                email: row.o_email,
                name: row.o_name,
                role: row.o_role,
            },
            finder_user: UserSummary {
                id: row.finder_user_id,
                email: row.f_email,
                name: row.f_name,
                role: row.f_role,
            },
            event: LostFoundEvent {
                id: row.id,
                laptop_id: row.laptop_id,
                checkout_id: row.checkout_id,
                original_user_id: row.original_user_id,
                finder_user_id: row.finder_user_id,
                event_timestamp: row.event_timestamp,
                duration_minutes: row.duration_minutes,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Datastore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE email = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn laptop_by_unique_id(&self, unique_id: &str) -> Result<Option<Laptop>> {
        let laptop = sqlx::query_as::<_, Laptop>(
            r#"
            SELECT * FROM laptops
            WHERE unique_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(unique_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(laptop)
    }

    async fn active_checkout_for_laptop(&self, laptop_id: Uuid) -> Result<Option<CheckoutDetail>> {
        let sql = format!("{CHECKOUT_DETAIL_SELECT} WHERE c.laptop_id = $1 AND c.status = 'active'");
        let row = sqlx::query_as::<_, CheckoutDetailRow>(&sql)
            .bind(laptop_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(CheckoutDetail::from))
    }

    async fn checkout_detail(&self, id: Uuid) -> Result<Option<CheckoutDetail>> {
        let sql = format!("{CHECKOUT_DETAIL_SELECT} WHERE c.id = $1");
        let row = sqlx::query_as::<_, CheckoutDetailRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(CheckoutDetail::from))
    }

    async fn list_checkouts(&self, filter: &CheckoutFilter) -> Result<Vec<CheckoutDetail>> {
        let direction = match filter.order {
            CheckoutOrder::NewestFirst => "DESC",
            CheckoutOrder::OldestFirst => "ASC",
        };
        let sql = format!(
            r#"{CHECKOUT_DETAIL_SELECT}
            WHERE ($1::uuid IS NULL OR c.user_id = $1)
              AND ($2::uuid IS NULL OR c.laptop_id = $2)
              AND (NOT $3 OR c.status = 'active')
              AND ($4::timestamptz IS NULL OR c.checked_out_at < $4)
            ORDER BY c.checked_out_at {direction}
            "#
        );

        let rows = sqlx::query_as::<_, CheckoutDetailRow>(&sql)
            .bind(filter.user_id)
            .bind(filter.laptop_id)
            .bind(filter.active_only)
            .bind(filter.checked_out_before)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(CheckoutDetail::from).collect())
    }

    async fn list_lost_found_events(
        &self,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<LostFoundEventDetail>> {
        let sql = format!(
            r#"{LOST_FOUND_DETAIL_SELECT}
            WHERE ($1::timestamptz IS NULL OR e.event_timestamp >= $1)
            ORDER BY e.event_timestamp DESC
            LIMIT $2
            "#
        );

        // LIMIT NULL means no limit
        let rows = sqlx::query_as::<_, LostFoundDetailRow>(&sql)
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(LostFoundEventDetail::from).collect())
    }

    async fn recent_overdue_notification(
        &self,
        key: &OverdueDedupKey,
        since: DateTime<Utc>,
    ) -> Result<Option<NotificationLog>> {
        let log = sqlx::query_as::<_, NotificationLog>(
            r#"
            SELECT * FROM notification_logs
            WHERE notification_type = 'overdue'
              AND recipient_user_id = $1
              AND related_entity_type = $2
              AND related_entity_id = $3
              AND created_at >= $4
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(key.recipient_user_id)
        .bind(OverdueDedupKey::ENTITY_TYPE)
        .bind(key.checkout_id)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        Ok(log)
    }

    async fn notification(&self, id: Uuid) -> Result<Option<NotificationLog>> {
        let log = sqlx::query_as::<_, NotificationLog>("SELECT * FROM notification_logs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(log)
    }

    async fn insert_notification(&self, new: NewNotification) -> Result<NotificationLog> {
        let log = insert_notification_query(new).fetch_one(&self.pool).await?;
        Ok(log)
    }

    async fn mark_notification_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE notification_logs
            SET status = 'sent', sent_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(error_codes::NOT_FOUND_NOTIFICATION, "Notification not found"));
        }
        Ok(())
    }

    async fn mark_notification_failed(&self, id: Uuid, error: &str, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE notification_logs
            SET status = 'failed', failed_at = $2, error_message = $3, retry_count = retry_count + 1
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(error_codes::NOT_FOUND_NOTIFICATION, "Notification not found"));
        }
        Ok(())
    }
}

fn insert_notification_query(
    new: NewNotification,
) -> sqlx::query::QueryAs<'static, Postgres, NotificationLog, sqlx::postgres::PgArguments> {
    sqlx::query_as::<_, NotificationLog>(
        r#"
        INSERT INTO notification_logs
            (id, notification_type, recipient_email, recipient_user_id, subject, body,
             related_entity_type, related_entity_id, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.notification_type)
    .bind(new.recipient_email)
    .bind(new.recipient_user_id)
    .bind(new.subject)
    .bind(new.body)
    .bind(new.related_entity_type)
    .bind(new.related_entity_id)
    .bind(new.created_at)
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_laptop(&mut self, unique_id: &str) -> Result<Option<Laptop>> {
        let laptop = sqlx::query_as::<_, Laptop>(
            r#"
            SELECT * FROM laptops
            WHERE unique_id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(unique_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(laptop)
    }

    async fn lock_user(&mut self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn active_checkout_for_laptop(&mut self, laptop_id: Uuid) -> Result<Option<Checkout>> {
        let checkout = sqlx::query_as::<_, Checkout>(
            "SELECT * FROM checkouts WHERE laptop_id = $1 AND status = 'active'",
        )
        .bind(laptop_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(checkout)
    }

    async fn active_checkout_for_user(&mut self, user_id: Uuid) -> Result<Option<(Checkout, Laptop)>> {
        let checkout = sqlx::query_as::<_, Checkout>(
            "SELECT * FROM checkouts WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(checkout) = checkout else {
            return Ok(None);
        };

        let laptop = sqlx::query_as::<_, Laptop>("SELECT * FROM laptops WHERE id = $1")
            .bind(checkout.laptop_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(Some((checkout, laptop)))
    }

    async fn insert_checkout(&mut self, laptop_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<Checkout> {
        let result = sqlx::query_as::<_, Checkout>(
            r#"
            INSERT INTO checkouts (id, laptop_id, user_id, checked_out_at, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'active', $4, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(laptop_id)
        .bind(user_id)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await;

        result.map_err(|err| {
            let per_laptop = matches!(
                &err,
                sqlx::Error::Database(db_err) if db_err.constraint() == Some("checkouts_one_active_per_laptop")
            );
            if per_laptop {
                AppError::conflict_on_unique(
                    err,
                    error_codes::VAL_LAPTOP_NOT_AVAILABLE,
                    "Laptop already has an active checkout",
                )
            } else {
                AppError::conflict_on_unique(
                    err,
                    error_codes::BIZ_USER_HAS_ACTIVE_CHECKOUT,
                    "User already has an active checkout",
                )
            }
        })
    }

    async fn complete_checkout(&mut self, id: Uuid, at: DateTime<Utc>) -> Result<Checkout> {
        let checkout = sqlx::query_as::<_, Checkout>(
            r#"
            UPDATE checkouts
            SET status = 'completed', checked_in_at = $2, updated_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await?;

        checkout.ok_or_else(|| AppError::not_found(error_codes::NOT_FOUND_CHECKOUT, "Checkout not found"))
    }

    async fn set_laptop_status(&mut self, laptop_id: Uuid, status: LaptopStatus, at: DateTime<Utc>) -> Result<Laptop> {
        let laptop = sqlx::query_as::<_, Laptop>(
            r#"
            UPDATE laptops
            SET status = $2, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(laptop_id)
        .bind(status)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await?;

        laptop.ok_or_else(|| AppError::not_found(error_codes::NOT_FOUND_LAPTOP, "Laptop not found"))
    }

    async fn insert_audit(&mut self, entry: NewAuditLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, user_id, action, entity_type, entity_id, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(NewAuditLog::ENTITY_TYPE)
        .bind(entry.laptop_id)
        .bind(Json(entry.details))
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_notification(&mut self, new: NewNotification) -> Result<NotificationLog> {
        let log = insert_notification_query(new).fetch_one(&mut *self.tx).await?;
        Ok(log)
    }

    async fn insert_lost_found_event(&mut self, new: NewLostFoundEvent) -> Result<LostFoundEvent> {
        let event = sqlx::query_as::<_, LostFoundEvent>(
            r#"
            INSERT INTO lost_found_events
                (id, laptop_id, checkout_id, original_user_id, finder_user_id, event_timestamp, duration_minutes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.laptop_id)
        .bind(new.checkout_id)
        .bind(new.original_user_id)
        .bind(new.finder_user_id)
        .bind(new.event_timestamp)
        .bind(new.duration_minutes)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(event)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
