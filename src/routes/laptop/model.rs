use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{CheckoutDetail, Laptop, LaptopStatus};
use crate::utils::{Validate, error_codes, generate_laptop_unique_id, qr, validation::require_non_empty};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLaptopRequest {
    pub serial_number: String,
    pub make: String,
    pub model: String,
    pub status: Option<LaptopStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLaptopRequest {
    pub serial_number: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub status: Option<LaptopStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLaptopsQuery {
    #[serde(default)]
    pub include_retired: bool,
}

#[derive(Debug, Serialize)]
pub struct LaptopHistory {
    pub laptop: Laptop,
    pub checkouts: Vec<CheckoutDetail>,
}

impl Validate for CreateLaptopRequest {
    fn validate(&self) -> Result<()> {
        require_non_empty("serialNumber", &self.serial_number)?;
        require_non_empty("make", &self.make)?;
        require_non_empty("model", &self.model)?;
        // checked_out is only ever entered through a checkout
        if self.status == Some(LaptopStatus::CheckedOut) {
            return Err(AppError::validation("status cannot be set to checked_out directly"));
        }
        Ok(())
    }
}

impl Validate for UpdateLaptopRequest {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("serialNumber", &self.serial_number),
            ("make", &self.make),
            ("model", &self.model),
        ] {
            if let Some(value) = value {
                require_non_empty(field, value)?;
            }
        }
        if self.status == Some(LaptopStatus::CheckedOut) {
            return Err(AppError::validation("status cannot be set to checked_out directly"));
        }
        Ok(())
    }
}

fn laptop_not_found() -> AppError {
    AppError::not_found(error_codes::NOT_FOUND_LAPTOP, "Laptop not found")
}

impl Laptop {
    pub async fn create(pool: &PgPool, req: CreateLaptopRequest, app_url: &str) -> Result<Self> {
        let unique_id = generate_laptop_unique_id();
        let qr_code_url = qr::encode_data_url(&qr::scan_url(app_url, &unique_id))?;

        let laptop = sqlx::query_as::<_, Laptop>(
            r#"
            INSERT INTO laptops (id, unique_id, serial_number, make, model, status, qr_code_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&unique_id)
        .bind(&req.serial_number)
        .bind(&req.make)
        .bind(&req.model)
        .bind(req.status.unwrap_or(LaptopStatus::Available))
        .bind(qr_code_url)
        .fetch_one(pool)
        .await?;

        tracing::info!("Created laptop {} ({} {})", laptop.unique_id, laptop.make, laptop.model);
        Ok(laptop)
    }

    pub async fn list(pool: &PgPool, include_retired: bool) -> Result<Vec<Self>> {
        let laptops = sqlx::query_as::<_, Laptop>(
            r#"
            SELECT * FROM laptops
            WHERE deleted_at IS NULL AND ($1 OR status <> 'retired')
            ORDER BY created_at DESC
            "#,
        )
        .bind(include_retired)
        .fetch_all(pool)
        .await?;

        Ok(laptops)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Self> {
        sqlx::query_as::<_, Laptop>("SELECT * FROM laptops WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(laptop_not_found)
    }

    /// `unique_id` and the QR code are never rewritten.
    pub async fn update(pool: &PgPool, id: Uuid, req: UpdateLaptopRequest) -> Result<Self> {
        let mut tx = pool.begin().await?;

        let current = sqlx::query_as::<_, Laptop>(
            "SELECT * FROM laptops WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(laptop_not_found)?;

        if req.status.is_some() && has_active_checkout(&mut tx, id).await? {
            return Err(AppError::invalid_state(
                error_codes::VAL_LAPTOP_NOT_AVAILABLE,
                format!(
                    "Laptop {} has an active checkout; check it in or report it found before changing its status",
                    current.unique_id
                ),
            ));
        }

        let laptop = sqlx::query_as::<_, Laptop>(
            r#"
            UPDATE laptops
            SET serial_number = COALESCE($2, serial_number),
                make = COALESCE($3, make),
                model = COALESCE($4, model),
                status = COALESCE($5, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(req.serial_number)
        .bind(req.make)
        .bind(req.model)
        .bind(req.status)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(laptop)
    }

    /// Soft delete. A laptop with an active checkout, lost ones included, has to be resolved first.
    pub async fn soft_delete(pool: &PgPool, id: Uuid) -> Result<()> {
        let mut tx = pool.begin().await?;

        let laptop = sqlx::query_as::<_, Laptop>(
            "SELECT * FROM laptops WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(laptop_not_found)?;

        if has_active_checkout(&mut tx, id).await? {
            return Err(AppError::invalid_state(
                error_codes::VAL_LAPTOP_NOT_AVAILABLE,
                format!("Cannot delete laptop {} while it has an active checkout", laptop.unique_id),
            ));
        }

        sqlx::query("UPDATE laptops SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Soft deleted laptop {}", laptop.unique_id);
        Ok(())
    }
}

/// Lost laptops stay in `maintenance` while their checkout is still active.
async fn has_active_checkout(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, laptop_id: Uuid) -> Result<bool> {
    let active: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM checkouts WHERE laptop_id = $1 AND status = 'active' FOR UPDATE")
            .bind(laptop_id)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(active.is_some())
}
