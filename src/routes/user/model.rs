use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::jobs::email::invitation_body;
use crate::models::{NotificationLog, Role, User};
use crate::utils::{
    Validate, error_codes, hash_password,
    validation::{require_email, require_min_len, require_non_empty},
};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Option<Role>,
    pub group_name: Option<String>,
    pub team: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub group_name: Option<String>,
    pub team: Option<String>,
}

/// What a user may change about themselves.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub password: Option<String>,
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<()> {
        require_email("email", &self.email)?;
        require_min_len("password", &self.password, MIN_PASSWORD_LEN)?;
        require_non_empty("name", &self.name)
    }
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Result<()> {
        if let Some(email) = &self.email {
            require_email("email", email)?;
        }
        if let Some(password) = &self.password {
            require_min_len("password", password, MIN_PASSWORD_LEN)?;
        }
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        Ok(())
    }
}

impl Validate for UpdateProfileRequest {
    fn validate(&self) -> Result<()> {
        if let Some(password) = &self.password {
            require_min_len("password", password, MIN_PASSWORD_LEN)?;
        }
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        Ok(())
    }
}

fn hash(password: &str) -> Result<String> {
    hash_password(password).map_err(|e| AppError::internal(format!("hash password: {e}")))
}

fn email_taken(err: sqlx::Error) -> AppError {
    AppError::conflict_on_unique(err, error_codes::BIZ_EMAIL_ALREADY_EXISTS, "Email already exists")
}

fn user_not_found() -> AppError {
    AppError::not_found(error_codes::NOT_FOUND_USER, "User not found")
}

impl User {
    /// Inserts the user together with a pending invitation notification.
    pub async fn create(pool: &PgPool, req: CreateUserRequest, app_url: &str) -> Result<(Self, NotificationLog)> {
        let password_hash = hash(&req.password)?;
        let now = Utc::now();
        let mut tx = pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, name, role, group_name, team, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&req.email)
        .bind(password_hash)
        .bind(&req.name)
        .bind(req.role.unwrap_or(Role::Interviewer))
        .bind(&req.group_name)
        .bind(&req.team)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(email_taken)?;

        let invitation = sqlx::query_as::<_, NotificationLog>(
            r#"
            INSERT INTO notification_logs
                (id, notification_type, recipient_email, recipient_user_id, subject, body,
                 related_entity_type, related_entity_id, status, created_at)
            VALUES ($1, 'user_invitation', $2, $3, $4, $5, 'user', $3, 'pending', $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(user.id)
        .bind("Welcome to Laptop Checkout System")
        .bind(invitation_body(&user.name, &format!("{}/login", app_url.trim_end_matches('/'))))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!("Created user {} ({})", user.id, user.role);
        Ok((user, invitation))
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Self> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(user_not_found)
    }

    pub async fn update(pool: &PgPool, id: Uuid, req: UpdateUserRequest) -> Result<Self> {
        let password_hash = req.password.as_deref().map(hash).transpose()?;

        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash),
                name = COALESCE($4, name),
                role = COALESCE($5, role),
                group_name = COALESCE($6, group_name),
                team = COALESCE($7, team),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(req.email)
        .bind(password_hash)
        .bind(req.name)
        .bind(req.role)
        .bind(req.group_name)
        .bind(req.team)
        .fetch_optional(pool)
        .await
        .map_err(email_taken)?
        .ok_or_else(user_not_found)
    }

    pub async fn update_profile(pool: &PgPool, id: Uuid, req: UpdateProfileRequest) -> Result<Self> {
        Self::update(
            pool,
            id,
            UpdateUserRequest {
                name: req.name,
                password: req.password,
                ..Default::default()
            },
        )
        .await
    }

    /// Soft delete. Refused while the user holds a laptop.
    pub async fn soft_delete(pool: &PgPool, id: Uuid) -> Result<()> {
        let mut tx = pool.begin().await?;

        // same row lock a checkout takes, so neither can slip past the other
        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(user_not_found());
        }

        let holding: Option<String> = sqlx::query_scalar(
            r#"
            SELECT l.unique_id FROM checkouts c
            JOIN laptops l ON l.id = c.laptop_id
            WHERE c.user_id = $1 AND c.status = 'active'
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(unique_id) = holding {
            return Err(AppError::conflict(
                error_codes::BIZ_USER_HAS_ACTIVE_CHECKOUT,
                format!("Cannot delete user with active checkout of laptop {unique_id}"),
            ));
        }

        sqlx::query("UPDATE users SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Soft deleted user {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_checks_every_field() {
        let mut req = CreateUserRequest {
            email: "jane@example.com".into(),
            password: "long-enough".into(),
            name: "Jane".into(),
            role: None,
            group_name: None,
            team: None,
        };
        assert!(req.validate().is_ok());

        req.password = "short".into();
        assert!(req.validate().is_err());

        req.password = "long-enough".into();
        req.email = "jane".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn role_is_parsed_from_snake_case() {
        let req: UpdateUserRequest = serde_json::from_str(r#"{"role":"admin","groupName":"IT"}"#).unwrap();
        assert_eq!(req.role, Some(Role::Admin));
        assert_eq!(req.group_name.as_deref(), Some("IT"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn profile_update_rejects_blank_name() {
        let req = UpdateProfileRequest {
            name: Some("  ".into()),
            password: None,
        };
        assert!(req.validate().is_err());
    }
}
