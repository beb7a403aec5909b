use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    models::{Role, User},
    utils::{error_codes, verify_access_token},
};

/// The authenticated caller, attached to request extensions by `auth_middleware`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::unauthorized(error_codes::AUTH_INVALID_TOKEN, "Missing bearer token"))?;

    let claims = verify_access_token(bearer.token(), &state.config)?;

    // soft-deleted users lose access even while their token is still valid
    let user = state.store.user_by_id(claims.sub).await?.ok_or_else(|| {
        AppError::unauthorized(error_codes::AUTH_USER_NOT_FOUND, "User not found or has been deleted")
    })?;

    req.extensions_mut().insert(CurrentUser::from(&user));
    Ok(next.run(req).await)
}

/// Must run inside `auth_middleware`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<CurrentUser>() {
        Some(user) if user.is_admin() => Ok(next.run(req).await),
        Some(user) => {
            tracing::info!("User {} denied admin route {}", user.id, req.uri().path());
            Err(AppError::forbidden(error_codes::PERM_ADMIN_REQUIRED, "Admin access required"))
        }
        None => Err(AppError::unauthorized(error_codes::AUTH_INVALID_TOKEN, "Authentication required")),
    }
}
