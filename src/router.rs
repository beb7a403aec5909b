use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
};

use crate::{
    AppState,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit, require_admin},
    routes::{auth, checkout, dashboard, laptop, notification, user},
};

/// Routes that need no token.
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh-token", post(auth::refresh_token))
}

/// Routes open to any authenticated user.
fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(user::get_me).patch(user::update_me))
        .route("/laptops", get(laptop::list_laptops))
        .route("/laptops/unique/{unique_id}", get(laptop::get_laptop_by_unique_id))
        .route("/laptops/{id}", get(laptop::get_laptop))
        .route("/checkouts/checkout", post(checkout::checkout))
        .route("/checkouts/checkin", post(checkout::checkin))
        .route("/checkouts/report-lost", post(checkout::report_lost))
        .route("/checkouts/report-found", post(checkout::report_found))
        .route("/checkouts/active", get(checkout::active_checkouts))
        .route("/checkouts/history", get(checkout::checkout_history))
        .route("/checkouts/status/{laptop_unique_id}", get(checkout::checkout_status))
        .route("/checkouts/my-current", get(checkout::my_current_checkout))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(user::create_user).get(user::list_users))
        .route(
            "/users/{id}",
            get(user::get_user).patch(user::update_user).delete(user::delete_user),
        )
        .route("/laptops", post(laptop::create_laptop))
        .route("/laptops/{id}", patch(laptop::update_laptop).delete(laptop::delete_laptop))
        .route("/laptops/{id}/history", get(laptop::laptop_history))
        .route("/laptops/{id}/qr-code", get(laptop::laptop_qr_code))
        .route("/checkouts/overdue", get(checkout::overdue_checkouts))
        .route("/checkouts/lost-found-events", get(checkout::lost_found_events))
        .route("/notifications/history", get(notification::notification_history))
        .route("/notifications/stats", get(notification::notification_stats))
        .route("/notifications/check-overdue", post(notification::check_overdue))
        .route("/notifications/process-lost-found", post(notification::process_lost_found))
        .route("/notifications/retry-failed", post(notification::retry_failed))
        .route("/dashboard/summary", get(dashboard::summary))
        .route("/dashboard/active-checkouts", get(dashboard::active_checkouts))
        .route("/dashboard/overdue", get(dashboard::overdue))
        .route("/dashboard/lost-found", get(dashboard::lost_found))
        .route_layer(from_fn(require_admin))
}

/// The full API under `config.api_base_uri`. Failures from any layer, the rate limiter
/// included, leave through `log_errors` and carry the request path.
pub fn build(state: AppState, limiter: Option<Arc<RateLimiter>>) -> Router {
    let protected = user_routes()
        .merge(admin_routes())
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new().merge(public_routes()).merge(protected);
    let mut router = Router::new().nest(&state.config.api_base_uri, api);

    if let Some(limiter) = limiter {
        router = router.layer(from_fn_with_state(limiter, rate_limit));
    }

    router.layer(from_fn(log_errors)).with_state(state)
}
