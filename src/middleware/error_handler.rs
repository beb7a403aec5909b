use axum::{
    Json,
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::error::{ErrorBody, ErrorEnvelope};

/// Stamps the request path onto failure envelopes and logs server errors.
pub async fn log_errors(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    let Some(body) = response.extensions().get::<ErrorBody>().cloned() else {
        if response.status().is_server_error() {
            error!("Server error occurred - Status: {}, {} {}", response.status(), method, path);
        }
        return response;
    };

    let status = response.status();
    if status.is_server_error() {
        error!(
            "Server error occurred - Status: {}, {} {}, Code: {}",
            status, method, path, body.code
        );
    }

    let body = ErrorBody {
        path: Some(path),
        ..body
    };
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let mut rebuilt = (status, Json(ErrorEnvelope::new(body.clone()))).into_response();
    for (name, value) in parts.headers.iter() {
        if !rebuilt.headers().contains_key(name) {
            rebuilt.headers_mut().insert(name.clone(), value.clone());
        }
    }
    rebuilt.extensions_mut().insert(body);
    rebuilt
}
