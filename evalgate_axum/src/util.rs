//! Utilities for generating HTTP responses on authentication failures
//!
//! Every response carries a JSON body of the form `{"detail": ...}`.

use axum_core::{body::Body, response::Response};
use http::{header, HeaderValue, StatusCode};

/// Build a `401 Unauthorized` response with the appropriate `www-authenticate`
/// header
///
/// The prepared response will have the form:
///
/// ```http
/// HTTP/1.1 401 Unauthorized
/// www-authenticate: Bearer error="invalid_token"
///
/// {"detail":"Unauthorized"}
/// ```
///
/// The reason a token was rejected is deliberately not disclosed.
pub fn unauthorized() -> Response {
    let mut resp = detail(StatusCode::UNAUTHORIZED, "Unauthorized");
    resp.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(r#"Bearer error="invalid_token""#),
    );
    resp
}

/// Build a `403 Forbidden` response with the appropriate `www-authenticate`
/// header
///
/// The description provided will be automatically escaped to make sure it
/// is header-friendly. `error_description` is omitted if `description` is
/// empty.
pub fn forbidden(description: &str) -> Response {
    let mut resp = detail(StatusCode::FORBIDDEN, description);
    resp.headers_mut()
        .insert(header::WWW_AUTHENTICATE, insufficient_role(description));
    resp
}

/// Build a response with the given status and a `{"detail": message}` body
pub fn detail(status: StatusCode, message: &str) -> Response {
    json(status, &serde_json::json!({ "detail": message }))
}

/// Build a response with the given status and JSON body
pub fn json(status: StatusCode, body: &serde_json::Value) -> Response {
    let mut resp = Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

fn insufficient_role(description: &str) -> HeaderValue {
    if description.is_empty() {
        return HeaderValue::from_static(r#"Bearer error="insufficient_scope""#);
    }

    HeaderValue::try_from(format!(
        r#"Bearer error="insufficient_scope" error_description="{}""#,
        description.escape_default()
    ))
    .unwrap_or_else(|_| HeaderValue::from_static(r#"Bearer error="insufficient_scope""#))
}
