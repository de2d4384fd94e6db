use axum::Json;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{HeaderMap, StatusCode, request::Parts};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::{ApiErrorBody, ApiErrorResponse};

/// Shared secret expected on protected routes.
#[derive(Clone)]
pub struct ClinicKey(pub Arc<str>);

fn matches(candidate: &str, expected: &str) -> bool {
    bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()))
}

/// Ensure the inbound request is authorized.
/// Accepts either:
/// - Header: `x-api-key: ...`
/// - Header: `Authorization: Bearer ...`
/// - Query string: `?key=...` (browser WebSocket clients cannot set headers)
pub fn ensure_authorized(
    headers: &HeaderMap,
    query: Option<&str>,
    expected: &str,
) -> Result<(), Response> {
    if let Some(hv) = headers.get("x-api-key").and_then(|v| v.to_str().ok())
        && matches(hv.trim(), expected)
    {
        return Ok(());
    }

    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        let auth = auth.trim();
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            && matches(token.trim(), expected)
        {
            return Ok(());
        }
    }

    if let Some(qs) = query {
        for (k, v) in url::form_urlencoded::parse(qs.as_bytes()) {
            if k == "key" && matches(&v, expected) {
                return Ok(());
            }
        }
    }

    let body = ApiErrorBody {
        code: "UNAUTHORIZED".to_string(),
        message: "invalid or missing key".to_string(),
    };
    Err((StatusCode::UNAUTHORIZED, Json(ApiErrorResponse { error: body })).into_response())
}

#[derive(Debug, Clone, Copy)]
pub struct RequireKeyAuth;

impl<S> FromRequestParts<S> for RequireKeyAuth
where
    ClinicKey: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ClinicKey(expected) = ClinicKey::from_ref(state);
        ensure_authorized(&parts.headers, parts.uri.query(), &expected)?;
        Ok(Self)
    }
}
