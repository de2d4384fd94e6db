use crate::social::provider::Provider;
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum VetdeskError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("{provider} {stage} failed ({status}): {code} - {description}")]
    Provider {
        provider: Provider,
        stage: &'static str,
        status: u16,
        code: String,
        description: String,
    },

    #[error("{0} is not configured")]
    ProviderNotConfigured(Provider),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("OAuth flow error: {0}")]
    OauthFlow(String),

    #[error("Too many messages; slow down")]
    RateLimited,

    #[error("Ractor error: {0}")]
    RactorError(String),
}

impl VetdeskError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        VetdeskError::NotFound { entity, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        VetdeskError::Validation(msg.into())
    }

    /// Whether a failed outbound call is worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            VetdeskError::Reqwest(e) => e.is_connect() || e.is_timeout(),
            VetdeskError::Provider { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<figment::Error> for VetdeskError {
    fn from(e: figment::Error) -> Self {
        VetdeskError::Config(Box::new(e))
    }
}

impl IntoResponse for VetdeskError {
    fn into_response(self) -> axum::response::Response {
        let message = self.to_string();
        let (status, code) = match &self {
            VetdeskError::NotFound { .. } | VetdeskError::UnknownProvider(_) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND".to_string())
            }
            VetdeskError::Validation(_) | VetdeskError::InsufficientStock { .. } => {
                (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT".to_string())
            }
            VetdeskError::OauthFlow(_) => (StatusCode::BAD_REQUEST, "OAUTH_FLOW".to_string()),
            VetdeskError::Provider { code, .. } => (StatusCode::BAD_GATEWAY, code.clone()),
            VetdeskError::ProviderNotConfigured(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONFIGURED".to_string())
            }
            VetdeskError::RateLimited => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT".to_string())
            }
            VetdeskError::Reqwest(_) | VetdeskError::UrlParse(_) => {
                (StatusCode::BAD_GATEWAY, "BAD_GATEWAY".to_string())
            }
            VetdeskError::Json(_)
            | VetdeskError::Io(_)
            | VetdeskError::Config(_)
            | VetdeskError::Database(_)
            | VetdeskError::RactorError(_) => {
                tracing::error!(error = %self, "internal error");
                let body = ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                };
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiErrorResponse { error: body }),
                )
                    .into_response();
            }
        };
        let body = ApiErrorBody { code, message };
        (status, Json(ApiErrorResponse { error: body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
