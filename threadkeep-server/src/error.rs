use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use threadkeep_social::twitter::ProviderError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("API key sync is not configured on this server")]
    SyncDisabled,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SyncDisabled => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Provider(err) => provider_status(err),
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Upstream failures surface as 502 unless the client can act on them.
fn provider_status(err: &ProviderError) -> StatusCode {
    match err {
        ProviderError::NotFound(_) => StatusCode::NOT_FOUND,
        ProviderError::TooManyIds(_) => StatusCode::BAD_REQUEST,
        ProviderError::Provider(_) => StatusCode::BAD_GATEWAY,
        ProviderError::Http(http) => match http.status().map(|s| s.as_u16()) {
            Some(401 | 403) => StatusCode::UNAUTHORIZED,
            Some(404) => StatusCode::NOT_FOUND,
            Some(429) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::BAD_GATEWAY,
        },
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "server.request.failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "server.request.rejected");
        }

        // internal details stay in the log
        let message = match &self {
            AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadkeep_http::HttpError;

    fn upstream(code: u16) -> AppError {
        AppError::Provider(ProviderError::Http(HttpError::Api {
            status: code.try_into().unwrap(),
            message: "nope".into(),
            request_id: "r".into(),
        }))
    }

    #[test]
    fn maps_upstream_statuses() {
        assert_eq!(upstream(401).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(upstream(403).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(upstream(404).status(), StatusCode::NOT_FOUND);
        assert_eq!(upstream(429).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(upstream(500).status(), StatusCode::BAD_GATEWAY);
        let network = AppError::Provider(ProviderError::Http(HttpError::Network("reset".into())));
        assert_eq!(network.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn internal_errors_hide_details() {
        let resp = AppError::Internal(anyhow::anyhow!("db path /secret")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
