use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::{messages, BootstrapError, GatewayError, LedgerError};
use serde_json::{Map, Value};
use thiserror::Error;

/// Startup failures. The process exits instead of serving.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::Gateway(err.into())
    }
}

fn body(message: String, context: Map<String, Value>) -> Json<Value> {
    let mut object = context;
    object.insert("message".to_string(), Value::String(message));
    Json(Value::Object(object))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Http { status, message } => {
                return (status, body(message, Map::new())).into_response();
            }
            ApiError::Gateway(err) => err,
        };

        match err {
            GatewayError::Validation(message) => {
                (StatusCode::BAD_REQUEST, body(message, Map::new())).into_response()
            }
            GatewayError::Authorization(message) => {
                (StatusCode::FORBIDDEN, body(message, Map::new())).into_response()
            }
            GatewayError::Conflict { message, context } => {
                (StatusCode::FORBIDDEN, body(message, context)).into_response()
            }
            GatewayError::NotFound(message) => {
                (StatusCode::NOT_FOUND, body(message, Map::new())).into_response()
            }
            GatewayError::Ledger(detail) => {
                tracing::error!(%detail, "ledger interaction failed");
                let message = if detail.is_empty() {
                    messages::INTERNAL_ERROR.to_string()
                } else {
                    detail
                };
                (StatusCode::INTERNAL_SERVER_ERROR, body(message, Map::new())).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn gateway_errors_map_to_status_codes() {
        let cases = [
            (GatewayError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                GatewayError::Authorization("no".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (GatewayError::conflict("dup"), StatusCode::FORBIDDEN),
            (GatewayError::not_found("gone"), StatusCode::NOT_FOUND),
            (
                GatewayError::Ledger("node down".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let message = err.to_string();
            let (status, body) = render(err.into()).await;
            assert_eq!(status, expected);
            assert!(message.contains(body["message"].as_str().unwrap()));
        }
    }

    #[tokio::test]
    async fn conflict_context_is_merged_into_body() {
        let err = GatewayError::conflict(messages::HASH_ALREADY_STAMPED)
            .with_context("blockNumber", 12)
            .with_context("signer", "0xabc");
        let (status, body) = render(err.into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], messages::HASH_ALREADY_STAMPED);
        assert_eq!(body["blockNumber"], 12);
        assert_eq!(body["signer"], "0xabc");
    }

    #[tokio::test]
    async fn http_errors_keep_their_status() {
        let (status, body) = render(ApiError::bad_request("Invalid message mimetype: 'text/plain'")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid message mimetype: 'text/plain'");
    }
}
