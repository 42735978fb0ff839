use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Authentication credentials were not provided")]
    Unauthorized,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Not a member of this group")]
    NotMember,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("Invalid {field}: {}", messages.join("; "))]
    InvalidField {
        field: &'static str,
        messages: Vec<String>,
    },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
    #[error("Fatal error: {0}")]
    Fatal(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Error::BadRequest(msg.into())
    }

    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidField {
            field,
            messages: vec![message.into()],
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Unauthorized | Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::NotMember => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) | Error::InvalidField { .. } => StatusCode::BAD_REQUEST,
            Error::Database(_) | Error::Session(_) | Error::Fatal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Whether the error is a unique constraint violation.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Error::InvalidField { field, messages } => {
                let mut body = serde_json::Map::new();
                body.insert(field.to_string(), json!(messages));
                serde_json::Value::Object(body)
            }
            Error::Database(_) | Error::Session(_) | Error::Fatal(_) => {
                error!("internal error: {}", self);
                json!({ "error": "Internal server error" })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::NotMember.status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::NotFound("Group").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::bad_request("Group is full").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Fatal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(Error::NotFound("Schedule").to_string(), "Schedule not found");
        assert_eq!(Error::NotMember.to_string(), "Not a member of this group");
    }
}
