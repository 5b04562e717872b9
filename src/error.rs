use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Failure taxonomy shared by every route. Rendered as the uniform
/// `{error, message, cause}` envelope the frontend expects.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Permission(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Internal storage error")]
    Database(#[from] sqlx::Error),

    /// Sale persistence keeps the underlying cause in the envelope; the POS
    /// frontend shows it verbatim for walk-in troubleshooting.
    #[error("Error creating sale")]
    Sale(#[source] sqlx::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    cause: String,
}

impl ApiError {
    fn cause_text(&self) -> String {
        match self {
            ApiError::Sale(source) => source.to_string(),
            _ => "N/A".to_string(),
        }
    }

    fn public_message(&self) -> String {
        match self {
            // Storage details stay out of the envelope everywhere but POS.
            ApiError::Database(err) => {
                log::error!("storage error: {err}");
                "Internal storage error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Sale(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Permission(_) => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = self.public_message();
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: message.clone(),
            message,
            cause: self.cause_text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            ApiError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("Barber").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Permission("no".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn database_cause_is_suppressed_outside_pos() {
        let err = ApiError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.cause_text(), "N/A");
        assert_eq!(err.public_message(), "Internal storage error");
    }

    #[test]
    fn sale_error_surfaces_cause() {
        let err = ApiError::Sale(sqlx::Error::RowNotFound);
        assert_ne!(err.cause_text(), "N/A");
    }
}
