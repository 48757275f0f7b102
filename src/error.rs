use warp::http::StatusCode;

/// Failures surfaced by the signup workflow.
///
/// Gate failures map to `Unauthorized`/`Forbidden`; lifecycle rules produce
/// `NotFound`/`Conflict`/`Validation` before any write happens. Everything
/// else (storage, IO, upstream HTTP) is folded into `Internal`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-checkable kind, included in every error body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Validation(_) => "validation",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_status() {
        assert_eq!(
            AppError::Unauthorized("x".to_owned()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("x".to_owned()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::NotFound("x".to_owned()).kind(), "not_found");
        assert_eq!(
            AppError::Conflict("x".to_owned()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Validation("x".to_owned()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
