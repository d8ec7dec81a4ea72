use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::error;

use waifu_anilist::SourceError;
use waifu_db::StoreError;
use waifu_types::api::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("you don't own that character")]
    NotOwned,

    #[error("that user already owns this character")]
    AlreadyOwned,

    #[error("there is nothing to claim in this channel")]
    NoPendingDrop,

    #[error("you can roll again at {available_at}")]
    CooldownActive { available_at: DateTime<Utc> },

    #[error("a roll is already in progress")]
    RollInProgress,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("storage failure: {0}")]
    Storage(StoreError),

    #[error("character source failure: {0}")]
    Upstream(#[from] SourceError),

    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NotOwned => "not_owned",
            Self::AlreadyOwned => "already_owned",
            Self::NoPendingDrop => "no_pending_drop",
            Self::CooldownActive { .. } => "cooldown_active",
            Self::RollInProgress => "roll_in_progress",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Storage(_) => "storage_failure",
            Self::Upstream(_) => "upstream_failure",
            Self::Internal => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound | Self::NoPendingDrop => StatusCode::NOT_FOUND,
            Self::NotOwned => StatusCode::FORBIDDEN,
            Self::AlreadyOwned | Self::RollInProgress => StatusCode::CONFLICT,
            Self::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Storage(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            StoreError::NotOwned => Self::NotOwned,
            StoreError::AlreadyOwned => Self::AlreadyOwned,
            e => Self::Storage(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }

        let available_at = match &self {
            Self::CooldownActive { available_at } => Some(*available_at),
            _ => None,
        };

        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
            available_at,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_meaning() {
        assert!(matches!(ApiError::from(StoreError::NotOwned), ApiError::NotOwned));
        assert!(matches!(ApiError::from(StoreError::LockPoisoned), ApiError::Storage(_)));
        assert_eq!(ApiError::from(StoreError::NotFound).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn expected_outcomes_are_not_server_errors() {
        let cooldown = ApiError::CooldownActive { available_at: Utc::now() };
        assert_eq!(cooldown.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(!ApiError::NoPendingDrop.status().is_server_error());
        assert_eq!(ApiError::Upstream(SourceError::Empty).status(), StatusCode::BAD_GATEWAY);
    }
}
