use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use waifu_types::api::{Claims, SetQuoteRequest};
use waifu_types::models::{Profile, UserId};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

const MAX_QUOTE_CHARS: usize = 1024;

/// GET /users/{user_id}/profile
pub async fn profile(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Profile>, ApiError> {
    let profile = blocking(&state, move |db| db.get_profile(user_id)).await?;
    Ok(Json(profile))
}

/// PUT /me/quote
pub async fn set_quote(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetQuoteRequest>,
) -> Result<StatusCode, ApiError> {
    if req.quote.chars().count() > MAX_QUOTE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "quote is limited to {} characters",
            MAX_QUOTE_CHARS
        )));
    }

    let user_id = claims.sub;
    blocking(&state, move |db| db.set_quote(user_id, &req.quote)).await?;
    Ok(StatusCode::NO_CONTENT)
}
