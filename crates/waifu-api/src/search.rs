use axum::{
    Json,
    extract::{Query, State},
};

use waifu_anilist::{CharacterQuery, SourceError};
use waifu_types::api::SearchQuery;
use waifu_types::models::CharacterRecord;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /characters/search?id=|name=: look a character up at the source.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<CharacterRecord>, ApiError> {
    let query = match (query.id, query.name) {
        (Some(id), _) => CharacterQuery::Id(id),
        (None, Some(name)) if !name.trim().is_empty() => CharacterQuery::Name(name.trim().to_string()),
        _ => return Err(ApiError::BadRequest("expected an id or a name".into())),
    };

    match state.source.search(&query).await {
        Ok(record) => Ok(Json(record)),
        Err(SourceError::Empty) => Err(ApiError::NotFound),
        Err(e) => Err(e.into()),
    }
}
