use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::info;

use waifu_types::api::{Claims, GiveRequest, ListQuery, SetFavoriteRequest};
use waifu_types::events::GatewayEvent;
use waifu_types::models::{Character, CharacterId, UserId};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// GET /users/{user_id}/characters: everything the user owns, or the first
/// page of names starting with `prefix` for autocomplete.
pub async fn list(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Character>>, ApiError> {
    let characters = match query.prefix {
        Some(prefix) => blocking(&state, move |db| db.list_characters_with_prefix(user_id, &prefix)).await?,
        None => blocking(&state, move |db| db.list_characters(user_id)).await?,
    };

    Ok(Json(characters))
}

/// GET /users/{user_id}/characters/{character_id}: does this user own it?
pub async fn verify(
    State(state): State<AppState>,
    Path((user_id, character_id)): Path<(UserId, CharacterId)>,
) -> Result<Json<Character>, ApiError> {
    blocking(&state, move |db| db.get_character(user_id, character_id))
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// POST /characters/{character_id}/give
pub async fn give(
    State(state): State<AppState>,
    Path(character_id): Path<CharacterId>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GiveRequest>,
) -> Result<Json<Character>, ApiError> {
    let from = claims.sub;
    let to = req.to_user_id;
    if from == to {
        return Err(ApiError::BadRequest("cannot give a character to yourself".into()));
    }

    let character = blocking(&state, move |db| db.transfer_character(from, to, character_id)).await?;

    info!("User {} gave {} ({}) to {}", from, character.name, character.id, to);

    state.dropper.dispatcher().broadcast(GatewayEvent::CharacterGiven {
        from_user_id: from,
        to_user_id: to,
        character_id,
    });

    Ok(Json(character))
}

/// PUT /me/favorite
pub async fn set_favorite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetFavoriteRequest>,
) -> Result<StatusCode, ApiError> {
    let user_id = claims.sub;
    blocking(&state, move |db| db.set_favorite(user_id, req.character_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
