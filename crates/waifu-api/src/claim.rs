use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::Utc;
use tracing::{debug, info, warn};

use waifu_db::models::NewCharacter;
use waifu_types::api::{ActivityRequest, ActivityResponse, ClaimResponse, Claims};
use waifu_types::events::GatewayEvent;
use waifu_types::models::{Acquisition, ChannelId};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// POST /channels/{channel_id}/claim: take the channel's pending drop.
///
/// The drop is removed atomically before it is persisted; if persisting
/// fails it is put back unless a newer drop replaced it in the meantime.
pub async fn claim(
    State(state): State<AppState>,
    Path(channel_id): Path<ChannelId>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let user_id = claims.sub;
    let pending = state.dropper.claim(channel_id).ok_or(ApiError::NoPendingDrop)?;

    let new = NewCharacter::from_record(&pending.character, Acquisition::Claim, Utc::now());
    let character = match blocking(&state, move |db| db.put_character(user_id, &new)).await {
        Ok(character) => character,
        Err(e) => {
            warn!("Claim of {} by {} in channel {} failed: {}", pending.character.id, user_id, channel_id, e);
            state.dropper.restore(pending);
            return Err(e);
        }
    };

    info!("User {} claimed {} ({}) in channel {}", user_id, character.name, character.id, channel_id);

    state.dropper.dispatcher().broadcast(GatewayEvent::DropClaimed {
        channel_id,
        user_id,
        character: character.clone(),
    });

    Ok(Json(ClaimResponse {
        character,
        site_url: pending.character.site_url,
    }))
}

/// POST /channels/{channel_id}/activity: one chat message seen by the bridge.
pub async fn activity(
    State(state): State<AppState>,
    Path(channel_id): Path<ChannelId>,
    Json(req): Json<ActivityRequest>,
) -> Result<Json<ActivityResponse>, ApiError> {
    debug!("Activity in channel {} by {}", channel_id, req.author_id);
    let dropped = state
        .dropper
        .on_message(channel_id, req.author_bot)
        .await?
        .map(|drop| drop.character);

    Ok(Json(ActivityResponse { dropped }))
}
