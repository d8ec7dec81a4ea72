use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Character, CharacterId, CharacterRecord, UserId};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the bridge gateway handshake.
/// `sub` is the platform snowflake of the user the request acts for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub exp: usize,
}

// -- Roll / claim --

#[derive(Debug, Serialize, Deserialize)]
pub struct RollResponse {
    pub character: Character,
    pub site_url: String,
    pub next_roll_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub character: Character,
    pub site_url: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityRequest {
    pub author_id: UserId,
    #[serde(default)]
    pub author_bot: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub dropped: Option<CharacterRecord>,
}

// -- Ownership --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GiveRequest {
    pub to_user_id: UserId,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SetFavoriteRequest {
    pub character_id: CharacterId,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SetQuoteRequest {
    pub quote: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ListQuery {
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchQuery {
    pub id: Option<CharacterId>,
    pub name: Option<String>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_at: Option<DateTime<Utc>>,
}
