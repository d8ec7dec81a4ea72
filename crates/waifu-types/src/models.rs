use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform-assigned user snowflake.
pub type UserId = u64;

/// Platform-assigned channel snowflake.
pub type ChannelId = u64;

/// Character ID as assigned by the character source.
pub type CharacterId = i64;

/// A character definition as returned by the character source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: CharacterId,
    pub name: String,
    pub image: String,
    pub site_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_title: Option<String>,
}

/// How an owned character instance was first acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Acquisition {
    Roll,
    Claim,
}

impl Acquisition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Roll => "ROLL",
            Self::Claim => "CLAIM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ROLL" => Some(Self::Roll),
            "CLAIM" => Some(Self::Claim),
            _ => None,
        }
    }
}

/// A character instance attributed to one owning user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub user_id: UserId,
    pub name: String,
    pub image: String,
    #[serde(rename = "type")]
    pub kind: Acquisition,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub last_roll: Option<DateTime<Utc>>,
    pub quote: String,
    pub favorite: Option<CharacterId>,
}

/// User fields plus aggregate data shown by the profile command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user: User,
    pub character_count: u64,
    pub favorite: Option<Character>,
}

/// A character waiting in a channel for someone to claim it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDrop {
    pub channel_id: ChannelId,
    pub character: CharacterRecord,
    pub dropped_at: DateTime<Utc>,
}
