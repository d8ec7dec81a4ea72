use chrono::{DateTime, Utc};
use rusqlite::ToSql;

use waifu_types::models::{Acquisition, CharacterId, CharacterRecord};

/// Insert parameters for a new owned character row.
#[derive(Debug, Clone)]
pub struct NewCharacter {
    pub id: CharacterId,
    pub name: String,
    pub image: String,
    pub kind: Acquisition,
    pub acquired_at: DateTime<Utc>,
}

impl NewCharacter {
    pub fn from_record(record: &CharacterRecord, kind: Acquisition, acquired_at: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            image: record.image.clone(),
            kind,
            acquired_at,
        }
    }
}

/// One `SET` clause of a partial user update. Clauses compose; columns not
/// named by any clause are left untouched.
#[derive(Debug, Clone)]
pub enum UserUpdate {
    LastRoll(DateTime<Utc>),
    Quote(String),
    Favorite(Option<CharacterId>),
}

impl UserUpdate {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::LastRoll(_) => "last_roll",
            Self::Quote(_) => "quote",
            Self::Favorite(_) => "favorite",
        }
    }

    pub(crate) fn value(&self) -> &dyn ToSql {
        match self {
            Self::LastRoll(date) => date,
            Self::Quote(quote) => quote,
            Self::Favorite(id) => id,
        }
    }
}
