pub mod client;
pub mod error;
pub mod query;

use futures_util::future::BoxFuture;

use waifu_types::models::{CharacterId, CharacterRecord};

pub use client::Anilist;
pub use error::SourceError;

/// Lookup for a single character by ID or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacterQuery {
    Id(CharacterId),
    Name(String),
}

/// Where rolled and dropped characters come from.
pub trait CharacterSource: Send + Sync {
    /// A uniformly random character whose ID is not in `exclude`.
    fn random_character<'a>(
        &'a self,
        exclude: &'a [CharacterId],
    ) -> BoxFuture<'a, Result<CharacterRecord, SourceError>>;

    fn search<'a>(&'a self, query: &'a CharacterQuery) -> BoxFuture<'a, Result<CharacterRecord, SourceError>>;
}
