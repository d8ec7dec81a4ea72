use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use waifu_types::models::{CharacterId, CharacterRecord};

use crate::query::{GraphQlRequest, GraphQlResponse, PageData, RANDOM_CHARACTER, SEARCH_CHARACTER, SearchData};
use crate::{CharacterQuery, CharacterSource, SourceError};

pub const DEFAULT_URL: &str = "https://graphql.anilist.co";

/// Number of characters the random page is drawn from.
pub const DEFAULT_MAX_CHARACTERS: u32 = 100_000;

/// AniList GraphQL client.
#[derive(Clone)]
pub struct Anilist {
    http: reqwest::Client,
    url: String,
    max_characters: u32,
}

impl Anilist {
    pub fn new(url: impl Into<String>, max_characters: u32, timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            max_characters: max_characters.max(1),
        })
    }

    async fn run<T: DeserializeOwned>(&self, query: &str, variables: serde_json::Value) -> Result<T, SourceError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await?;

        let status = resp.status();
        let body: GraphQlResponse<T> = match resp.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => return Err(SourceError::Status(status.as_u16())),
            Err(e) => return Err(e.into()),
        };

        match body.data {
            Some(data) => Ok(data),
            None => {
                let message = body
                    .errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!("AniList query failed ({}): {}", status, message);
                Err(SourceError::GraphQl(message))
            }
        }
    }

    async fn fetch_random(&self, exclude: &[CharacterId]) -> Result<CharacterRecord, SourceError> {
        let page = rand::rng().random_range(1..=self.max_characters);
        debug!("Fetching random character page {} ({} excluded)", page, exclude.len());

        let mut variables = json!({ "page": page });
        if !exclude.is_empty() {
            variables["not_in"] = json!(exclude);
        }

        let data: PageData = self.run(RANDOM_CHARACTER, variables).await?;
        data.page
            .characters
            .into_iter()
            .next()
            .map(CharacterRecord::from)
            .ok_or(SourceError::Empty)
    }

    async fn fetch_search(&self, query: &CharacterQuery) -> Result<CharacterRecord, SourceError> {
        let variables = match query {
            CharacterQuery::Id(id) => json!({ "id": id }),
            CharacterQuery::Name(name) => json!({ "name": name }),
        };

        let data: SearchData = match self.run(SEARCH_CHARACTER, variables).await {
            // AniList answers an unmatched search with a 404 error and null data.
            Err(SourceError::GraphQl(_)) => return Err(SourceError::Empty),
            other => other?,
        };

        data.character.map(CharacterRecord::from).ok_or(SourceError::Empty)
    }
}

impl CharacterSource for Anilist {
    fn random_character<'a>(
        &'a self,
        exclude: &'a [CharacterId],
    ) -> BoxFuture<'a, Result<CharacterRecord, SourceError>> {
        self.fetch_random(exclude).boxed()
    }

    fn search<'a>(&'a self, query: &'a CharacterQuery) -> BoxFuture<'a, Result<CharacterRecord, SourceError>> {
        self.fetch_search(query).boxed()
    }
}
