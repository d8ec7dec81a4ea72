//! GraphQL documents and response shapes for the AniList API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use waifu_types::models::CharacterRecord;

pub const RANDOM_CHARACTER: &str = r#"
query ($page: Int, $not_in: [Int]) {
  Page(perPage: 1, page: $page) {
    characters(sort: FAVOURITES_DESC, id_not_in: $not_in) {
      id
      siteUrl
      image { large }
      name { full }
      media(perPage: 1, sort: POPULARITY_DESC) {
        nodes { title { romaji } }
      }
    }
  }
}
"#;

pub const SEARCH_CHARACTER: &str = r#"
query ($id: Int, $name: String) {
  Character(id: $id, search: $name, sort: SEARCH_MATCH) {
    id
    siteUrl
    image { large }
    name { full }
    media(perPage: 1, sort: POPULARITY_DESC) {
      nodes { title { romaji } }
    }
  }
}
"#;

#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: Value,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PageData {
    #[serde(rename = "Page")]
    pub page: Page,
}

#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub characters: Vec<CharacterNode>,
}

#[derive(Debug, Deserialize)]
pub struct SearchData {
    #[serde(rename = "Character")]
    pub character: Option<CharacterNode>,
}

#[derive(Debug, Deserialize)]
pub struct CharacterNode {
    pub id: i64,
    #[serde(rename = "siteUrl", default)]
    pub site_url: String,
    pub image: Option<Image>,
    pub name: Name,
    pub media: Option<MediaConnection>,
}

#[derive(Debug, Deserialize)]
pub struct Image {
    pub large: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Name {
    pub full: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MediaConnection {
    #[serde(default)]
    pub nodes: Vec<MediaNode>,
}

#[derive(Debug, Deserialize)]
pub struct MediaNode {
    pub title: MediaTitle,
}

#[derive(Debug, Deserialize)]
pub struct MediaTitle {
    pub romaji: Option<String>,
}

impl From<CharacterNode> for CharacterRecord {
    fn from(node: CharacterNode) -> Self {
        CharacterRecord {
            id: node.id,
            name: node.name.full.unwrap_or_default(),
            image: node.image.and_then(|i| i.large).unwrap_or_default(),
            site_url: node.site_url,
            media_title: node
                .media
                .and_then(|m| m.nodes.into_iter().next())
                .and_then(|n| n.title.romaji),
        }
    }
}
