use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("graphql error: {0}")]
    GraphQl(String),

    /// The query matched no character.
    #[error("no character found")]
    Empty,
}
