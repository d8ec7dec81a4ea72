pub mod characters;
pub mod claim;
pub mod error;
pub mod middleware;
pub mod profile;
pub mod roll;
pub mod routes;
pub mod search;
pub mod state;

pub use routes::router;
pub use state::{AppState, AppStateInner};
