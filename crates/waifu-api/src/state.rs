use std::sync::Arc;

use dashmap::DashSet;
use tracing::error;

use waifu_anilist::CharacterSource;
use waifu_db::{Database, StoreError};
use waifu_gateway::dropper::Dropper;
use waifu_types::models::UserId;

use crate::error::ApiError;
use crate::roll::RollGate;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub source: Arc<dyn CharacterSource>,
    pub dropper: Dropper,
    pub roll_gate: RollGate,
    pub jwt_secret: String,
    /// Users with a roll currently being processed
    pub rolls_in_flight: DashSet<UserId>,
}

impl AppStateInner {
    pub fn new(
        db: Database,
        source: Arc<dyn CharacterSource>,
        dropper: Dropper,
        roll_gate: RollGate,
        jwt_secret: String,
    ) -> AppState {
        Arc::new(Self {
            db,
            source,
            dropper,
            roll_gate,
            jwt_secret,
            rolls_in_flight: DashSet::new(),
        })
    }
}

/// Run a store operation off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
