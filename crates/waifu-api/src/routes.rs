use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};

use waifu_gateway::connection;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{characters, claim, profile, roll, search};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/roll", post(roll::roll))
        .route("/channels/{channel_id}/claim", post(claim::claim))
        .route("/channels/{channel_id}/activity", post(claim::activity))
        .route("/characters/search", get(search::search))
        .route("/characters/{character_id}/give", post(characters::give))
        .route("/me/favorite", put(characters::set_favorite))
        .route("/me/quote", put(profile::set_quote))
        .route("/users/{user_id}/profile", get(profile::profile))
        .route("/users/{user_id}/characters", get(characters::list))
        .route("/users/{user_id}/characters/{character_id}", get(characters::verify))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let bridges = state.dropper.dispatcher().bridge_count().await;
    Json(serde_json::json!({ "status": "ok", "bridges": bridges }))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dropper = state.dropper.clone();
    let jwt_secret = state.jwt_secret.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dropper, jwt_secret))
}
