use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use waifu_types::events::{GatewayCommand, GatewayEvent};
use waifu_types::models::{ChannelId, UserId};

use crate::dropper::Dropper;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Time a bridge has to send Identify after connecting.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Subscriptions = Arc<RwLock<HashSet<ChannelId>>>;

/// Handle one chat-bridge WebSocket connection.
///
/// The bridge must Identify with a JWT first; afterwards it streams chat
/// activity in and receives drop/ownership events out.
pub async fn handle_connection(socket: WebSocket, dropper: Dropper, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    let user_id = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("Bridge failed to identify, closing");
            return;
        }
    };

    info!("Bridge {} connected to gateway", user_id);

    if send_event(&mut sender, &GatewayEvent::Ready { user_id }).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, dropper, user_id).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dropper: Dropper,
    user_id: UserId,
) {
    let dispatcher = dropper.dispatcher().clone();
    let conn_id = dispatcher.bridge_online(user_id).await;
    let mut broadcast_rx = dispatcher.subscribe();

    // Per-connection channel subscriptions (shared between send and recv tasks).
    let subscribed_channels: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscribed_channels.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts -> bridge, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if !is_subscribed(&send_subscriptions, &event) {
                        continue;
                    }

                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping bridge", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the bridge
    let recv_subscriptions = subscribed_channels.clone();
    let recv_dropper = dropper.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_dropper, user_id, cmd, &recv_subscriptions).await,
                    Err(e) => {
                        warn!(
                            "Bridge {} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.bridge_offline(conn_id).await;
    info!("Bridge {} disconnected from gateway", user_id);
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, jwt_secret: &str) -> Option<UserId> {
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use waifu_types::api::Claims;

    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(&text) {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some(token_data.claims.sub);
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

async fn handle_command(dropper: &Dropper, user_id: UserId, cmd: GatewayCommand, subscriptions: &Subscriptions) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { channel_ids } => {
            info!("Bridge {} subscribing to {} channels", user_id, channel_ids.len());
            if !set_subscriptions(subscriptions, channel_ids) {
                warn!("Subscription lock poisoned for bridge {}", user_id);
            }
        }

        GatewayCommand::MessageCreate {
            channel_id,
            author_id,
            author_bot,
        } => {
            debug!("Activity in channel {} by {}", channel_id, author_id);
            match dropper.on_message(channel_id, author_bot).await {
                Ok(Some(drop)) => debug!("Bridge {} activity dropped {}", user_id, drop.character.id),
                Ok(None) => {}
                Err(e) => debug!("Bridge {} activity in channel {} produced no drop: {}", user_id, channel_id, e),
            }
        }
    }
}

fn set_subscriptions(subscriptions: &Subscriptions, channel_ids: Vec<ChannelId>) -> bool {
    match subscriptions.write() {
        Ok(mut subs) => {
            *subs = channel_ids.into_iter().collect();
            true
        }
        Err(_) => false,
    }
}

fn is_subscribed(subscriptions: &Subscriptions, event: &GatewayEvent) -> bool {
    match event.channel_id() {
        None => true,
        Some(channel_id) => subscriptions
            .read()
            .map(|subs| subs.contains(&channel_id))
            .unwrap_or(false),
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize gateway event: {}", e);
            return Ok(());
        }
    };

    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU64;

    use futures_util::FutureExt;
    use futures_util::future::BoxFuture;
    use waifu_anilist::{CharacterQuery, CharacterSource, SourceError};
    use waifu_types::models::{CharacterId, CharacterRecord};

    use crate::dispatcher::Dispatcher;

    /// Upstream that is always down.
    struct DownSource;

    impl CharacterSource for DownSource {
        fn random_character<'a>(
            &'a self,
            _exclude: &'a [CharacterId],
        ) -> BoxFuture<'a, Result<CharacterRecord, SourceError>> {
            async { Err::<CharacterRecord, _>(SourceError::Status(503)) }.boxed()
        }

        fn search<'a>(&'a self, _query: &'a CharacterQuery) -> BoxFuture<'a, Result<CharacterRecord, SourceError>> {
            async { Err::<CharacterRecord, _>(SourceError::Empty) }.boxed()
        }
    }

    fn spawned(channel_id: ChannelId) -> GatewayEvent {
        GatewayEvent::DropSpawned {
            channel_id,
            character: CharacterRecord {
                id: 1,
                name: "Rem".into(),
                image: String::new(),
                site_url: String::new(),
                media_title: None,
            },
            superseded: None,
        }
    }

    #[test]
    fn channel_events_need_subscription() {
        let subs: Subscriptions = Arc::new(RwLock::new(HashSet::from([5])));
        assert!(is_subscribed(&subs, &spawned(5)));
        assert!(!is_subscribed(&subs, &spawned(6)));
    }

    #[test]
    fn subscribe_replaces_previous_set() {
        let subs: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
        assert!(set_subscriptions(&subs, vec![1, 2]));
        assert!(set_subscriptions(&subs, vec![3]));

        assert!(!is_subscribed(&subs, &spawned(1)));
        assert!(is_subscribed(&subs, &spawned(3)));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_bridge_session_intact() {
        let dropper = Dropper::new(NonZeroU64::new(1).unwrap(), Arc::new(DownSource), Dispatcher::new());
        let subs: Subscriptions = Arc::new(RwLock::new(HashSet::new()));

        let cmd = GatewayCommand::MessageCreate {
            channel_id: 12,
            author_id: 3,
            author_bot: false,
        };
        handle_command(&dropper, 3, cmd, &subs).await;

        assert!(dropper.pending(12).is_none());
        assert_eq!(dropper.activity(12), 0);

        // The session keeps accepting commands afterwards.
        handle_command(&dropper, 3, GatewayCommand::Subscribe { channel_ids: vec![12] }, &subs).await;
        assert!(subs.read().unwrap().contains(&12));
    }

    #[test]
    fn global_events_always_pass() {
        let subs: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
        let event = GatewayEvent::CharacterGiven {
            from_user_id: 1,
            to_user_id: 2,
            character_id: 3,
        };
        assert!(is_subscribed(&subs, &event));
    }
}
