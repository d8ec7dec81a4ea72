use std::collections::VecDeque;
use std::num::NonZeroU64;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use waifu_anilist::{CharacterSource, SourceError};
use waifu_types::events::GatewayEvent;
use waifu_types::models::{ChannelId, CharacterId, PendingDrop};

use crate::claim::ClaimArbiter;
use crate::dispatcher::Dispatcher;
use crate::scheduler::DropScheduler;

/// How many recently dropped IDs per channel are excluded from the next drop.
const RECENT_DROPS: usize = 16;

/// Chat activity -> drop trigger -> character fetch -> claimable drop.
#[derive(Clone)]
pub struct Dropper {
    inner: Arc<DropperInner>,
}

struct DropperInner {
    scheduler: DropScheduler,
    arbiter: ClaimArbiter,
    source: Arc<dyn CharacterSource>,
    dispatcher: Dispatcher,

    /// Per-channel lane: trigger, fetch and publish for one channel run one at
    /// a time. Holds the channel's recently dropped character IDs.
    lanes: DashMap<ChannelId, Arc<Mutex<VecDeque<CharacterId>>>>,
}

impl Dropper {
    pub fn new(threshold: NonZeroU64, source: Arc<dyn CharacterSource>, dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(DropperInner {
                scheduler: DropScheduler::new(threshold),
                arbiter: ClaimArbiter::new(),
                source,
                dispatcher,
                lanes: DashMap::new(),
            }),
        }
    }

    /// Handle one chat message. Returns the new drop if this message triggered one.
    ///
    /// Messages written by bots do not count as activity. When the character
    /// fetch fails after a trigger the trigger is spent and the error returned.
    pub async fn on_message(&self, channel_id: ChannelId, author_bot: bool) -> Result<Option<PendingDrop>, SourceError> {
        if author_bot {
            return Ok(None);
        }

        let lane = self.lane(channel_id);
        let mut recent = lane.lock().await;

        let fire = self.inner.scheduler.observe(channel_id, &mut rand::rng());
        if !fire {
            return Ok(None);
        }

        let exclude: Vec<CharacterId> = recent.iter().copied().collect();
        let character = match self.inner.source.random_character(&exclude).await {
            Ok(character) => character,
            Err(e) => {
                warn!("Drop in channel {} lost, character fetch failed: {}", channel_id, e);
                return Err(e);
            }
        };

        recent.push_back(character.id);
        if recent.len() > RECENT_DROPS {
            recent.pop_front();
        }

        let drop = PendingDrop {
            channel_id,
            character,
            dropped_at: Utc::now(),
        };
        let superseded = self.inner.arbiter.publish(drop.clone()).map(|old| old.character.id);

        match superseded {
            Some(old) => info!(
                "Dropped {} ({}) in channel {}, replacing unclaimed {}",
                drop.character.name, drop.character.id, channel_id, old
            ),
            None => info!(
                "Dropped {} ({}) in channel {}",
                drop.character.name, drop.character.id, channel_id
            ),
        }

        self.inner.dispatcher.broadcast(GatewayEvent::DropSpawned {
            channel_id,
            character: drop.character.clone(),
            superseded,
        });

        Ok(Some(drop))
    }

    /// Take the channel's pending drop. `None` when there is nothing to claim.
    pub fn claim(&self, channel_id: ChannelId) -> Option<PendingDrop> {
        self.inner.arbiter.claim(channel_id)
    }

    /// Return a claimed drop whose persistence failed.
    pub fn restore(&self, drop: PendingDrop) {
        let channel_id = drop.channel_id;
        if !self.inner.arbiter.restore(drop) {
            debug!("Not restoring drop in channel {}, a newer one is pending", channel_id);
        }
    }

    pub fn pending(&self, channel_id: ChannelId) -> Option<PendingDrop> {
        self.inner.arbiter.peek(channel_id)
    }

    /// Messages after which a drop is guaranteed.
    pub fn threshold(&self) -> u64 {
        self.inner.scheduler.threshold()
    }

    pub fn activity(&self, channel_id: ChannelId) -> u64 {
        self.inner.scheduler.count(channel_id)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    fn lane(&self, channel_id: ChannelId) -> Arc<Mutex<VecDeque<CharacterId>>> {
        self.inner
            .lanes
            .entry(channel_id)
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::with_capacity(RECENT_DROPS + 1))))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicI64, Ordering};

    use futures_util::FutureExt;
    use futures_util::future::BoxFuture;
    use waifu_anilist::CharacterQuery;
    use waifu_types::models::CharacterRecord;

    /// Hands out characters 1, 2, 3, ... and remembers what it was told to exclude.
    #[derive(Default)]
    struct CountingSource {
        next: AtomicI64,
        excluded: StdMutex<Vec<Vec<CharacterId>>>,
        fail: bool,
    }

    impl CharacterSource for CountingSource {
        fn random_character<'a>(
            &'a self,
            exclude: &'a [CharacterId],
        ) -> BoxFuture<'a, Result<CharacterRecord, SourceError>> {
            async move {
                if self.fail {
                    return Err(SourceError::Status(503));
                }
                self.excluded.lock().unwrap().push(exclude.to_vec());
                let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(CharacterRecord {
                    id,
                    name: format!("Character {}", id),
                    image: String::new(),
                    site_url: String::new(),
                    media_title: None,
                })
            }
            .boxed()
        }

        fn search<'a>(&'a self, _query: &'a CharacterQuery) -> BoxFuture<'a, Result<CharacterRecord, SourceError>> {
            async { Err::<CharacterRecord, _>(SourceError::Empty) }.boxed()
        }
    }

    fn dropper(threshold: u64, source: Arc<CountingSource>) -> Dropper {
        Dropper::new(NonZeroU64::new(threshold).unwrap(), source, Dispatcher::new())
    }

    #[tokio::test]
    async fn bot_messages_are_not_activity() {
        let d = dropper(1, Arc::new(CountingSource::default()));
        assert!(d.on_message(1, true).await.unwrap().is_none());
        assert!(d.pending(1).is_none());
    }

    #[tokio::test]
    async fn drop_is_published_and_announced() {
        let d = dropper(1, Arc::new(CountingSource::default()));
        let mut events = d.dispatcher().subscribe();

        assert_eq!(d.threshold(), 1);
        let drop = d.on_message(4, false).await.unwrap().unwrap();
        assert_eq!(drop.character.id, 1);
        assert_eq!(d.pending(4).unwrap().character.id, 1);
        assert_eq!(d.activity(4), 0);

        match events.recv().await.unwrap() {
            GatewayEvent::DropSpawned {
                channel_id,
                character,
                superseded,
            } => {
                assert_eq!(channel_id, 4);
                assert_eq!(character.id, 1);
                assert_eq!(superseded, None);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn new_drop_supersedes_unclaimed_one() {
        let d = dropper(1, Arc::new(CountingSource::default()));
        let mut events = d.dispatcher().subscribe();

        d.on_message(4, false).await.unwrap();
        d.on_message(4, false).await.unwrap();
        events.recv().await.unwrap();

        match events.recv().await.unwrap() {
            GatewayEvent::DropSpawned { superseded, .. } => assert_eq!(superseded, Some(1)),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(d.claim(4).unwrap().character.id, 2);
        assert!(d.claim(4).is_none());
    }

    #[tokio::test]
    async fn recent_drops_are_excluded() {
        let source = Arc::new(CountingSource::default());
        let d = dropper(1, source.clone());

        for _ in 0..3 {
            d.on_message(8, false).await.unwrap();
        }
        d.on_message(9, false).await.unwrap();

        let excluded = source.excluded.lock().unwrap().clone();
        assert_eq!(excluded[0], Vec::<CharacterId>::new());
        assert_eq!(excluded[1], vec![1]);
        assert_eq!(excluded[2], vec![1, 2]);
        // Other channels keep their own history.
        assert_eq!(excluded[3], Vec::<CharacterId>::new());
    }

    #[tokio::test]
    async fn failed_fetch_spends_the_trigger() {
        let source = Arc::new(CountingSource {
            fail: true,
            ..Default::default()
        });
        let d = dropper(1, source);

        assert!(matches!(d.on_message(2, false).await, Err(SourceError::Status(503))));
        assert!(d.pending(2).is_none());
        assert_eq!(d.activity(2), 0);
    }

    #[tokio::test]
    async fn restore_returns_drop_to_empty_channel() {
        let d = dropper(1, Arc::new(CountingSource::default()));
        d.on_message(3, false).await.unwrap();

        let taken = d.claim(3).unwrap();
        d.restore(taken);
        assert_eq!(d.pending(3).unwrap().character.id, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_messages_respect_deadline() {
        let threshold = 5;
        let d = dropper(threshold, Arc::new(CountingSource::default()));

        let tasks: Vec<_> = (0..40)
            .map(|_| {
                let d = d.clone();
                tokio::spawn(async move { d.on_message(6, false).await.unwrap().is_some() })
            })
            .collect();

        let mut drops = 0;
        for t in tasks {
            if t.await.unwrap() {
                drops += 1;
            }
        }

        // At most `threshold` messages pass between drops.
        assert!(drops >= 40 / threshold as usize);
        assert!(d.activity(6) < threshold);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_have_one_winner() {
        let d = dropper(1, Arc::new(CountingSource::default()));
        d.on_message(11, false).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let d = d.clone();
                tokio::spawn(async move { d.claim(11).is_some() })
            })
            .collect();

        let mut winners = 0;
        for t in tasks {
            if t.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
