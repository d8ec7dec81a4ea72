use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use waifu_db::models::NewCharacter;
use waifu_types::api::{Claims, RollResponse};
use waifu_types::events::GatewayEvent;
use waifu_types::models::{Acquisition, UserId};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Longest accepted cooldown: 100 years.
pub const MAX_COOLDOWN_HOURS: u32 = 24 * 365 * 100;

/// Per-user cooldown between explicit rolls.
///
/// Pure decision over the last roll time; recording a new roll is the
/// caller's job.
#[derive(Debug, Clone, Copy)]
pub struct RollGate {
    cooldown: Duration,
}

impl RollGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn from_hours(hours: u32) -> Self {
        Self::new(Duration::hours(i64::from(hours)))
    }

    /// Whether a user who last rolled at `last_roll` may roll at `now`, and
    /// the instant they may roll. A user who never rolled may roll right away.
    pub fn can_roll(&self, last_roll: Option<DateTime<Utc>>, now: DateTime<Utc>) -> (bool, DateTime<Utc>) {
        match last_roll {
            None => (true, now),
            Some(last) => {
                let available_at = self.available_after(last);
                (now >= available_at, available_at)
            }
        }
    }

    /// First instant a roll made at `rolled_at` allows another one. Saturates
    /// at the latest representable time instead of overflowing.
    pub fn available_after(&self, rolled_at: DateTime<Utc>) -> DateTime<Utc> {
        rolled_at
            .checked_add_signed(self.cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn check(&self, last_roll: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), ApiError> {
        match self.can_roll(last_roll, now) {
            (true, _) => Ok(()),
            (false, available_at) => Err(ApiError::CooldownActive { available_at }),
        }
    }
}

/// Marks a user's roll as in flight until dropped.
struct RollGuard {
    state: AppState,
    user_id: UserId,
}

impl RollGuard {
    fn acquire(state: &AppState, user_id: UserId) -> Result<Self, ApiError> {
        if !state.rolls_in_flight.insert(user_id) {
            return Err(ApiError::RollInProgress);
        }
        Ok(Self {
            state: state.clone(),
            user_id,
        })
    }
}

impl Drop for RollGuard {
    fn drop(&mut self) {
        self.state.rolls_in_flight.remove(&self.user_id);
    }
}

/// POST /roll: attribute a random character to the caller, once per cooldown.
pub async fn roll(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<RollResponse>, ApiError> {
    let user_id = claims.sub;
    let _guard = RollGuard::acquire(&state, user_id)?;

    let last_roll = match blocking(&state, move |db| db.get_user(user_id)).await {
        Ok(user) => user.last_roll,
        Err(ApiError::NotFound) => None,
        Err(e) => return Err(e),
    };

    let now = Utc::now();
    state.roll_gate.check(last_roll, now)?;

    let owned = blocking(&state, move |db| db.list_character_ids(user_id)).await?;
    let record = state.source.random_character(&owned).await?;

    let new = NewCharacter::from_record(&record, Acquisition::Roll, now);
    let character = blocking(&state, move |db| db.record_roll(user_id, &new, now)).await?;

    info!("User {} rolled {} ({})", user_id, character.name, character.id);

    state.dropper.dispatcher().broadcast(GatewayEvent::CharacterRolled {
        user_id,
        character: character.clone(),
    });

    Ok(Json(RollResponse {
        character,
        site_url: record.site_url,
        next_roll_at: state.roll_gate.available_after(now),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn never_rolled_is_eligible() {
        let gate = RollGate::from_hours(24);
        let now = Utc::now();
        assert_eq!(gate.can_roll(None, now), (true, now));
        assert!(gate.check(None, now).is_ok());
    }

    #[test]
    fn cooldown_reports_exact_instant() {
        let gate = RollGate::from_hours(24);
        let last = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let available = Utc.with_ymd_and_hms(2024, 6, 2, 10, 0, 0).unwrap();

        assert_eq!(gate.can_roll(Some(last), last), (false, available));
        assert_eq!(
            gate.can_roll(Some(last), available - Duration::seconds(1)),
            (false, available)
        );

        match gate.check(Some(last), last + Duration::hours(3)) {
            Err(ApiError::CooldownActive { available_at }) => assert_eq!(available_at, available),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn eligible_at_and_after_available_instant() {
        let gate = RollGate::from_hours(2);
        let last = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let available = last + Duration::hours(2);

        assert!(gate.can_roll(Some(last), available).0);
        assert!(gate.can_roll(Some(last), available + Duration::days(30)).0);
    }

    #[test]
    fn huge_cooldown_saturates_instead_of_overflowing() {
        let gate = RollGate::from_hours(u32::MAX);
        let now = Utc::now();

        assert_eq!(gate.can_roll(Some(now), now), (false, DateTime::<Utc>::MAX_UTC));
        assert_eq!(gate.available_after(now), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn longest_accepted_cooldown_is_representable() {
        let gate = RollGate::from_hours(MAX_COOLDOWN_HOURS);
        let now = Utc::now();
        assert!(gate.available_after(now) < DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn zero_cooldown_never_blocks() {
        let gate = RollGate::from_hours(0);
        let now = Utc::now();
        assert!(gate.can_roll(Some(now), now).0);
    }
}
