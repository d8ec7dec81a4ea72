use serde::{Deserialize, Serialize};

use crate::models::{Character, CharacterId, CharacterRecord, ChannelId, UserId};

/// Events sent over the bridge gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: UserId },

    /// A character dropped in a channel and can be claimed
    DropSpawned {
        channel_id: ChannelId,
        character: CharacterRecord,
        superseded: Option<CharacterId>,
    },

    /// Someone claimed the pending drop of a channel
    DropClaimed {
        channel_id: ChannelId,
        user_id: UserId,
        character: Character,
    },

    /// A user rolled a character
    CharacterRolled { user_id: UserId, character: Character },

    /// A character changed hands
    CharacterGiven {
        from_user_id: UserId,
        to_user_id: UserId,
        character_id: CharacterId,
    },
}

impl GatewayEvent {
    /// Returns the channel_id if this event is scoped to a specific channel.
    /// Events that return `None` are global and should be delivered to all bridges.
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            Self::DropSpawned { channel_id, .. } => Some(*channel_id),
            Self::DropClaimed { channel_id, .. } => Some(*channel_id),
            _ => None,
        }
    }
}

/// Commands sent FROM the bridge TO the server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Only forward channel-scoped events for these channels.
    Subscribe { channel_ids: Vec<ChannelId> },

    /// A chat message was posted in a channel
    MessageCreate {
        channel_id: ChannelId,
        author_id: UserId,
        #[serde(default)]
        author_bot: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_format() {
        let raw = r#"{"type":"MessageCreate","data":{"channel_id":42,"author_id":7}}"#;
        match serde_json::from_str::<GatewayCommand>(raw).unwrap() {
            GatewayCommand::MessageCreate {
                channel_id,
                author_id,
                author_bot,
            } => {
                assert_eq!(channel_id, 42);
                assert_eq!(author_id, 7);
                assert!(!author_bot);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn drop_events_are_channel_scoped() {
        let event = GatewayEvent::DropSpawned {
            channel_id: 9,
            character: CharacterRecord {
                id: 1,
                name: "Rem".into(),
                image: String::new(),
                site_url: String::new(),
                media_title: None,
            },
            superseded: None,
        };
        assert_eq!(event.channel_id(), Some(9));

        let event = GatewayEvent::CharacterGiven {
            from_user_id: 1,
            to_user_id: 2,
            character_id: 3,
        };
        assert_eq!(event.channel_id(), None);
    }
}
