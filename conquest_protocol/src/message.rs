// Protocol messages exchanged between peers (via the relay).
//
// A line on the wire is one of two JSON object shapes:
// - identity assignment: `{"id": 7}`, sent by the relay to a client once,
//   right after it connects.
// - state update: `{"player": {...}, "tiles": [...]}`, sent by every client on
//   each outbound tick and forwarded by the relay to all other clients.
//
// The shapes are told apart by the presence of `tiles`. That check happens
// exactly once, in `TryFrom<RawMessage>`, and the rest of the code works with
// the tagged `WireMessage` enum. Unknown fields are ignored so that peers may
// attach extra rendering data to tiles.
//
// Tile owners use a sentinel on the wire: `-1` (or any negative value) means
// unclaimed. In memory this is `Option<PlayerId>`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Color, PlayerId, TerritoryIndex};

/// Wire value of `TileDelta::owner` for an unclaimed territory.
pub const UNCLAIMED_OWNER: i64 = -1;

/// A decoded wire message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMessage", into = "RawMessage")]
pub enum WireMessage {
    /// The relay tells a client which player ID it has.
    IdentityAssignment { id: PlayerId },
    /// A peer's player summary plus territory state.
    StateUpdate(StateUpdate),
}

/// Payload of a state message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub player: PlayerSummary,
    pub tiles: Vec<TileDelta>,
}

/// The sending player's identity, as carried in every state message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub color: Color,
    pub capital: CapitalRef,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalRef {
    pub index: TerritoryIndex,
}

/// Owner and troop count of one territory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileDelta {
    pub index: TerritoryIndex,
    #[serde(with = "owner_sentinel")]
    pub owner: Option<PlayerId>,
    #[serde(rename = "troopCount")]
    pub troop_count: u32,
}

/// Both wire shapes flattened into one struct. Only used as the serde
/// intermediary for `WireMessage`.
#[derive(Serialize, Deserialize)]
struct RawMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    player: Option<PlayerSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tiles: Option<Vec<TileDelta>>,
}

/// A JSON object that matches neither message shape.
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("state message has `tiles` but no `player`")]
    MissingPlayer,
    #[error("message has neither `tiles` nor `id`")]
    Unrecognized,
}

impl TryFrom<RawMessage> for WireMessage {
    type Error = ShapeError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        match (raw.tiles, raw.player, raw.id) {
            (Some(tiles), Some(player), _) => Ok(Self::StateUpdate(StateUpdate { player, tiles })),
            (Some(_), None, _) => Err(ShapeError::MissingPlayer),
            (None, _, Some(id)) => Ok(Self::IdentityAssignment { id }),
            (None, _, None) => Err(ShapeError::Unrecognized),
        }
    }
}

impl From<WireMessage> for RawMessage {
    fn from(msg: WireMessage) -> Self {
        match msg {
            WireMessage::IdentityAssignment { id } => Self {
                id: Some(id),
                player: None,
                tiles: None,
            },
            WireMessage::StateUpdate(update) => Self {
                id: None,
                player: Some(update.player),
                tiles: Some(update.tiles),
            },
        }
    }
}

mod owner_sentinel {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::UNCLAIMED_OWNER;
    use crate::types::PlayerId;

    pub fn serialize<S: Serializer>(owner: &Option<PlayerId>, serializer: S) -> Result<S::Ok, S::Error> {
        match owner {
            Some(id) => serializer.serialize_i64(i64::from(id.0)),
            None => serializer.serialize_i64(UNCLAIMED_OWNER),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<PlayerId>, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        if raw < 0 {
            return Ok(None);
        }
        u32::try_from(raw)
            .map(|id| Some(PlayerId(id)))
            .map_err(|_| serde::de::Error::custom(format!("owner id {raw} out of range")))
    }
}

/// Failure to turn a received line into a `WireMessage`.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode one line (without its trailing newline).
pub fn decode(line: &[u8]) -> Result<WireMessage, DecodeError> {
    let text = std::str::from_utf8(line)?;
    Ok(serde_json::from_str(text)?)
}

/// Encode a message as a single JSON line (without the trailing newline).
pub fn encode(msg: &WireMessage) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(msg)
}
