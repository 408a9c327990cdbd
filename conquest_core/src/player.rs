// Players and the peer roster.
//
// The local player is created by the host with a colour and a capital; its
// `id` stays `None` until the relay's identity assignment arrives (see
// `MatchState::merge`). Remote players are discovered lazily from inbound
// state messages and kept in a `PeerRoster` keyed by their relay-assigned ID.
// The local player is never stored in the roster.

use std::collections::BTreeMap;

use crate::types::{Color, PlayerId, TerritoryIndex};

#[derive(Clone, Debug, PartialEq)]
pub struct Player {
    /// `None` until the relay assigns an ID.
    pub id: Option<PlayerId>,
    /// Display colour; also tells players apart before IDs are known.
    pub color: Color,
    /// Set at creation and never reassigned.
    capital: TerritoryIndex,
}

impl Player {
    /// A player whose ID has not been assigned yet.
    pub fn new(color: Color, capital: TerritoryIndex) -> Self {
        Self {
            id: None,
            color,
            capital,
        }
    }

    pub fn with_id(id: PlayerId, color: Color, capital: TerritoryIndex) -> Self {
        Self {
            id: Some(id),
            color,
            capital,
        }
    }

    pub fn capital(&self) -> TerritoryIndex {
        self.capital
    }
}

/// Other known participants, at most one entry per ID.
#[derive(Clone, Debug, Default)]
pub struct PeerRoster {
    players: BTreeMap<PlayerId, Player>,
}

impl PeerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player with an assigned ID. Returns `false` without changing
    /// anything if the player has no ID or the ID is already present.
    pub fn insert(&mut self, player: Player) -> bool {
        let Some(id) = player.id else {
            return false;
        };
        if self.players.contains_key(&id) {
            return false;
        }
        self.players.insert(id, player);
        true
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }
}
