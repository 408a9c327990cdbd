// Match state and the merge algorithm for inbound wire messages.
//
// `MatchState` bundles everything a session mutates: the territory graph, the
// local player and the peer roster. It has a single owner (the host's main
// loop); the network reader thread never touches it. Inbound messages are
// queued by `conquest_relay::client` and applied here one at a time, so each
// message lands as a whole and never interleaves with a dispatch.
//
// Merge rules, per message:
// - Identity assignment: overwrite the local player's ID.
// - State update:
//   1. If the sender is neither the local player nor already in the roster,
//      build a `Player` from the summary and add it. Known peers are left
//      untouched (colour and capital are not updated after first contact).
//   2. For each tile delta, keep the owner only if it names the local player
//      or a roster entry, otherwise treat it as unclaimed, then overwrite the
//      territory's (owner, troop count) pair.
// Last message wins: there is no versioning, so a stale remote view can
// overwrite a newer local change to the same territory.
//
// The outbound direction lives here too: `state_update` builds the local
// player's summary plus the requested tiles.

use conquest_protocol::message::{CapitalRef, PlayerSummary, StateUpdate, TileDelta, WireMessage};
use log::{debug, info, warn};

use crate::graph::TerritoryGraph;
use crate::player::{PeerRoster, Player};
use crate::types::{PlayerId, TerritoryIndex};

/// What applying one inbound message did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The local player's ID was set.
    IdentityAssigned(PlayerId),
    /// Tile deltas were applied.
    StateApplied {
        /// Set when this message introduced a new peer.
        new_peer: Option<PlayerId>,
        /// Deltas written to the graph.
        applied: usize,
        /// Deltas naming a territory this map does not have.
        skipped: usize,
    },
    /// A new peer announced a capital this map does not have; the whole
    /// message was dropped.
    UnknownCapital {
        player: PlayerId,
        capital: TerritoryIndex,
    },
}

#[derive(Clone, Debug)]
pub struct MatchState {
    pub graph: TerritoryGraph,
    pub local: Player,
    pub roster: PeerRoster,
}

impl MatchState {
    pub fn new(graph: TerritoryGraph, local: Player) -> Self {
        Self {
            graph,
            local,
            roster: PeerRoster::new(),
        }
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local.id
    }

    /// The local player or a roster entry with this ID.
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        if self.local.id == Some(id) {
            Some(&self.local)
        } else {
            self.roster.get(id)
        }
    }

    /// Apply one decoded inbound message.
    pub fn merge(&mut self, msg: &WireMessage) -> MergeOutcome {
        match msg {
            WireMessage::IdentityAssignment { id } => {
                if let Some(old) = self.local.id.replace(*id) {
                    if old != *id {
                        warn!("local player id reassigned from {old} to {id}");
                    }
                } else {
                    info!("local player assigned id {id}");
                }
                MergeOutcome::IdentityAssigned(*id)
            }
            WireMessage::StateUpdate(update) => self.merge_state(update),
        }
    }

    fn merge_state(&mut self, update: &StateUpdate) -> MergeOutcome {
        let summary = &update.player;
        let mut new_peer = None;

        if !self.is_self(summary) && !self.roster.contains(summary.id) {
            let capital = summary.capital.index;
            if !self.graph.contains(capital) {
                warn!(
                    "dropping state from new peer {}: unknown capital {capital}",
                    summary.id
                );
                return MergeOutcome::UnknownCapital {
                    player: summary.id,
                    capital,
                };
            }
            self.roster
                .insert(Player::with_id(summary.id, summary.color, capital));
            info!(
                "discovered peer {} (colour {}, capital {capital})",
                summary.id, summary.color
            );
            new_peer = Some(summary.id);
        }

        let mut applied = 0;
        let mut skipped = 0;
        for tile in &update.tiles {
            let owner = tile.owner.filter(|&id| self.player(id).is_some());
            if self.graph.apply_delta(tile.index, owner, tile.troop_count) {
                applied += 1;
            } else {
                skipped += 1;
            }
        }
        if skipped > 0 {
            debug!(
                "state from {}: {skipped} tile(s) outside this map",
                summary.id
            );
        }

        MergeOutcome::StateApplied {
            new_peer,
            applied,
            skipped,
        }
    }

    /// True if the summary describes the local player: same ID, or, before
    /// the local ID is known, the same colour.
    fn is_self(&self, summary: &PlayerSummary) -> bool {
        match self.local.id {
            Some(id) => id == summary.id,
            None => self.local.color == summary.color,
        }
    }

    /// Build an outbound state message carrying the given territories.
    /// Returns `None` until the local player has an ID. Unknown indices are
    /// left out.
    pub fn state_update<I>(&self, indices: I) -> Option<StateUpdate>
    where
        I: IntoIterator<Item = TerritoryIndex>,
    {
        let id = self.local.id?;
        let tiles = indices
            .into_iter()
            .filter_map(|index| self.graph.territory(index))
            .map(|t| TileDelta {
                index: t.index,
                owner: t.owner,
                troop_count: t.troop_count,
            })
            .collect();
        Some(StateUpdate {
            player: PlayerSummary {
                id,
                color: self.local.color,
                capital: CapitalRef {
                    index: self.local.capital(),
                },
            },
            tiles,
        })
    }

    /// Outbound state message carrying every territory.
    pub fn full_state_update(&self) -> Option<StateUpdate> {
        self.state_update(self.graph.iter().map(|t| t.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, Position};

    const RED: Color = Color::rgb(0xFF, 0, 0);
    const BLUE: Color = Color::rgb(0, 0, 0xFF);

    /// Three territories in a row, local player (red) with capital 0.
    fn state() -> MatchState {
        let mut graph = TerritoryGraph::new();
        let a = graph.add_territory(Position::new(0.0, 0.0), true);
        let b = graph.add_territory(Position::new(10.0, 0.0), false);
        let c = graph.add_territory(Position::new(20.0, 0.0), true);
        graph.connect(a, b).unwrap();
        graph.connect(b, c).unwrap();
        MatchState::new(graph, Player::new(RED, a))
    }

    fn blue_update(id: u32, tiles: Vec<TileDelta>) -> WireMessage {
        WireMessage::StateUpdate(StateUpdate {
            player: PlayerSummary {
                id: PlayerId(id),
                color: BLUE,
                capital: CapitalRef {
                    index: TerritoryIndex(2),
                },
            },
            tiles,
        })
    }

    fn delta(index: u32, owner: Option<u32>, troops: u32) -> TileDelta {
        TileDelta {
            index: TerritoryIndex(index),
            owner: owner.map(PlayerId),
            troop_count: troops,
        }
    }

    fn snapshot(state: &MatchState) -> Vec<(Option<PlayerId>, u32)> {
        state
            .graph
            .iter()
            .map(|t| (t.owner, t.troop_count))
            .collect()
    }

    #[test]
    fn identity_assignment_sets_local_id() {
        let mut state = state();
        let outcome = state.merge(&WireMessage::IdentityAssignment { id: PlayerId(7) });
        assert_eq!(outcome, MergeOutcome::IdentityAssigned(PlayerId(7)));
        assert_eq!(state.local_id(), Some(PlayerId(7)));

        // A later assignment simply overwrites.
        state.merge(&WireMessage::IdentityAssignment { id: PlayerId(9) });
        assert_eq!(state.local_id(), Some(PlayerId(9)));
    }

    #[test]
    fn state_about_self_never_reassigns_local_player() {
        let mut state = state();
        state.merge(&WireMessage::IdentityAssignment { id: PlayerId(7) });
        let echo = WireMessage::StateUpdate(StateUpdate {
            player: PlayerSummary {
                id: PlayerId(7),
                color: RED,
                capital: CapitalRef {
                    index: TerritoryIndex(0),
                },
            },
            tiles: vec![delta(0, Some(7), 4)],
        });
        state.merge(&echo);
        assert_eq!(state.local_id(), Some(PlayerId(7)));
        assert!(state.roster.is_empty());
        assert_eq!(state.graph.territory(TerritoryIndex(0)).unwrap().owner, Some(PlayerId(7)));
    }

    #[test]
    fn same_colour_before_identity_is_not_a_peer() {
        let mut state = state();
        let echo = WireMessage::StateUpdate(StateUpdate {
            player: PlayerSummary {
                id: PlayerId(3),
                color: RED,
                capital: CapitalRef {
                    index: TerritoryIndex(0),
                },
            },
            tiles: vec![],
        });
        state.merge(&echo);
        assert!(state.roster.is_empty());
    }

    #[test]
    fn new_peer_discovered_once() {
        let mut state = state();
        state.merge(&WireMessage::IdentityAssignment { id: PlayerId(1) });

        let first = state.merge(&blue_update(2, vec![delta(2, Some(2), 10)]));
        assert_eq!(
            first,
            MergeOutcome::StateApplied {
                new_peer: Some(PlayerId(2)),
                applied: 1,
                skipped: 0,
            }
        );
        let second = state.merge(&blue_update(2, vec![delta(2, Some(2), 11)]));
        assert!(matches!(second, MergeOutcome::StateApplied { new_peer: None, .. }));

        assert_eq!(state.roster.len(), 1);
        let peer = state.roster.get(PlayerId(2)).unwrap();
        assert_eq!(peer.color, BLUE);
        assert_eq!(peer.capital(), TerritoryIndex(2));
        let c = state.graph.territory(TerritoryIndex(2)).unwrap();
        assert_eq!((c.owner, c.troop_count), (Some(PlayerId(2)), 11));
    }

    #[test]
    fn known_peer_is_not_updated() {
        let mut state = state();
        state.merge(&blue_update(2, vec![]));
        let recoloured = WireMessage::StateUpdate(StateUpdate {
            player: PlayerSummary {
                id: PlayerId(2),
                color: Color::rgb(0, 0xFF, 0),
                capital: CapitalRef {
                    index: TerritoryIndex(1),
                },
            },
            tiles: vec![],
        });
        state.merge(&recoloured);
        let peer = state.roster.get(PlayerId(2)).unwrap();
        assert_eq!(peer.color, BLUE);
        assert_eq!(peer.capital(), TerritoryIndex(2));
    }

    #[test]
    fn unknown_owner_resolves_to_unclaimed() {
        let mut state = state();
        state.merge(&WireMessage::IdentityAssignment { id: PlayerId(1) });
        state.merge(&blue_update(2, vec![delta(1, Some(99), 6)]));
        let b = state.graph.territory(TerritoryIndex(1)).unwrap();
        assert_eq!((b.owner, b.troop_count), (None, 0));
    }

    #[test]
    fn deltas_can_name_the_local_player() {
        let mut state = state();
        state.merge(&WireMessage::IdentityAssignment { id: PlayerId(1) });
        state.merge(&blue_update(2, vec![delta(0, Some(1), 3)]));
        let a = state.graph.territory(TerritoryIndex(0)).unwrap();
        assert_eq!((a.owner, a.troop_count), (Some(PlayerId(1)), 3));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut state = state();
        state.merge(&WireMessage::IdentityAssignment { id: PlayerId(1) });
        let msg = blue_update(2, vec![delta(1, Some(2), 5), delta(2, Some(2), 20), delta(0, None, 9)]);

        state.merge(&msg);
        let once = snapshot(&state);
        let roster_once = state.roster.len();
        state.merge(&msg);
        assert_eq!(snapshot(&state), once);
        assert_eq!(state.roster.len(), roster_once);
    }

    #[test]
    fn unknown_tiles_are_skipped() {
        let mut state = state();
        let outcome = state.merge(&blue_update(2, vec![delta(2, Some(2), 1), delta(40, Some(2), 1)]));
        assert_eq!(
            outcome,
            MergeOutcome::StateApplied {
                new_peer: Some(PlayerId(2)),
                applied: 1,
                skipped: 1,
            }
        );
    }

    #[test]
    fn unknown_capital_drops_message() {
        let mut state = state();
        let msg = WireMessage::StateUpdate(StateUpdate {
            player: PlayerSummary {
                id: PlayerId(4),
                color: BLUE,
                capital: CapitalRef {
                    index: TerritoryIndex(30),
                },
            },
            tiles: vec![delta(1, Some(4), 8)],
        });
        let before = snapshot(&state);
        assert_eq!(
            state.merge(&msg),
            MergeOutcome::UnknownCapital {
                player: PlayerId(4),
                capital: TerritoryIndex(30),
            }
        );
        assert!(state.roster.is_empty());
        assert_eq!(snapshot(&state), before);
    }

    #[test]
    fn state_update_waits_for_identity() {
        let mut state = state();
        assert!(state.full_state_update().is_none());

        state.merge(&WireMessage::IdentityAssignment { id: PlayerId(5) });
        state.graph.apply_delta(TerritoryIndex(0), Some(PlayerId(5)), 12);
        let update = state.full_state_update().unwrap();
        assert_eq!(update.player.id, PlayerId(5));
        assert_eq!(update.player.color, RED);
        assert_eq!(update.player.capital.index, TerritoryIndex(0));
        assert_eq!(update.tiles.len(), 3);
        assert_eq!(update.tiles[0], delta(0, Some(5), 12));

        let partial = state
            .state_update([TerritoryIndex(2), TerritoryIndex(17)])
            .unwrap();
        assert_eq!(partial.tiles, vec![delta(2, None, 0)]);
    }
}
