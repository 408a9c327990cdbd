// Territory graph: the authoritative in-memory map.
//
// The shape (territory set, positions, capital flags, adjacency) is fixed once
// the graph is built; only each territory's owner and troop count change
// during a match. Territories live in a `Vec` indexed by `TerritoryIndex`, so
// indices must be dense (0..n) and lookups are O(1).
//
// Adjacency is symmetric: `connect(a, b)` records both directions. Edge cost
// is the Euclidean distance between the two territory centres, which keeps
// the straight-line heuristic in `pathfinding.rs` admissible.
//
// `apply_delta` is the single write path for ownership: local dispatch,
// inbound merges and the host's initial seeding all go through it. It does
// not check that a capture is legal (peers are trusted).
//
// See also: `pathfinding.rs` for A* over this graph, `config.rs` for the JSON
// map description, `state.rs` which owns the graph inside `MatchState`.

use smallvec::SmallVec;
use thiserror::Error;

use crate::config::MatchConfig;
use crate::types::{PlayerId, Position, TerritoryIndex};

/// Floor on edge cost so that two territories drawn at the same point still
/// have a positive distance between them.
pub const MIN_EDGE_COST: f32 = 1e-3;

/// A node in the map: a region that can be owned and garrisoned.
#[derive(Clone, Debug, PartialEq)]
pub struct Territory {
    pub index: TerritoryIndex,
    pub position: Position,
    /// Major city. Fixed at creation.
    pub is_capital: bool,
    /// `None` means unclaimed, in which case `troop_count` is 0.
    pub owner: Option<PlayerId>,
    pub troop_count: u32,
    neighbors: SmallVec<[TerritoryIndex; 6]>,
}

impl Territory {
    pub fn neighbors(&self) -> &[TerritoryIndex] {
        &self.neighbors
    }

    /// True if `player` is known and owns this territory.
    pub fn is_owned_by(&self, player: Option<PlayerId>) -> bool {
        self.owner.is_some() && self.owner == player
    }
}

/// Problems found while building a graph.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum MapError {
    #[error("territory {found} listed in slot {expected}: indices must be unique and run 0..n in order")]
    NonContiguousIndex {
        expected: TerritoryIndex,
        found: TerritoryIndex,
    },
    #[error("unknown territory {0}")]
    UnknownTerritory(TerritoryIndex),
    #[error("territory {0} lists itself as a neighbor")]
    SelfAdjacent(TerritoryIndex),
    #[error("{a} lists {b} as a neighbor but not the other way round")]
    Asymmetric { a: TerritoryIndex, b: TerritoryIndex },
}

#[derive(Clone, Debug, Default)]
pub struct TerritoryGraph {
    territories: Vec<Territory>,
}

impl TerritoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a graph from a map description.
    pub fn from_config(config: &MatchConfig) -> Result<Self, MapError> {
        let mut graph = Self::new();
        for (slot, tc) in config.territories.iter().enumerate() {
            let index = graph.add_territory(tc.position(), tc.capital);
            if index != tc.index {
                return Err(MapError::NonContiguousIndex {
                    expected: TerritoryIndex(slot as u32),
                    found: tc.index,
                });
            }
        }

        for tc in &config.territories {
            for &neighbor in &tc.neighbors {
                let Some(other) = config.territories.get(neighbor.as_usize()) else {
                    return Err(MapError::UnknownTerritory(neighbor));
                };
                if !other.neighbors.contains(&tc.index) {
                    return Err(MapError::Asymmetric {
                        a: tc.index,
                        b: neighbor,
                    });
                }
                graph.connect(tc.index, neighbor)?;
            }
        }
        Ok(graph)
    }

    /// Add an unclaimed, unconnected territory. Returns its index.
    pub fn add_territory(&mut self, position: Position, is_capital: bool) -> TerritoryIndex {
        let index = TerritoryIndex(self.territories.len() as u32);
        self.territories.push(Territory {
            index,
            position,
            is_capital,
            owner: None,
            troop_count: 0,
            neighbors: SmallVec::new(),
        });
        index
    }

    /// Make `a` and `b` neighbors of each other. Connecting an already
    /// adjacent pair is a no-op.
    pub fn connect(&mut self, a: TerritoryIndex, b: TerritoryIndex) -> Result<(), MapError> {
        if a == b {
            return Err(MapError::SelfAdjacent(a));
        }
        for idx in [a, b] {
            if !self.contains(idx) {
                return Err(MapError::UnknownTerritory(idx));
            }
        }
        if self.are_adjacent(a, b) {
            return Ok(());
        }
        self.territories[a.as_usize()].neighbors.push(b);
        self.territories[b.as_usize()].neighbors.push(a);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.territories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.territories.is_empty()
    }

    pub fn contains(&self, index: TerritoryIndex) -> bool {
        index.as_usize() < self.territories.len()
    }

    pub fn territory(&self, index: TerritoryIndex) -> Option<&Territory> {
        self.territories.get(index.as_usize())
    }

    pub(crate) fn territory_mut(&mut self, index: TerritoryIndex) -> Option<&mut Territory> {
        self.territories.get_mut(index.as_usize())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Territory> {
        self.territories.iter()
    }

    /// Neighbors of `index`; empty if the index is unknown.
    pub fn neighbors(&self, index: TerritoryIndex) -> &[TerritoryIndex] {
        match self.territory(index) {
            Some(territory) => territory.neighbors(),
            None => &[],
        }
    }

    pub fn are_adjacent(&self, a: TerritoryIndex, b: TerritoryIndex) -> bool {
        self.neighbors(a).contains(&b)
    }

    /// Cost of moving between two territories: the distance between their
    /// centres, never below `MIN_EDGE_COST`. `None` if either index is unknown.
    pub fn edge_cost(&self, a: TerritoryIndex, b: TerritoryIndex) -> Option<f32> {
        let pa = self.territory(a)?.position;
        let pb = self.territory(b)?.position;
        Some(pa.distance(pb).max(MIN_EDGE_COST))
    }

    /// Overwrite a territory's owner and troop count. An unclaimed territory
    /// always ends up with zero troops. Returns `false` (and changes nothing)
    /// if the index is unknown. Applying the same delta twice is the same as
    /// applying it once.
    pub fn apply_delta(
        &mut self,
        index: TerritoryIndex,
        owner: Option<PlayerId>,
        troop_count: u32,
    ) -> bool {
        let Some(territory) = self.territory_mut(index) else {
            return false;
        };
        territory.owner = owner;
        territory.troop_count = if owner.is_some() { troop_count } else { 0 };
        true
    }
}
