// conquest_core — map state, routing and troop dispatch for Conquest.
//
// This crate holds everything about a match that is not networking or
// rendering: the territory graph, A* routing, the selection/dispatch state
// machine, players and the peer roster, and the merge of inbound wire
// messages into local state. It depends on `conquest_protocol` for the shared
// ID types and message structs, and on nothing that does I/O.
//
// Module overview:
// - `types.rs`:       `Position`, plus re-exported protocol IDs and `Color`.
// - `config.rs`:      `MatchConfig`, the JSON map description.
// - `graph.rs`:       `TerritoryGraph`, `Territory`, `MapError`.
// - `pathfinding.rs`: `RouteFinder` trait and the `AStar` implementation.
// - `player.rs`:      `Player`, `PeerRoster`.
// - `state.rs`:       `MatchState` and the inbound merge / outbound snapshot.
// - `dispatch.rs`:    `DispatchController`, `ChangeNotifier`, traveling units.
//
// Concurrency: nothing here is shared across threads. The host owns one
// `MatchState` and applies inbound messages to it between frames (see
// `conquest_relay::client`), so dispatch and merge never interleave.

pub mod config;
pub mod dispatch;
pub mod graph;
pub mod pathfinding;
pub mod player;
pub mod state;
pub mod types;

pub use config::{MatchConfig, TerritoryConfig};
pub use dispatch::{
    ChangeNotifier, DispatchController, DispatchReport, GARRISON_FLOOR, Selection,
    SelectionOutcome, SelectionPhase, SourceOutcome, TravelingUnit, TroopOrder,
};
pub use graph::{MapError, Territory, TerritoryGraph};
pub use pathfinding::{AStar, Route, RouteFinder};
pub use player::{PeerRoster, Player};
pub use state::{MatchState, MergeOutcome};
