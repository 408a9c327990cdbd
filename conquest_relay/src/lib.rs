// conquest_relay — networking for Conquest multiplayer.
//
// Two halves share this crate:
// - the peer-sync client that a game process uses to exchange territory
//   state with other players, and
// - the relay server those clients connect to. The relay hands out player
//   IDs and forwards newline-delimited JSON between clients verbatim. It
//   keeps each client's latest line so late joiners catch up at once.
//
// Module overview:
// - `client.rs`:  `PeerSyncClient`, `SyncConfig`, `SyncHandle`. Background
//                 reader thread plus an `mpsc` inbox drained once per tick.
// - `error.rs`:   `SyncError`.
// - `session.rs`: Relay session state: player set, ID assignment, fan-out.
// - `server.rs`:  TCP listener, reader threads (one per client), and the
//                 main event loop driving the `Session`.
//
// Dependencies: `conquest_protocol` for framing and message types,
// `conquest_core` for the `MatchState` the client merges into. The relay
// server itself only needs the protocol crate.
//
// The relay can run as a standalone binary (`main.rs`) or be embedded in a
// process via the library API (`start_relay`), which the tests do.

pub mod client;
pub mod error;
pub mod server;
pub mod session;

pub use client::{IngestReport, PeerSyncClient, SyncConfig, SyncHandle, SyncPolicy, TickOutcome};
pub use error::SyncError;
pub use server::{RelayConfig, RelayHandle, start_relay};
