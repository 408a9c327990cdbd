// Test-only peer for multiplayer integration tests.
//
// Wraps the real `PeerSyncClient` (from `conquest_relay::client`), a real
// `MatchState` and a `DispatchController` wired to the client's `SyncHandle`,
// giving a synchronous, test-friendly API for exercising the full pipeline:
// relay -> identity -> dispatch -> state line -> relay -> peer merge.
//
// The only test-specific code here is the blocking polling wrappers around
// `PeerSyncClient::tick()`. All networking and state logic uses the same
// code paths as a real game.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use conquest_core::{
    ChangeNotifier, DispatchController, DispatchReport, MatchConfig, MatchState, Player,
    TerritoryGraph,
};
use conquest_protocol::{Color, PlayerId, TerritoryIndex};
use conquest_relay::{
    IngestReport, PeerSyncClient, SyncConfig, SyncError, SyncHandle, SyncPolicy, TickOutcome,
};

/// Default timeout for blocking poll operations.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Four territories: 0 and 2 are capitals, joined by a short route through
/// 1 and a longer one through 3.
pub const TEST_MAP: &str = r#"{"territories": [
    {"index": 0, "x": 0.0,  "y": 0.0,  "capital": true, "neighbors": [1, 3]},
    {"index": 1, "x": 30.0, "y": 0.0,  "neighbors": [0, 2]},
    {"index": 2, "x": 60.0, "y": 0.0,  "capital": true, "neighbors": [1, 3]},
    {"index": 3, "x": 30.0, "y": 40.0, "neighbors": [0, 2]}
]}"#;

/// A test peer wrapping a real client, match state and dispatcher.
pub struct TestPeer {
    client: PeerSyncClient,
    pub state: MatchState,
    pub dispatch: DispatchController<SyncHandle>,
}

impl TestPeer {
    /// Connect to a relay with `SyncPolicy::Changed` and load `TEST_MAP`.
    pub fn connect(addr: SocketAddr, color: Color, capital: u32) -> Self {
        Self::connect_with_policy(addr, color, capital, SyncPolicy::Changed)
    }

    pub fn connect_with_policy(
        addr: SocketAddr,
        color: Color,
        capital: u32,
        policy: SyncPolicy,
    ) -> Self {
        let config = SyncConfig {
            addr: addr.to_string(),
            policy,
            ..SyncConfig::default()
        };
        let client = PeerSyncClient::connect(&config).expect("TestPeer::connect failed");
        let map = MatchConfig::from_json(TEST_MAP).expect("test map parses");
        let graph = TerritoryGraph::from_config(&map).expect("test map is valid");
        let state = MatchState::new(graph, Player::new(color, TerritoryIndex(capital)));
        let dispatch = DispatchController::new(client.handle());
        Self {
            client,
            state,
            dispatch,
        }
    }

    pub fn id(&self) -> Option<PlayerId> {
        self.state.local_id()
    }

    /// One sync frame.
    pub fn tick(&mut self) -> Result<(IngestReport, TickOutcome), SyncError> {
        self.client.tick(&mut self.state)
    }

    /// Tick until `done` holds for the state, panicking after `POLL_TIMEOUT`.
    /// Returns the ingest reports seen along the way.
    pub fn poll_until(
        &mut self,
        what: &str,
        done: impl Fn(&MatchState) -> bool,
    ) -> Vec<IngestReport> {
        let start = Instant::now();
        let mut reports = Vec::new();
        loop {
            let (report, _) = self.tick().expect("tick failed");
            reports.push(report);
            if done(&self.state) {
                return reports;
            }
            assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Block until the relay has assigned this peer an ID.
    pub fn wait_for_identity(&mut self) -> PlayerId {
        self.poll_until("identity", |state| state.local_id().is_some());
        self.id().expect("identity was just assigned")
    }

    /// Take the capital with `troops` and mark it for the next send.
    pub fn claim_capital(&mut self, troops: u32) {
        let capital = self.state.local.capital();
        let owner = self.state.local_id();
        self.state.graph.apply_delta(capital, owner, troops);
        self.dispatch.notifier().territory_changed(capital);
    }

    /// Select `sources`, then `destination`, then send `amount` from each.
    pub fn send_troops(&mut self, sources: &[u32], destination: u32, amount: u32) -> DispatchReport {
        let sources: Vec<TerritoryIndex> = sources.iter().copied().map(TerritoryIndex).collect();
        self.dispatch.commit_sources(&self.state, &sources);
        self.dispatch
            .commit_destination(&self.state, TerritoryIndex(destination));
        self.dispatch.send_amount(&mut self.state, amount)
    }

    /// Tick until the connection reports `Disconnected`.
    pub fn wait_for_disconnect(&mut self) {
        let start = Instant::now();
        loop {
            match self.tick() {
                Err(SyncError::Disconnected(_)) => return,
                // The write side can notice first; the reader reports
                // `Disconnected` on a later tick.
                Err(SyncError::Write(_)) => {}
                Err(e) => panic!("expected Disconnected, got {e}"),
                Ok(_) => {}
            }
            assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for disconnect");
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Troop count and owner of a territory in this peer's view.
    pub fn territory(&self, index: u32) -> (Option<PlayerId>, u32) {
        let t = self
            .state
            .graph
            .territory(TerritoryIndex(index))
            .expect("territory exists");
        (t.owner, t.troop_count)
    }
}
