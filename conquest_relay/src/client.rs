// TCP client that keeps a `MatchState` in sync with peers through the relay.
//
// Architecture:
// - `connect()` opens the TCP connection on the calling thread, then spawns a
//   background reader thread.
// - The reader thread calls `read_line()` in a loop, decodes each line into a
//   `WireMessage` and pushes it into an `mpsc` channel. Malformed and
//   oversized lines are logged and reported as `DecodeFailed`; the loop keeps
//   going, skipping the rest of an oversized line first. EOF or a read error pushes `Closed` and ends the thread.
// - The host thread owns the `MatchState`. Each frame it calls `tick()`,
//   which drains the inbox into the state (`ingest`) and then writes one
//   outbound state line (`send_state`). Inbound merges and local dispatch
//   therefore never run concurrently and need no locking.
//
// Under `SyncPolicy::Changed`, only territories reported through a
// `SyncHandle` since the last successful send go out. The handle is the
// `ChangeNotifier` given to the `DispatchController`; inbound merges do not
// go through it, so echoing a peer's state back is avoided.
//
// Cancellation: `shutdown()` closes the socket in both directions, which
// unblocks the reader, then joins it. `Drop` does the same.

use std::collections::BTreeSet;
use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use conquest_core::{ChangeNotifier, MatchState, MergeOutcome};
use conquest_protocol::framing::{read_line, skip_line, write_line};
use conquest_protocol::message::{WireMessage, decode, encode};
use conquest_protocol::types::{PlayerId, TerritoryIndex};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Which territories go into each outbound state line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Every territory, every tick.
    #[default]
    Full,
    /// Only territories changed locally since the last send.
    Changed,
}

/// Client connection settings. Missing JSON fields take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub addr: String,
    pub connect_timeout_ms: u64,
    pub policy: SyncPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.into(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            policy: SyncPolicy::Full,
        }
    }
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn connect_timeout(&self) -> Duration {
        // `connect_timeout` rejects a zero duration.
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }
}

/// What the reader thread hands to the host thread.
enum InboundEvent {
    Message(WireMessage),
    DecodeFailed,
    Closed,
}

/// Result of draining the inbox into the match state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// One entry per decoded message, in arrival order.
    pub merged: Vec<MergeOutcome>,
    /// Lines that were malformed or oversized.
    pub decode_failures: usize,
}

impl IngestReport {
    /// The last identity assignment in this batch, if any.
    pub fn identity(&self) -> Option<PlayerId> {
        self.merged.iter().rev().find_map(|outcome| match outcome {
            MergeOutcome::IdentityAssigned(id) => Some(*id),
            _ => None,
        })
    }

    pub fn new_peers(&self) -> Vec<PlayerId> {
        self.merged
            .iter()
            .filter_map(|outcome| match outcome {
                MergeOutcome::StateApplied { new_peer, .. } => *new_peer,
                _ => None,
            })
            .collect()
    }
}

/// Result of one outbound step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A state line carrying this many territories was written.
    Sent { tiles: usize },
    /// Nothing was sent: the relay has not assigned an ID yet.
    AwaitingIdentity,
}

/// Cloneable sink for local territory changes. Pass it to
/// `DispatchController::new` so dispatches mark territories for the next send.
#[derive(Clone, Debug)]
pub struct SyncHandle {
    tx: Sender<TerritoryIndex>,
}

impl ChangeNotifier for SyncHandle {
    fn territory_changed(&self, index: TerritoryIndex) {
        // The client may already be gone; a lost mark is harmless then.
        let _ = self.tx.send(index);
    }
}

/// Connection to the relay plus the background reader.
pub struct PeerSyncClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<InboundEvent>,
    changes_tx: Sender<TerritoryIndex>,
    changes: Receiver<TerritoryIndex>,
    pending: BTreeSet<TerritoryIndex>,
    policy: SyncPolicy,
    peer_addr: SocketAddr,
    reader_thread: Option<JoinHandle<()>>,
}

impl PeerSyncClient {
    /// Connect to the relay and start the reader thread.
    pub fn connect(config: &SyncConfig) -> Result<Self, SyncError> {
        let failure = |source: io::Error| SyncError::ConnectionFailure {
            addr: config.addr.clone(),
            source,
        };

        let stream = open_stream(&config.addr, config.connect_timeout()).map_err(failure)?;
        let peer_addr = stream.peer_addr().map_err(failure)?;
        let reader_stream = stream.try_clone().map_err(failure)?;

        let (tx, inbox) = mpsc::channel();
        let reader_thread = thread::Builder::new()
            .name("conquest-sync-reader".into())
            .spawn(move || reader_loop(BufReader::new(reader_stream), tx))
            .map_err(failure)?;

        let (changes_tx, changes) = mpsc::channel();
        info!("connected to relay at {peer_addr}");
        Ok(Self {
            writer: BufWriter::new(stream),
            inbox,
            changes_tx,
            changes,
            pending: BTreeSet::new(),
            policy: config.policy,
            peer_addr,
            reader_thread: Some(reader_thread),
        })
    }

    /// A change sink feeding this client's pending set.
    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            tx: self.changes_tx.clone(),
        }
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Merge every queued inbound message into `state`, without blocking.
    /// Messages queued ahead of a disconnect are still merged, and their
    /// report travels in `SyncError::Disconnected`.
    pub fn ingest(&mut self, state: &mut MatchState) -> Result<IngestReport, SyncError> {
        let mut report = IngestReport::default();
        loop {
            match self.inbox.try_recv() {
                Ok(InboundEvent::Message(msg)) => report.merged.push(state.merge(&msg)),
                Ok(InboundEvent::DecodeFailed) => report.decode_failures += 1,
                Ok(InboundEvent::Closed) | Err(TryRecvError::Disconnected) => {
                    return Err(SyncError::Disconnected(report));
                }
                Err(TryRecvError::Empty) => return Ok(report),
            }
        }
    }

    /// Write one state line for the local player. Before the relay assigns
    /// an ID this sends nothing and keeps any pending marks.
    pub fn send_state(&mut self, state: &MatchState) -> Result<TickOutcome, SyncError> {
        self.pending.extend(self.changes.try_iter());

        let update = match self.policy {
            SyncPolicy::Full => state.full_state_update(),
            SyncPolicy::Changed => state.state_update(self.pending.iter().copied()),
        };
        let Some(update) = update else {
            return Ok(TickOutcome::AwaitingIdentity);
        };

        let tiles = update.tiles.len();
        let line = encode(&WireMessage::StateUpdate(update))?;
        write_line(&mut self.writer, &line).map_err(SyncError::Write)?;
        self.pending.clear();
        debug!("sent state with {tiles} tile(s)");
        Ok(TickOutcome::Sent { tiles })
    }

    /// One frame of sync: ingest, then send.
    pub fn tick(&mut self, state: &mut MatchState) -> Result<(IngestReport, TickOutcome), SyncError> {
        let report = self.ingest(state)?;
        let outcome = self.send_state(state)?;
        Ok((report, outcome))
    }

    /// Close the connection and join the reader thread. Safe to call twice.
    pub fn shutdown(&mut self) {
        let Some(reader) = self.reader_thread.take() else {
            return;
        };
        if let Err(e) = self.writer.get_ref().shutdown(Shutdown::Both) {
            debug!("socket shutdown: {e}");
        }
        if reader.join().is_err() {
            warn!("sync reader thread panicked");
        }
        info!("disconnected from relay at {}", self.peer_addr);
    }
}

impl Drop for PeerSyncClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Resolve `addr` and try each address in turn.
fn open_stream(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for candidate in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    }))
}

fn reader_loop(mut reader: BufReader<TcpStream>, tx: Sender<InboundEvent>) {
    loop {
        let event = match read_line(&mut reader) {
            Ok(line) => match decode(&line) {
                Ok(msg) => InboundEvent::Message(msg),
                Err(e) => {
                    warn!("discarding malformed line: {e}");
                    InboundEvent::DecodeFailed
                }
            },
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!("discarding oversized line: {e}");
                if let Err(e) = skip_line(&mut reader) {
                    debug!("sync reader stopping: {e}");
                    let _ = tx.send(InboundEvent::DecodeFailed);
                    let _ = tx.send(InboundEvent::Closed);
                    break;
                }
                InboundEvent::DecodeFailed
            }
            Err(e) => {
                debug!("sync reader stopping: {e}");
                let _ = tx.send(InboundEvent::Closed);
                break;
            }
        };
        if tx.send(event).is_err() {
            break;
        }
    }
}
