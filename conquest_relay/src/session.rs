// Session state for the relay server.
//
// `Session` is the data structure `server.rs` drives from its single main
// thread: the connected players, their write halves, and the latest line each
// one sent. There is no internal locking.
//
// Responsibilities:
// - Identity: each new connection gets the next `PlayerId` (starting at 1,
//   never reused) and an identity-assignment line as its first message.
// - Late join: right after the identity line, a newcomer is sent the most
//   recent line from every other player, so it learns about existing peers
//   without waiting for their next tick.
// - Fan-out: a line from one player is forwarded verbatim to all others. The
//   relay does not parse or validate state lines.
//
// Every client stream carries a write timeout, so a client that stops reading
// cannot stall the main thread once its socket buffer fills. Any failed write
// (timeout or broken pipe) drops that client; its reader thread then sees the
// closed socket and reports a disconnect, which is a no-op by then.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use conquest_protocol::framing::write_line;
use conquest_protocol::message::{WireMessage, encode};
use conquest_protocol::types::PlayerId;
use log::{info, warn};

/// Player set and fan-out for one relay.
pub struct Session {
    players: BTreeMap<PlayerId, PeerConnection>,
    next_player_id: u32,
    max_players: u32,
    write_timeout: Duration,
}

struct PeerConnection {
    writer: BufWriter<TcpStream>,
    last_line: Option<Vec<u8>>,
}

impl Session {
    pub fn new(max_players: u32, write_timeout: Duration) -> Self {
        Self {
            players: BTreeMap::new(),
            next_player_id: 1,
            max_players,
            // `set_write_timeout` rejects a zero duration.
            write_timeout: write_timeout.max(Duration::from_millis(1)),
        }
    }

    /// Admit a new connection. Sends the identity assignment and the latest
    /// line from every existing player, then returns the assigned ID.
    pub fn add_player(&mut self, stream: TcpStream) -> Result<PlayerId, String> {
        if self.players.len() as u32 >= self.max_players {
            return Err("session is full".into());
        }

        stream
            .set_write_timeout(Some(self.write_timeout))
            .map_err(|e| format!("set write timeout failed: {e}"))?;
        let id = PlayerId(self.next_player_id);
        let mut writer = BufWriter::new(stream);
        let identity = encode(&WireMessage::IdentityAssignment { id }).map_err(|e| e.to_string())?;
        write_line(&mut writer, &identity).map_err(|e| format!("send identity failed: {e}"))?;
        self.next_player_id += 1;

        for (other, peer) in &self.players {
            let Some(line) = &peer.last_line else {
                continue;
            };
            if let Err(e) = write_line(&mut writer, line) {
                writer.get_ref().shutdown(Shutdown::Both).ok();
                return Err(format!("replaying {other}'s state to {id} failed: {e}"));
            }
        }

        self.players.insert(
            id,
            PeerConnection {
                writer,
                last_line: None,
            },
        );
        info!("player {id} joined ({} connected)", self.players.len());
        Ok(id)
    }

    /// Drop a player and close its socket.
    pub fn remove_player(&mut self, player_id: PlayerId) {
        if let Some(peer) = self.players.remove(&player_id) {
            peer.writer.get_ref().shutdown(Shutdown::Both).ok();
            info!("player {player_id} left ({} connected)", self.players.len());
        }
    }

    /// Remember `line` as the sender's latest and forward it to everyone else.
    pub fn relay_line(&mut self, from: PlayerId, line: Vec<u8>) {
        if !self.players.contains_key(&from) {
            return;
        }
        let mut failed = Vec::new();
        for (id, peer) in self.players.iter_mut() {
            if *id == from {
                continue;
            }
            if let Err(e) = write_line(&mut peer.writer, &line) {
                warn!("forwarding to {id} failed, dropping it: {e}");
                failed.push(*id);
            }
        }
        for id in failed {
            self.remove_player(id);
        }
        if let Some(sender) = self.players.get_mut(&from) {
            sender.last_line = Some(line);
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    /// Shut down every connection, unblocking the reader threads.
    pub fn close_all(&mut self) {
        for (_, peer) in std::mem::take(&mut self.players) {
            peer.writer.get_ref().shutdown(Shutdown::Both).ok();
        }
    }
}
