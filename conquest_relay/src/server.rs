// TCP server and main event loop for the relay.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread**: non-blocking `accept()` loop that sends
//   `InternalEvent::NewConnection` to the main thread and polls
//   `keep_running` between attempts.
// - **Reader threads** (one per client): call `framing::read_line()` in a
//   loop and send `InternalEvent::LineFrom` to the main thread. On EOF, a read
//   error or an oversized line, send `InternalEvent::Disconnected`.
// - **Main thread**: owns the `Session` and applies events in arrival order.
//   `recv_timeout` bounds how long a stop request can go unnoticed.
//
// The main thread is the only writer to client streams. Reader threads only
// read, so no stream is ever written from two threads. Writes are bounded by
// `RelayConfig::write_timeout_ms`; a client that cannot keep up is dropped
// rather than allowed to stall forwarding and shutdown.
//
// Shutdown: `RelayHandle::stop` clears `keep_running`; the main loop then
// closes every connection, which unblocks the reader threads.

use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use conquest_protocol::framing::read_line;
use conquest_protocol::types::PlayerId;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::session::Session;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_PLAYERS: u32 = 8;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 2000;

/// How often the listener and main loop look at `keep_running`.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    NewConnection { stream: TcpStream },
    LineFrom { player_id: PlayerId, line: Vec<u8> },
    Disconnected { player_id: PlayerId },
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        self.join();
    }

    /// Block until the relay exits on its own.
    pub fn wait(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a relay server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub port: u16,
    pub max_players: u32,
    /// How long one write to a client may block before that client is
    /// dropped.
    pub write_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.into(),
            port: DEFAULT_PORT,
            max_players: DEFAULT_MAX_PLAYERS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

/// Start the relay server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used
/// to let the OS pick a free port).
pub fn start_relay(config: RelayConfig) -> io::Result<(RelayHandle, SocketAddr)> {
    let listener = TcpListener::bind((config.bind_addr.as_str(), config.port))?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    let thread = thread::Builder::new()
        .name("conquest-relay".into())
        .spawn(move || run_relay(listener, config, keep_running_clone))?;

    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main relay loop. Runs until `keep_running` is set to false.
fn run_relay(listener: TcpListener, config: RelayConfig, keep_running: Arc<AtomicBool>) {
    let mut session = Session::new(
        config.max_players,
        Duration::from_millis(config.write_timeout_ms),
    );
    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    if let Err(e) = listener.set_nonblocking(true) {
        warn!("listener cannot be made non-blocking: {e}");
    }

    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    let spawned = thread::Builder::new()
        .name("conquest-relay-accept".into())
        .spawn(move || accept_loop(listener, tx_listener, keep_running_listener));
    if let Err(e) = spawned {
        warn!("cannot start accept thread: {e}");
        return;
    }

    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                handle_event(&mut session, event, &tx);
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut session, event, &tx);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("relay stopping, closing {} connection(s)", session.player_count());
    session.close_all();
}

fn accept_loop(listener: TcpListener, tx: Sender<InternalEvent>, keep_running: Arc<AtomicBool>) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("accepted connection from {addr}");
                stream.set_nonblocking(false).ok();
                if tx.send(InternalEvent::NewConnection { stream }).is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                warn!("accept failed: {e}");
                break;
            }
        }
    }
}

/// Dispatch a single event to the session.
fn handle_event(session: &mut Session, event: InternalEvent, tx: &Sender<InternalEvent>) {
    match event {
        InternalEvent::NewConnection { stream } => handle_new_connection(session, stream, tx),
        InternalEvent::LineFrom { player_id, line } => session.relay_line(player_id, line),
        InternalEvent::Disconnected { player_id } => session.remove_player(player_id),
    }
}

/// Admit a new connection and spawn its reader thread. Connections the
/// session refuses are closed without a reply.
fn handle_new_connection(session: &mut Session, stream: TcpStream, tx: &Sender<InternalEvent>) {
    let read_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!("cannot clone client stream: {e}");
            return;
        }
    };

    let player_id = match session.add_player(stream) {
        Ok(id) => id,
        Err(reason) => {
            info!("refusing connection: {reason}");
            read_stream.shutdown(std::net::Shutdown::Both).ok();
            return;
        }
    };

    let tx_reader = tx.clone();
    let spawned = thread::Builder::new()
        .name(format!("conquest-relay-{player_id}"))
        .spawn(move || reader_loop(BufReader::new(read_stream), player_id, tx_reader));
    if let Err(e) = spawned {
        warn!("cannot start reader for {player_id}: {e}");
        session.remove_player(player_id);
    }
}

/// Reader loop for a single client. Runs in its own thread.
fn reader_loop(mut reader: BufReader<TcpStream>, player_id: PlayerId, tx: Sender<InternalEvent>) {
    loop {
        match read_line(&mut reader) {
            Ok(line) if line.is_empty() => {}
            Ok(line) => {
                if tx.send(InternalEvent::LineFrom { player_id, line }).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("reader for {player_id} stopping: {e}");
                let _ = tx.send(InternalEvent::Disconnected { player_id });
                break;
            }
        }
    }
}
