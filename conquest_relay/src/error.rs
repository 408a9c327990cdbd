// Errors surfaced by `PeerSyncClient` to the host.
//
// All of these are transport-level: the host decides whether to end the
// session or build a fresh client. Malformed inbound lines are not errors at
// this level; the reader thread drops them and they are counted in
// `IngestReport::decode_failures`.

use std::io;

use thiserror::Error;

use crate::client::IngestReport;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Could not open the connection.
    #[error("cannot connect to {addr}: {source}")]
    ConnectionFailure {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// The inbound side saw end-of-stream or a read error. Carries what
    /// was merged from the inbox ahead of the disconnect.
    #[error("connection to relay lost")]
    Disconnected(IngestReport),
    /// Writing an outbound state line failed.
    #[error("failed to send state: {0}")]
    Write(#[source] io::Error),
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}
