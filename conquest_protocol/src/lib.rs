// conquest_protocol — wire protocol for Conquest peer synchronization.
//
// Defines the message types, framing, and serialization that game clients
// (`conquest_relay::client`) and the relay server (`conquest_relay::server`)
// exchange over TCP. Shared by both sides; no dependency on the map crate.
//
// Module overview:
// - `types.rs`:    `PlayerId`, `TerritoryIndex`, `Color`.
// - `message.rs`:  `WireMessage` (identity assignment | state update) and its
//                  payload structs, plus `encode`/`decode`.
// - `framing.rs`:  Newline-delimited framing over any `BufRead`/`Write`.
//
// Design decisions:
// - **JSON lines.** One UTF-8 JSON object per line, so the stream can be
//   inspected with netcat and peers in other languages can speak it.
// - **Tagged enum in memory, shape-sniffing only at decode.** The wire has no
//   type tag; `message.rs` decides the variant once.
// - **No async runtime.** Framing works on `std::io` traits and blocking TCP.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_LINE_SIZE, read_line, skip_line, write_line};
pub use message::{
    CapitalRef, DecodeError, PlayerSummary, StateUpdate, TileDelta, UNCLAIMED_OWNER, WireMessage,
    decode, encode,
};
pub use types::{Color, ParseColorError, PlayerId, TerritoryIndex};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn framed_state_update_survives_the_wire() {
        let msg = WireMessage::StateUpdate(StateUpdate {
            player: PlayerSummary {
                id: PlayerId(3),
                color: Color::rgb(0x22, 0x8B, 0x22),
                capital: CapitalRef {
                    index: TerritoryIndex(2),
                },
            },
            tiles: vec![
                TileDelta {
                    index: TerritoryIndex(2),
                    owner: Some(PlayerId(3)),
                    troop_count: 40,
                },
                TileDelta {
                    index: TerritoryIndex(7),
                    owner: None,
                    troop_count: 0,
                },
            ],
        });

        let mut wire = Vec::new();
        write_line(&mut wire, &encode(&msg).unwrap()).unwrap();
        write_line(&mut wire, &encode(&WireMessage::IdentityAssignment { id: PlayerId(4) }).unwrap())
            .unwrap();

        let mut cursor = Cursor::new(&wire);
        assert_eq!(decode(&read_line(&mut cursor).unwrap()).unwrap(), msg);
        assert_eq!(
            decode(&read_line(&mut cursor).unwrap()).unwrap(),
            WireMessage::IdentityAssignment { id: PlayerId(4) }
        );
    }
}
