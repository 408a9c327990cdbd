// Newline-delimited message framing over TCP.
//
// One message per line: the JSON payload followed by `\n`. Payloads produced
// by `serde_json` never contain a raw newline, so no escaping is needed.
// `read_line` also strips a trailing `\r` so hand-typed test traffic works.
//
// Like the rest of this crate the framing is format-agnostic: it moves
// `&[u8]` / `Vec<u8>`, and `message.rs` handles JSON.
//
// `MAX_LINE_SIZE` (16 MB) bounds the allocation a peer can force on us with a
// line that never ends. Full-map state messages are the largest expected
// lines.

use std::io::{self, BufRead, Read, Write};

/// Maximum allowed line length in bytes, excluding the newline.
pub const MAX_LINE_SIZE: usize = 16 * 1024 * 1024;

/// Write one line: payload, then `\n`, then flush.
pub fn write_line<W: Write>(writer: &mut W, msg: &[u8]) -> io::Result<()> {
    if msg.len() > MAX_LINE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("line too long: {} bytes (max {MAX_LINE_SIZE})", msg.len()),
        ));
    }
    if msg.contains(&b'\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "payload contains a newline",
        ));
    }
    writer.write_all(msg)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Read one line and return it without the line terminator.
///
/// Returns `UnexpectedEof` if the stream closes before a newline arrives
/// (including a clean close between lines). Returns `InvalidData` if more than
/// `MAX_LINE_SIZE` bytes arrive without a newline; the oversized prefix is
/// consumed, so call `skip_line` before reading on.
pub fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let limit = MAX_LINE_SIZE as u64 + 1;
    reader.by_ref().take(limit).read_until(b'\n', &mut buf)?;

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        return Ok(buf);
    }
    if buf.len() > MAX_LINE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {MAX_LINE_SIZE} bytes"),
        ));
    }
    Err(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "stream closed before end of line",
    ))
}

/// Discard input up to and including the next `\n`, without buffering it.
/// Resynchronizes a stream after `read_line` reported `InvalidData`.
/// Returns `UnexpectedEof` if the stream closes first.
pub fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let buf = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed before end of line",
            ));
        }
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = buf.len();
        reader.consume(len);
    }
}
