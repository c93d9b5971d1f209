//! Length-prefixed framing (§4.2, §3 "Frame"). A frame is a 4-byte
//! big-endian length header followed by that many bytes of UTF-8 JSON.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flux::net::{retry_eintr, Counters};
use std::io::{Read, Write};

/// Hard ceiling named by the specification; individual links may configure
/// a lower cap down to [`MIN_FRAME_BYTES`].
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 65536;
pub const MIN_FRAME_BYTES: u32 = 4096;

/// Writes one frame. Rejects oversized payloads before touching the socket.
/// Updates `counters` (§4.2 "Counters are maintained for `sent_ok`, ...,
/// `too_large`").
pub fn write_frame<W: Write>(stream: &mut W, payload: &[u8], max_frame_bytes: u32, counters: &Counters) -> Result<()> {
    if payload.is_empty() || payload.len() as u64 > u64::from(max_frame_bytes) {
        counters.record_too_large();
        return Err(Error::Net(flux::net::Error::TooLarge));
    }

    retry_eintr(|| {
        stream.write_u32::<BigEndian>(payload.len() as u32)?;
        stream.write_all(payload)?;
        stream.flush()
    })?;
    counters.record_sent_ok();
    Ok(())
}

/// Reads one frame. The declared length is validated against `(0,
/// max_frame_bytes]` before any payload bytes are read off the wire.
/// Updates `counters` (`too_large`/`recv_ok`).
pub fn read_frame<R: Read>(stream: &mut R, max_frame_bytes: u32, counters: &Counters) -> Result<Vec<u8>> {
    let len = retry_eintr(|| stream.read_u32::<BigEndian>())?;
    if len == 0 || len > max_frame_bytes {
        counters.record_too_large();
        return Err(Error::Net(flux::net::Error::TooLarge));
    }

    let mut buf = vec![0u8; len as usize];
    retry_eintr(|| stream.read_exact(&mut buf))?;
    counters.record_recv_ok();
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_frame() {
        let counters = Counters::new();
        let mut buf = Vec::new();
        write_frame(&mut buf, b"{\"hello\":true}", DEFAULT_MAX_FRAME_BYTES, &counters).unwrap();

        let mut cursor = Cursor::new(buf);
        let read_back = read_frame(&mut cursor, DEFAULT_MAX_FRAME_BYTES, &counters).unwrap();
        assert_eq!(read_back, b"{\"hello\":true}");
        assert_eq!(counters.snapshot().sent_ok, 1);
        assert_eq!(counters.snapshot().recv_ok, 1);
    }

    #[test]
    fn rejects_oversized_payload_before_writing() {
        let counters = Counters::new();
        let mut buf = Vec::new();
        let payload = vec![0u8; MIN_FRAME_BYTES as usize + 1];
        let err = write_frame(&mut buf, &payload, MIN_FRAME_BYTES, &counters).unwrap_err();
        assert!(matches!(err, Error::Net(flux::net::Error::TooLarge)));
        assert!(buf.is_empty());
        assert_eq!(counters.snapshot().too_large, 1);
    }

    #[test]
    fn rejects_declared_length_over_cap_without_reading_payload() {
        let counters = Counters::new();
        let mut raw = Vec::new();
        raw.write_u32::<BigEndian>(MIN_FRAME_BYTES + 1).unwrap();
        let mut cursor = Cursor::new(raw);
        let err = read_frame(&mut cursor, MIN_FRAME_BYTES, &counters).unwrap_err();
        assert!(matches!(err, Error::Net(flux::net::Error::TooLarge)));
        assert_eq!(counters.snapshot().too_large, 1);
    }

    #[test]
    fn rejects_zero_length_frame() {
        let counters = Counters::new();
        let mut raw = Vec::new();
        raw.write_u32::<BigEndian>(0).unwrap();
        let mut cursor = Cursor::new(raw);
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_BYTES, &counters).unwrap_err();
        assert!(matches!(err, Error::Net(flux::net::Error::TooLarge)));
    }
}
