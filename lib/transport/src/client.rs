//! Outbound S2S connection helper (§4.2 "Client connect"). Used by the
//! Engine to reach the Session Server's S2S listener and by any S2S peer
//! dialing out.

use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::frame::{self, DEFAULT_MAX_FRAME_BYTES};
use flux::net::{Backoff, Counters};
use keyring::Keyring;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Connects to `addr`, retrying with bounded exponential backoff (§4.2)
/// until `total_deadline` elapses. Sets `TCP_NODELAY` on the accepted
/// socket, matching the reference transport's `set_nodelay()`.
pub fn connect_with_backoff(addr: impl ToSocketAddrs + Clone, total_deadline: Duration) -> Result<TcpStream> {
    let started = Instant::now();
    let mut backoff = Backoff::default();

    loop {
        match TcpStream::connect(addr.clone()) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => {
                if started.elapsed() >= total_deadline {
                    return Err(Error::from(e));
                }
                let delay = backoff.next_delay();
                if started.elapsed() + delay >= total_deadline {
                    return Err(Error::ConnectTimeout);
                }
                std::thread::sleep(delay);
            }
        }
    }
}

/// An established, authenticated S2S link: owns the socket, the local
/// identity, and the keyring used to sign outbound envelopes.
pub struct S2SLink {
    stream: TcpStream,
    local_id: String,
    max_frame_bytes: u32,
    counters: Arc<Counters>,
}

impl S2SLink {
    pub fn connect(addr: impl ToSocketAddrs + Clone, local_id: impl Into<String>, total_deadline: Duration) -> Result<S2SLink> {
        let stream = connect_with_backoff(addr, total_deadline)?;
        Ok(S2SLink {
            stream,
            local_id: local_id.into(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            counters: Arc::new(Counters::new()),
        })
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: u32) -> S2SLink {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub fn with_counters(mut self, counters: Arc<Counters>) -> S2SLink {
        self.counters = counters;
        self
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn set_timeouts(&self, read: Duration, write: Duration) -> Result<()> {
        self.stream.set_read_timeout(Some(read))?;
        self.stream.set_write_timeout(Some(write))?;
        Ok(())
    }

    /// Signs `envelope` with the keyring's default sender key and writes it
    /// as one frame.
    pub fn send(&mut self, envelope: &mut Envelope, keys: &Keyring) -> Result<()> {
        let (key_id, key) = keys.default_sender_key().ok_or(Error::UnknownKey)?;
        envelope.sign(&key_id, &key)?;
        let bytes = serde_json::to_vec(envelope)?;
        frame::write_frame(&mut self.stream, &bytes, self.max_frame_bytes, &self.counters)
    }

    /// Reads one frame and verifies it as an [`Envelope`] under `keys`.
    pub fn recv(&mut self, keys: &Keyring) -> Result<Envelope> {
        let bytes = frame::read_frame(&mut self.stream, self.max_frame_bytes, &self.counters)?;
        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        envelope.validate()?;

        let key_id = envelope.key_id.as_deref().ok_or(Error::UnknownKey)?;
        let key = keys.lookup(key_id).ok_or(Error::UnknownKey)?;
        if !envelope.verify(&key) {
            self.counters.record_auth_fail();
            return Err(Error::BadSignature);
        }
        Ok(envelope)
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use keyring::Keyring;
    use serde_json::json;
    use std::net::TcpListener;

    fn log() -> slog::Logger {
        flux::logging::test_logger()
    }

    /// §4.2/§8.5: a signature that fails to verify must increment
    /// `auth_fail`, exercised here over a real loopback socket rather than
    /// just the in-process `Envelope::verify` call.
    #[test]
    fn recv_records_auth_fail_on_bad_signature() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut envelope = Envelope::new("s2s.health", "session", "engine", json!({}));
            envelope.sign("k1", b"wrong-key-bytes1").unwrap();
            let bytes = serde_json::to_vec(&envelope).unwrap();
            frame::write_frame(&mut stream, &bytes, DEFAULT_MAX_FRAME_BYTES, &Counters::new()).unwrap();
        });

        let mut link = S2SLink::connect(addr, "engine", Duration::from_secs(2)).unwrap();
        let keys = Keyring::new();
        keys.install_default_from_db(vec![("k1".to_owned(), base64::encode(b"right-key-bytes1"), true)], &log()).unwrap();

        let err = link.recv(&keys).unwrap_err();
        assert!(matches!(err, Error::BadSignature));
        assert_eq!(link.counters().snapshot().auth_fail, 1);

        server.join().unwrap();
    }
}
