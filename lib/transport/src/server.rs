//! Listen/accept side of the S2S link (§4.2 "Server listen/accept"), plus
//! the peer/nonce gates a freshly accepted connection must pass before its
//! envelopes reach a handler.

use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::frame::{self, DEFAULT_MAX_FRAME_BYTES};
use crate::peer::PeerRegistry;
use flux::net::Counters;
use flux::time::timestamp_secs;
use keyring::Keyring;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Accepts one connection, blocking up to `deadline`. Returns `Ok(None)` on
/// timeout rather than erroring, since a timed-out accept is an expected,
/// routine occurrence in the listener's poll loop.
pub fn accept_with_deadline(listener: &TcpListener, deadline: Duration) -> Result<Option<TcpStream>> {
    listener.set_nonblocking(true)?;
    let started = Instant::now();

    loop {
        match listener.accept() {
            Ok((stream, _addr)) => {
                listener.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                return Ok(Some(stream));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if started.elapsed() >= deadline {
                    listener.set_nonblocking(false)?;
                    return Ok(None);
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                listener.set_nonblocking(false)?;
                return Err(Error::from(e));
            }
        }
    }
}

/// A server-side S2S connection: receives and validates inbound envelopes
/// against the keyring, peer registry, and nonce cache before a handler
/// ever sees them.
pub struct S2SConnection {
    stream: TcpStream,
    max_frame_bytes: u32,
    counters: Arc<Counters>,
}

impl S2SConnection {
    pub fn new(stream: TcpStream) -> S2SConnection {
        S2SConnection {
            stream,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            counters: Arc::new(Counters::new()),
        }
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: u32) -> S2SConnection {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub fn with_counters(mut self, counters: Arc<Counters>) -> S2SConnection {
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

    /// Reads, authenticates, and replay-checks one inbound envelope.
    /// Refuses the handshake (peer lookup, `enabled`) before touching
    /// authentication, per §4.5.
    pub fn recv_authenticated(&mut self, keys: &Keyring, peers: &PeerRegistry) -> Result<Envelope> {
        let bytes = frame::read_frame(&mut self.stream, self.max_frame_bytes, &self.counters)?;
        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        envelope.validate()?;

        let peer = peers.get(&envelope.src).ok_or(Error::UnknownPeer)?;
        if !peer.enabled {
            return Err(Error::PeerDisabled);
        }

        let key_id = envelope.key_id.as_deref().ok_or(Error::UnknownKey)?;
        let key = keys.lookup(key_id).ok_or(Error::UnknownKey)?;
        if !envelope.verify(&key) {
            self.counters.record_auth_fail();
            return Err(Error::BadSignature);
        }

        if !peers.nonce_check_and_insert(&envelope.src, &envelope.id, envelope.ts) {
            return Err(Error::Replay);
        }

        peers.touch_last_seen(&envelope.src);
        Ok(envelope)
    }

    /// Signs and writes a reply envelope using the keyring's default sender
    /// key.
    pub fn send(&mut self, envelope: &mut Envelope, keys: &Keyring) -> Result<()> {
        let (key_id, key) = keys.default_sender_key().ok_or(Error::UnknownKey)?;
        envelope.sign(&key_id, &key)?;
        let bytes = serde_json::to_vec(envelope)?;
        frame::write_frame(&mut self.stream, &bytes, self.max_frame_bytes, &self.counters)
    }
}

/// Convenience for a background sweeper task: evicts nonce entries older
/// than `window_secs`, using the current wall clock.
pub fn sweep_nonces(peers: &PeerRegistry, window_secs: i64) {
    peers.nonce_cleanup(window_secs, timestamp_secs() as i64);
}
