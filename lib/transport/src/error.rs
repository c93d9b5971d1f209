//! Closed error taxonomy for the transport crate (§4.2/§7), in the style of
//! `t51core::net::result::Error`: one enum per crate, `From<io::Error>`
//! wired up, nothing stringly-typed crossing the boundary except the final
//! enveloped `message`.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    Net(flux::net::Error),
    Json(serde_json::Error),
    /// The envelope failed minimal structural validation (§3 "S2S
    /// Envelope").
    InvalidEnvelope(&'static str),
    /// No key installed under the envelope's `key_id`.
    UnknownKey,
    /// Signature did not verify under the named key.
    BadSignature,
    /// `(peer_id, nonce)` was already seen within the retention window.
    Replay,
    /// The peer is known but `enabled = false`.
    PeerDisabled,
    /// The peer id on the envelope has no registry entry.
    UnknownPeer,
    /// The bounded-backoff connect loop exceeded its total deadline.
    ConnectTimeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Net(e) => write!(f, "transport error: {:?}", e),
            Error::Json(e) => write!(f, "json error: {}", e),
            Error::InvalidEnvelope(reason) => write!(f, "invalid envelope: {}", reason),
            Error::UnknownKey => write!(f, "unknown key_id"),
            Error::BadSignature => write!(f, "signature verification failed"),
            Error::Replay => write!(f, "replayed nonce"),
            Error::PeerDisabled => write!(f, "peer disabled"),
            Error::UnknownPeer => write!(f, "unknown peer"),
            Error::ConnectTimeout => write!(f, "connect deadline exceeded"),
        }
    }
}

impl std::error::Error for Error {}

impl From<flux::net::Error> for Error {
    fn from(e: flux::net::Error) -> Self {
        Error::Net(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Net(flux::net::Error::from(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;
