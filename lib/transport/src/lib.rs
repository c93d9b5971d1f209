//! Inter-process messaging transport: framing, envelopes, schema
//! validation, and the peer/nonce gates that sit between them (§4.2-4.5).

pub mod client;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod peer;
pub mod schema;
pub mod server;

pub use envelope::{Envelope, EnvelopeErrorBody};
pub use error::{Error, Result};
pub use peer::{Peer, PeerRegistry};
pub use schema::SchemaRegistry;
