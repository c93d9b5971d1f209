//! Typed persistence abstraction handlers call into (§4.9). Ships one
//! concrete in-memory implementation; the relational schema and SQL stored
//! procedures are out of scope (§1).

pub mod error;
pub mod memory;
pub mod model;
pub mod traits;

pub use error::{Error, Result};
pub use memory::InMemoryRepository;
pub use traits::{DeadLetterRow, EventId, EventLog, EventRow, Repository};
