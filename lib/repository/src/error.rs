//! Closed error taxonomy for repository operations (§4.9, §7), in the style
//! of `t51core::net::result::Error`: typed failures, nothing stringly-typed
//! crossing the boundary.

use std::fmt;

#[derive(Debug, Eq, PartialEq, Clone)]
#[repr(u32)]
pub enum ErrorCode {
    NotFound = 1404,
    Conflict = 1409,
    UnknownCommand = 1403,
    Busy = 1503,
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Error {
    NotFound { what: &'static str, id: String },
    Conflict { what: &'static str, reason: String },
    /// Raised after the bounded retry-on-busy policy (§5 "three attempts
    /// with 100 ms sleeps") is exhausted.
    Busy { what: &'static str },
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::NotFound { .. } => ErrorCode::NotFound,
            Error::Conflict { .. } => ErrorCode::Conflict,
            Error::Busy { .. } => ErrorCode::Busy,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound { what, id } => write!(f, "{} not found: {}", what, id),
            Error::Conflict { what, reason } => write!(f, "{} conflict: {}", what, reason),
            Error::Busy { what } => write!(f, "{} busy, retries exhausted", what),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = ::std::result::Result<T, Error>;

/// Retries `op` up to three times with a 100 ms sleep between attempts,
/// surfacing the last `Busy`-shaped failure as a `Conflict` once exhausted
/// (§5, §7 "DB busy ... surfaced as conflict after").
pub fn retry_on_busy<T>(what: &'static str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    const ATTEMPTS: u32 = 3;
    let mut last_err = None;

    for attempt in 0..ATTEMPTS {
        match op() {
            Ok(value) => return Ok(value),
            Err(Error::Busy { .. }) => {
                last_err = Some(Error::Busy { what });
                if attempt + 1 < ATTEMPTS {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
            }
            Err(other) => return Err(other),
        }
    }

    Err(Error::Conflict {
        what,
        reason: format!("{}", last_err.unwrap()),
    })
}
