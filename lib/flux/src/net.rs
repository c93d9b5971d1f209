//! Shared network error taxonomy for both the C2S and S2S transports
//! (§4.2). Every blocking I/O call in this workspace returns `Result<T,
//! Error>` rather than a bare `io::Result`, so a `timeout` can be told apart
//! from a hard `closed` without downcasting.

use std::io;

#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Error {
    /// The per-call deadline elapsed before the operation completed.
    Timeout,
    /// The peer closed the connection (EOF on read, or a write into a dead
    /// socket).
    Closed,
    /// Any other I/O failure.
    Io(io::ErrorKind),
    /// A frame's declared length exceeded the configured cap; rejected
    /// before the bytes were even read off the wire.
    TooLarge,
    /// The frame's bytes did not parse as a JSON object.
    BadJson,
    /// The envelope carried no `key_id`/`sig` pair at all.
    AuthRequired,
    /// The envelope's signature did not verify under the named key.
    AuthBad,
}

impl From<io::Error> for Error {
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout,
            io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset => Error::Closed,
            kind => Error::Io(kind),
        }
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;

/// Retries a blocking syscall wrapper transparently on `EINTR`, per §4.2
/// "Every I/O call ... `EINTR` retries transparently."
#[inline]
pub fn retry_eintr<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Running counters for a single transport endpoint; mirrors the
/// reference's `g_ctr` struct (`sent_ok`, `recv_ok`, `auth_fail`,
/// `too_large`).
#[derive(Debug, Default)]
pub struct Counters {
    sent_ok: std::sync::atomic::AtomicU64,
    recv_ok: std::sync::atomic::AtomicU64,
    auth_fail: std::sync::atomic::AtomicU64,
    too_large: std::sync::atomic::AtomicU64,
}

impl Counters {
    pub fn new() -> Counters {
        Counters::default()
    }

    pub fn record_sent_ok(&self) {
        self.sent_ok.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn record_recv_ok(&self) {
        self.recv_ok.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn record_auth_fail(&self) {
        self.auth_fail.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn record_too_large(&self) {
        self.too_large.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        use std::sync::atomic::Ordering::Relaxed;
        CounterSnapshot {
            sent_ok: self.sent_ok.load(Relaxed),
            recv_ok: self.recv_ok.load(Relaxed),
            auth_fail: self.auth_fail.load(Relaxed),
            too_large: self.too_large.load(Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CounterSnapshot {
    pub sent_ok: u64,
    pub recv_ok: u64,
    pub auth_fail: u64,
    pub too_large: u64,
}

/// Bounded exponential backoff used by every outbound connect in this
/// workspace (§4.2 "Client connect uses bounded exponential backoff from a
/// 100 ms floor to a 5 s ceiling").
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    floor: std::time::Duration,
    ceiling: std::time::Duration,
    current: std::time::Duration,
}

impl Backoff {
    pub const DEFAULT_FLOOR: std::time::Duration = std::time::Duration::from_millis(100);
    pub const DEFAULT_CEILING: std::time::Duration = std::time::Duration::from_secs(5);

    pub fn new(floor: std::time::Duration, ceiling: std::time::Duration) -> Backoff {
        Backoff {
            floor,
            ceiling,
            current: floor,
        }
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }

    /// Returns the delay to sleep for this attempt, then doubles it (capped
    /// at the ceiling) for the next.
    pub fn next_delay(&mut self) -> std::time::Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, self.ceiling);
        delay
    }
}

impl Default for Backoff {
    fn default() -> Backoff {
        Backoff::new(Self::DEFAULT_FLOOR, Self::DEFAULT_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn backoff_doubles_until_ceiling() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(b.next_delay(), Duration::from_millis(100));
        assert_eq!(b.next_delay(), Duration::from_millis(200));
        assert_eq!(b.next_delay(), Duration::from_millis(400));
        assert_eq!(b.next_delay(), Duration::from_millis(500));
        assert_eq!(b.next_delay(), Duration::from_millis(500));
    }
}
