//! Engine tick loop (§4.8): runs the event consumer and due cron jobs, then
//! yields to a shutdown-pipe poll with a small timeout. Any readability
//! (including EOF) on the shutdown channel triggers an ordered shutdown:
//! no further event-consumer ticks or cron jobs run once `run` returns.
//!
//! *(Expansion note: this workspace collapses the reference's self-pipe
//! `poll()` into a dedicated reader thread over the child process's piped
//! stdin plus an `mpsc` channel — see `engine-runner`'s `main.rs`. The
//! contract `run` implements here is identical: closing the pipe is the
//! shutdown signal, observed with bounded latency by a timed wait, not a
//! busy poll.)*

use crate::cron::CronTable;
use consumer::{EventConsumer, Metrics};
use repository::{EventLog, Repository};
use serde_json::json;
use slog::Logger;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;
use transport::client::S2SLink;
use transport::Envelope;

pub trait Store: Repository + EventLog {}
impl<T: Repository + EventLog + ?Sized> Store for T {}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExitReason {
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub metrics: Metrics,
    pub cron_fired: Vec<&'static str>,
}

/// Everything the Engine needs to reach the Session Server's S2S listener
/// for the cron-driven outbound push (§2 "may open an outbound S2S
/// connection to push commands such as notices or world broadcasts").
pub struct S2STarget {
    pub address: String,
    pub max_frame_bytes: u32,
    pub local_id: String,
    pub dst: String,
    pub connect_deadline: Duration,
}

pub struct Scheduler<S: Store> {
    consumer: EventConsumer,
    cron: CronTable,
    store: S,
    keys: keyring::Keyring,
    target: S2STarget,
    log: Logger,
    notices_sent: u64,
}

impl<S: Store> Scheduler<S> {
    pub fn new(consumer: EventConsumer, cron: CronTable, store: S, keys: keyring::Keyring, target: S2STarget, log: Logger) -> Scheduler<S> {
        Scheduler { consumer, cron, store, keys, target, log, notices_sent: 0 }
    }

    /// Runs one tick: the event consumer's batch, then any cron jobs whose
    /// due time has passed.
    pub fn tick(&mut self, now: i64) -> TickReport {
        let metrics = self.consumer.tick(&self.store);
        let cron_fired = self.cron.run_due(now);

        for name in &cron_fired {
            self.run_cron_job(name);
        }

        TickReport { metrics, cron_fired }
    }

    fn run_cron_job(&mut self, name: &str) {
        match name {
            "world.heartbeat" => self.push_notice(),
            "nonce.sweep" => {
                // Nonce sweeping lives on the Session Server's PeerRegistry,
                // which this process has no handle to; the job exists here
                // only to demonstrate cron-driven S2S pushes, matching the
                // reference's own heartbeat job.
            }
            other => slog::warn!(self.log, "unknown cron job"; "job" => other),
        }
    }

    /// Opens a short-lived outbound S2S connection and pushes a
    /// `s2s.command.push` envelope carrying a `notice.publish` command, per
    /// §8's worked scenario. Failures are logged, never fatal to the tick
    /// loop — a missed heartbeat is not a crash.
    fn push_notice(&mut self) {
        self.notices_sent += 1;
        let idem_key = format!("heartbeat-{}", self.notices_sent);

        let payload = json!({
            "cmd_type": "notice.publish",
            "idem_key": idem_key,
            "data": { "message": "engine heartbeat", "sequence": self.notices_sent },
        });

        let mut envelope = Envelope::new("s2s.command.push", self.target.local_id.clone(), self.target.dst.clone(), payload);

        match S2SLink::connect(self.target.address.as_str(), self.target.local_id.clone(), self.target.connect_deadline) {
            Ok(link) => {
                let mut link = link.with_max_frame_bytes(self.target.max_frame_bytes);
                if let Err(e) = link.send(&mut envelope, &self.keys) {
                    slog::warn!(self.log, "heartbeat push failed"; "error" => %e);
                } else {
                    slog::debug!(self.log, "heartbeat pushed"; "idem_key" => %idem_key);
                }
            }
            Err(e) => {
                slog::warn!(self.log, "could not reach session server for heartbeat"; "error" => %e);
            }
        }
    }

    /// Runs ticks at `tick_interval` until `shutdown` becomes readable
    /// (signalled or its sender is dropped, i.e. the piped stdin hit EOF).
    pub fn run(&mut self, tick_interval: Duration, shutdown: &Receiver<()>) -> ExitReason {
        loop {
            let now = flux::time::timestamp_secs() as i64;
            let report = self.tick(now);
            slog::debug!(self.log, "tick complete";
                "last_event_id" => report.metrics.last_event_id,
                "lag" => report.metrics.lag,
                "processed" => report.metrics.processed_in_tick,
                "quarantined" => report.metrics.quarantined_in_tick);

            match shutdown.recv_timeout(tick_interval) {
                Ok(()) => return ExitReason::Shutdown,
                Err(RecvTimeoutError::Disconnected) => return ExitReason::Shutdown,
                Err(RecvTimeoutError::Timeout) => continue,
            }
        }
    }
}
