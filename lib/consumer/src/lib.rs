//! Event-sourced consumer: atomically advances a per-consumer watermark
//! over the event log, promoting priority event classes under backlog and
//! quarantining poison events to a dead-letter table (§4.4 — "the hardest
//! part").

pub mod handlers;

use repository::{EventId, EventLog, EventRow, Repository};
use serde_derive::{Deserialize, Serialize};
use slog::Logger;
use std::collections::HashMap;

/// Anything the consumer needs from the store: domain lookups plus the
/// event log itself. The in-memory repository implements both traits, so
/// any `InMemoryRepository` already satisfies this blanket impl.
pub trait Store: Repository + EventLog {}
impl<T: Repository + EventLog + ?Sized> Store for T {}

/// Mirrors the `[consumer]` section of `twclone.toml` (§6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub batch_size: usize,
    pub backlog_prio_threshold: u64,
    pub priority_types: Vec<String>,
    pub consumer_key: String,
}

impl Default for ConsumerConfig {
    fn default() -> ConsumerConfig {
        ConsumerConfig {
            batch_size: 100,
            backlog_prio_threshold: 50,
            priority_types: vec!["ship.self_destruct.initiated".to_owned()],
            consumer_key: "engine".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Metrics {
    pub last_event_id: EventId,
    pub lag: u64,
    pub processed_in_tick: usize,
    pub quarantined_in_tick: usize,
}

/// A handler returns `Ok(())` to acknowledge the event, or `Err(reason)` to
/// route it to dead-letter. Handlers must be idempotent with respect to
/// their own keys — the consumer gives at-least-once delivery.
pub type HandlerResult = std::result::Result<(), String>;
pub type Handler = Box<dyn Fn(&dyn Store, &EventRow) -> HandlerResult + Send + Sync>;

pub struct EventConsumer {
    config: ConsumerConfig,
    handlers: HashMap<String, Handler>,
    log: Logger,
}

impl EventConsumer {
    pub fn new(config: ConsumerConfig, log: Logger) -> EventConsumer {
        EventConsumer {
            config,
            handlers: HashMap::new(),
            log,
        }
    }

    pub fn register_handler(&mut self, event_type: impl Into<String>, handler: Handler) {
        self.handlers.insert(event_type.into(), handler);
    }

    fn dispatch(&self, store: &dyn Store, row: &EventRow) -> HandlerResult {
        match self.handlers.get(&row.kind) {
            Some(handler) => handler(store, row),
            None => Err(format!("unknown event type: {}", row.kind)),
        }
    }

    /// Applies one row: on handler success, increments `processed`; on
    /// failure (including unknown type) quarantines the row and increments
    /// `quarantined`. Either way, advances `(batch_max_id, batch_max_ts)`
    /// unconditionally — a quarantined event must never block the
    /// watermark.
    fn apply_row(&self, store: &dyn Store, row: EventRow, processed: &mut usize, quarantined: &mut usize) {
        match self.dispatch(store, &row) {
            Ok(()) => {
                *processed += 1;
                slog::debug!(self.log, "event applied"; "event_id" => row.id, "type" => %row.kind);
            }
            Err(reason) => {
                *quarantined += 1;
                slog::warn!(self.log, "event quarantined"; "event_id" => row.id, "type" => %row.kind, "reason" => %reason);
                let moved_at = flux::time::timestamp_secs() as i64;
                store.insert_deadletter(row, reason, moved_at);
            }
        }
    }

    /// Runs one tick of the algorithm described in §4.4. Returns the
    /// resulting metrics; the watermark is left exactly where the last
    /// successfully-committed pass left it.
    pub fn tick(&self, store: &dyn Store) -> Metrics {
        let (last_id, _last_ts) = store.get_offset(&self.config.consumer_key);
        let max_id = store.max_event_id();
        let lag = max_id.saturating_sub(last_id);
        let mut remaining = self.config.batch_size;

        let mut total_processed = 0usize;
        let mut total_quarantined = 0usize;
        let mut watermark = last_id;

        let use_priority = !self.config.priority_types.is_empty() && lag >= self.config.backlog_prio_threshold;

        // Both passes select against the watermark this tick started with,
        // matching the worked example in the testable-properties section:
        // with events [B,B,B,B,B,A,A] and batch=3, the priority pass
        // applies A,A (ids 6,7) and commits last_id=7, but the non-priority
        // pass then independently selects from the *original* last_id=0,
        // applies one B (id 1), and its later commit of last_id=1
        // overwrites the priority pass's commit. The stored watermark ends
        // up as "the id of the third applied event", not the highest id
        // touched this tick — a later pass's commit always wins.
        if use_priority {
            let (p_processed, p_quarantined, p_watermark, p_ts) =
                self.run_pass(store, last_id, remaining, Some(&self.config.priority_types), false);
            if p_processed + p_quarantined > 0 {
                store.set_offset(&self.config.consumer_key, p_watermark, p_ts);
                remaining -= p_processed + p_quarantined;
                total_processed += p_processed;
                total_quarantined += p_quarantined;
            }
        }

        if remaining > 0 {
            let (n_processed, n_quarantined, n_watermark, n_ts) =
                self.run_pass(store, last_id, remaining, None, use_priority);
            if n_processed + n_quarantined > 0 {
                store.set_offset(&self.config.consumer_key, n_watermark, n_ts);
                total_processed += n_processed;
                total_quarantined += n_quarantined;
            }
        }

        let (stored_watermark, _) = store.get_offset(&self.config.consumer_key);
        let fresh_max_id = store.max_event_id();
        Metrics {
            last_event_id: stored_watermark,
            lag: fresh_max_id.saturating_sub(stored_watermark),
            processed_in_tick: total_processed,
            quarantined_in_tick: total_quarantined,
        }
    }

    /// Runs a single pass starting from `from_id` with `budget` remaining.
    /// When `skip_priority` is set (the non-priority pass under backlog
    /// promotion), rows whose type is in `priority_types` are left
    /// untouched entirely — they don't consume budget and don't advance
    /// the watermark, deferring them to the next tick's priority pass.
    fn run_pass(
        &self,
        store: &dyn Store,
        from_id: EventId,
        budget: usize,
        select_types: Option<&[String]>,
        skip_priority: bool,
    ) -> (usize, usize, EventId, i64) {
        let rows = store.events_after(from_id, budget, select_types);
        let mut processed = 0usize;
        let mut quarantined = 0usize;
        let mut watermark = from_id;
        let mut watermark_ts = 0i64;
        let mut remaining = budget;

        for row in rows {
            if remaining == 0 {
                break;
            }
            if skip_priority && self.config.priority_types.iter().any(|t| t == &row.kind) {
                continue;
            }

            let id = row.id;
            let ts = row.ts;
            self.apply_row(store, row, &mut processed, &mut quarantined);
            watermark = id;
            watermark_ts = ts;
            remaining -= 1;
        }

        (processed, quarantined, watermark, watermark_ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repository::InMemoryRepository;
    use serde_json::json;

    fn log() -> Logger {
        flux::logging::test_logger()
    }

    fn config() -> ConsumerConfig {
        ConsumerConfig {
            batch_size: 100,
            backlog_prio_threshold: 50,
            priority_types: vec!["ship.self_destruct.initiated".to_owned()],
            consumer_key: "engine".to_owned(),
        }
    }

    #[test]
    fn watermark_advances_and_stays_non_decreasing() {
        let repo = InMemoryRepository::new();
        repo.append_event("noop", None, None, json!({}));
        repo.append_event("noop", None, None, json!({}));

        let mut consumer = EventConsumer::new(config(), log());
        consumer.register_handler("noop", Box::new(|_, _| Ok(())));

        let m1 = consumer.tick(&repo);
        assert_eq!(m1.last_event_id, 2);
        assert_eq!(m1.processed_in_tick, 2);
        assert_eq!(m1.lag, 0);

        let m2 = consumer.tick(&repo);
        assert_eq!(m2.last_event_id, 2);
        assert_eq!(m2.processed_in_tick, 0);
    }

    #[test]
    fn poison_event_is_quarantined_but_advances_watermark() {
        let repo = InMemoryRepository::new();
        repo.append_event("unhandled.type", None, None, json!({}));
        repo.append_event("noop", None, None, json!({}));

        let mut consumer = EventConsumer::new(config(), log());
        consumer.register_handler("noop", Box::new(|_, _| Ok(())));

        let metrics = consumer.tick(&repo);
        assert_eq!(metrics.processed_in_tick, 1);
        assert_eq!(metrics.quarantined_in_tick, 1);
        assert_eq!(metrics.last_event_id, 2);
        assert_eq!(repo.list_deadletter().len(), 1);
    }

    #[test]
    fn priority_events_run_before_non_priority_under_backlog() {
        let repo = InMemoryRepository::new();
        for _ in 0..60 {
            repo.append_event("noop", None, None, json!({}));
        }
        repo.append_event("ship.self_destruct.initiated", None, None, json!({"player_id": 1}));

        let mut cfg = config();
        cfg.batch_size = 10;
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut consumer = EventConsumer::new(cfg, log());
        let order_noop = order.clone();
        consumer.register_handler(
            "noop",
            Box::new(move |_, row| {
                order_noop.lock().unwrap().push(row.id);
                Ok(())
            }),
        );
        let order_prio = order.clone();
        consumer.register_handler(
            "ship.self_destruct.initiated",
            Box::new(move |_, row| {
                order_prio.lock().unwrap().push(row.id);
                Ok(())
            }),
        );

        consumer.tick(&repo);

        let seen = order.lock().unwrap();
        assert_eq!(seen.first().copied(), Some(61));
    }
}
