//! In-memory cron table (§4.8 expansion note, grounded on
//! `original_source/src/engine_main.c`'s due-time scan). A job fires once
//! its `next_due` has passed, and is immediately rescheduled to
//! `now + interval_secs` — at most one firing per `run_due` call, even if
//! several intervals elapsed while the engine was busy or stalled.

pub struct CronJob {
    pub name: &'static str,
    pub interval_secs: i64,
    next_due: i64,
}

impl CronJob {
    pub fn new(name: &'static str, interval_secs: i64, start_at: i64) -> CronJob {
        CronJob { name, interval_secs, next_due: start_at + interval_secs }
    }
}

pub struct CronTable {
    jobs: Vec<CronJob>,
}

impl CronTable {
    pub fn new() -> CronTable {
        CronTable { jobs: Vec::new() }
    }

    pub fn register(&mut self, job: CronJob) {
        self.jobs.push(job);
    }

    /// Returns the names of jobs whose `next_due <= now`, rescheduling each
    /// to `now + interval_secs` in the same pass.
    pub fn run_due(&mut self, now: i64) -> Vec<&'static str> {
        let mut due = Vec::new();
        for job in &mut self.jobs {
            if job.next_due <= now {
                due.push(job.name);
                job.next_due = now + job.interval_secs;
            }
        }
        due
    }
}

impl Default for CronTable {
    fn default() -> CronTable {
        CronTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_fires_once_its_interval_elapses() {
        let mut table = CronTable::new();
        table.register(CronJob::new("heartbeat", 10, 0));

        assert!(table.run_due(5).is_empty());
        assert_eq!(table.run_due(10), vec!["heartbeat"]);
        assert!(table.run_due(11).is_empty());
        assert_eq!(table.run_due(20), vec!["heartbeat"]);
    }

    #[test]
    fn overdue_job_fires_once_not_once_per_missed_interval() {
        let mut table = CronTable::new();
        table.register(CronJob::new("sweep", 10, 0));

        assert_eq!(table.run_due(35), vec!["sweep"]);
        assert_eq!(table.run_due(36), Vec::<&str>::new());
        assert_eq!(table.run_due(45), vec!["sweep"]);
    }
}
