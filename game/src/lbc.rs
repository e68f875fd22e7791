use std::time::{Duration, Instant};

use rtlog::{o, warn, Logger};
use sysinfo::{PidExt, ProcessExt, System, SystemExt};

/// Periodic CPU-percent sampler published to every dispatcher shard so they can bias placement
/// decisions toward less loaded games. A sampling failure is logged and skipped -- it never
/// takes the process down.
pub struct Lbc {
    system: System,
    pid: sysinfo::Pid,
    interval: Duration,
    last_sample: Instant,
    log: Logger,
}

impl Lbc {
    pub fn new(interval: Duration, log: Logger) -> Lbc {
        let mut system = System::new();
        let pid = sysinfo::get_current_pid().unwrap_or_else(|_| sysinfo::Pid::from_u32(0));
        system.refresh_process(pid);

        Lbc { system, pid, interval, last_sample: Instant::now(), log: log.new(o!("component" => "lbc")) }
    }

    /// Returns `Some(cpu_percent)` when `interval` has elapsed and a fresh sample was taken.
    pub fn tick(&mut self, now: Instant) -> Option<f32> {
        if now.duration_since(self.last_sample) < self.interval {
            return None;
        }
        self.last_sample = now;

        self.system.refresh_process(self.pid);
        match self.system.process(self.pid) {
            Some(process) => Some(process.cpu_usage()),
            None => {
                warn!(self.log, "failed to sample own process for lbc report");
                None
            }
        }
    }
}
