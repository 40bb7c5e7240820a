//! Process CPU time (user + system), summed over every worker thread.

use std::time::Duration;

/// Measures CPU time consumed by the process between `start` and `elapsed`.
#[derive(Debug, Clone, Copy)]
pub struct CpuStopwatch {
    start: Duration,
}

impl CpuStopwatch {
    pub fn start() -> Self {
        CpuStopwatch { start: process_cpu_time() }
    }

    pub fn elapsed(&self) -> Duration {
        process_cpu_time().saturating_sub(self.start)
    }
}

/// Total CPU time (user + system) of the current process.
///
/// Returns `Duration::ZERO` on non-unix platforms or if `getrusage` fails.
pub fn process_cpu_time() -> Duration {
    #[cfg(unix)]
    {
        let mut usage = std::mem::MaybeUninit::<libc::rusage>::uninit();
        // SAFETY: `usage.as_mut_ptr()` is a valid pointer to a `libc::rusage`
        // and `RUSAGE_SELF` is a valid target.
        if unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) } != 0 {
            tracing::warn!("getrusage failed, reporting zero CPU time");
            return Duration::ZERO;
        }
        // SAFETY: `getrusage` returned 0, so `usage` is initialized.
        let usage = unsafe { usage.assume_init() };
        let to_duration =
            |tv: libc::timeval| Duration::from_secs(tv.tv_sec as u64) + Duration::from_micros(tv.tv_usec as u64);
        to_duration(usage.ru_utime) + to_duration(usage.ru_stime)
    }
    #[cfg(not(unix))]
    {
        Duration::ZERO
    }
}
