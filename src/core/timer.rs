//! Purpose: Read the CPU's invariant counter and convert ticks to wall time.
//! Exports: `read_cpu_timer`, `cpu_timer_freq_hint`, `estimate_cpu_timer_freq`,
//! `ticks_to_duration`.
//! Invariants: Counter is monotonic within a process; frequency estimates are never zero.
use std::time::{Duration, Instant};

#[cfg(target_arch = "aarch64")]
pub fn read_cpu_timer() -> u64 {
    let ticks: u64;
    // SAFETY: cntvct_el0 is readable from EL0 on the platforms we build for.
    unsafe {
        std::arch::asm!(
            "isb",
            "mrs {ticks}, cntvct_el0",
            ticks = out(reg) ticks,
            options(nostack, preserves_flags),
        );
    }
    ticks
}

#[cfg(target_arch = "aarch64")]
pub fn cpu_timer_freq_hint() -> Option<u64> {
    let freq: u64;
    // SAFETY: cntfrq_el0 is readable from EL0 on the platforms we build for.
    unsafe {
        std::arch::asm!(
            "mrs {freq}, cntfrq_el0",
            freq = out(reg) freq,
            options(nomem, nostack, preserves_flags),
        );
    }
    (freq != 0).then_some(freq)
}

#[cfg(target_arch = "x86_64")]
#[allow(unused_unsafe)]
pub fn read_cpu_timer() -> u64 {
    // SAFETY: rdtsc has no preconditions on x86_64.
    unsafe { std::arch::x86_64::_rdtsc() }
}

/// The TSC rate is not architecturally visible; callers must estimate it.
#[cfg(target_arch = "x86_64")]
pub fn cpu_timer_freq_hint() -> Option<u64> {
    None
}

#[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
pub fn read_cpu_timer() -> u64 {
    use std::sync::OnceLock;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

#[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
pub fn cpu_timer_freq_hint() -> Option<u64> {
    Some(1_000_000_000)
}

/// Counts timer ticks across `wait` of wall-clock time and scales to ticks per second.
pub fn estimate_cpu_timer_freq(wait: Duration) -> u64 {
    let wait = wait.max(Duration::from_millis(1));
    let cpu_start = read_cpu_timer();
    let wall_start = Instant::now();
    let mut elapsed = Duration::ZERO;
    while elapsed < wait {
        elapsed = wall_start.elapsed();
    }
    let cpu_ticks = read_cpu_timer().saturating_sub(cpu_start);
    let nanos = elapsed.as_nanos().max(1);
    let freq = (u128::from(cpu_ticks) * 1_000_000_000 / nanos) as u64;
    freq.max(1)
}

/// Prefers the architectural frequency and falls back to a measured estimate.
pub fn cpu_timer_freq(wait: Duration) -> u64 {
    cpu_timer_freq_hint().unwrap_or_else(|| estimate_cpu_timer_freq(wait))
}

pub fn ticks_to_duration(ticks: u64, freq: u64) -> Duration {
    if freq == 0 {
        return Duration::ZERO;
    }
    let nanos = u128::from(ticks) * 1_000_000_000 / u128::from(freq);
    Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
}

#[cfg(test)]
mod tests {
    use super::{cpu_timer_freq, estimate_cpu_timer_freq, read_cpu_timer, ticks_to_duration};
    use std::time::Duration;

    #[test]
    fn timer_advances_across_a_busy_wait() {
        let start = read_cpu_timer();
        let wall = std::time::Instant::now();
        while wall.elapsed() < Duration::from_millis(2) {}
        assert!(read_cpu_timer() > start);
    }

    #[test]
    fn estimate_is_positive() {
        assert!(estimate_cpu_timer_freq(Duration::from_millis(5)) > 0);
        assert!(cpu_timer_freq(Duration::from_millis(5)) > 0);
    }

    #[test]
    fn ticks_convert_to_duration() {
        assert_eq!(ticks_to_duration(3_000, 1_000), Duration::from_secs(3));
        assert_eq!(ticks_to_duration(1, 2_000_000_000), Duration::ZERO);
        assert_eq!(ticks_to_duration(500, 1_000_000_000), Duration::from_nanos(500));
        assert_eq!(ticks_to_duration(42, 0), Duration::ZERO);
    }
}
