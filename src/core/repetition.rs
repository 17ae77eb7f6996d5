//! Purpose: Rerun a workload until its fastest time stops improving, then summarize.
//! Exports: `RepetitionConfig`, `RepetitionTester`, `RepetitionReport`, `Stat`.
//! Role: Measurement harness shared by the loop, scalar and file-read commands.
//! Invariants: Any new minimum restarts the `try_for` window.
//! Invariants: At least one repetition always runs, even with a zero `try_for`.
//! Invariants: A `try_for` past the end of `Instant`'s range means no deadline, never a panic.
//! Invariants: A repetition that reports the wrong byte count aborts the run.
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::core::error::{Error, ErrorKind};
use crate::core::faults::minor_page_faults;
use crate::core::timer::read_cpu_timer;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Clone, Copy, Debug)]
pub struct RepetitionConfig {
    pub try_for: Duration,
    /// Bytes every repetition must report; zero disables the check.
    pub expected_bytes: u64,
}

impl RepetitionConfig {
    pub fn new(try_for: Duration, expected_bytes: u64) -> Self {
        Self {
            try_for,
            expected_bytes,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct Sample {
    ticks: u64,
    bytes: u64,
    page_faults: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stat {
    pub ticks: u64,
    pub seconds: f64,
    pub bytes: u64,
    pub bytes_per_sec: f64,
    pub gib_per_sec: f64,
    pub page_faults: u64,
    /// KiB processed per page fault, when any faults happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kb_per_fault: Option<f64>,
}

impl Stat {
    fn from_sample(sample: Sample, cpu_freq: u64) -> Self {
        let seconds = sample.ticks as f64 / cpu_freq.max(1) as f64;
        let bytes_per_sec = if seconds > 0.0 {
            sample.bytes as f64 / seconds
        } else {
            0.0
        };
        let kb_per_fault =
            (sample.page_faults > 0).then(|| sample.bytes as f64 / 1024.0 / sample.page_faults as f64);
        Self {
            ticks: sample.ticks,
            seconds,
            bytes: sample.bytes,
            bytes_per_sec,
            gib_per_sec: bytes_per_sec / GIB,
            page_faults: sample.page_faults,
            kb_per_fault,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RepetitionReport {
    pub label: String,
    pub repetitions: u64,
    pub cpu_freq: u64,
    pub min: Stat,
    pub max: Stat,
    pub avg: Stat,
}

#[derive(Clone, Debug)]
pub struct RepetitionTester {
    config: RepetitionConfig,
    cpu_freq: u64,
}

impl RepetitionTester {
    pub fn new(config: RepetitionConfig, cpu_freq: u64) -> Self {
        Self {
            config,
            cpu_freq: cpu_freq.max(1),
        }
    }

    /// `None` when `try_for` is too large to represent; the run then only ends on error.
    fn deadline_from_now(&self) -> Option<Instant> {
        Instant::now().checked_add(self.config.try_for)
    }

    /// Runs `repetition` until `try_for` passes without a new fastest time.
    ///
    /// Each call of `repetition` does one unit of work and returns the number of
    /// bytes it processed.
    pub fn run<F>(&mut self, label: &str, mut repetition: F) -> Result<RepetitionReport, Error>
    where
        F: FnMut() -> Result<u64, Error>,
    {
        let mut deadline = self.deadline_from_now();
        let mut repetitions = 0u64;
        let mut total = Sample::default();
        let mut min: Option<Sample> = None;
        let mut max: Option<Sample> = None;

        loop {
            let faults_before = minor_page_faults();
            let start = read_cpu_timer();
            let bytes = repetition()?;
            let end = read_cpu_timer();
            let page_faults = minor_page_faults().saturating_sub(faults_before);

            if self.config.expected_bytes != 0 && bytes != self.config.expected_bytes {
                return Err(Error::new(ErrorKind::Internal)
                    .with_message(format!(
                        "processed byte count mismatch in `{label}`: expected {}, got {bytes}",
                        self.config.expected_bytes
                    )));
            }

            let sample = Sample {
                ticks: end.saturating_sub(start),
                bytes,
                page_faults,
            };
            repetitions += 1;
            total.ticks = total.ticks.saturating_add(sample.ticks);
            total.bytes = total.bytes.saturating_add(sample.bytes);
            total.page_faults = total.page_faults.saturating_add(sample.page_faults);

            if min.is_none_or(|current| sample.ticks < current.ticks) {
                debug!(label, repetitions, ticks = sample.ticks, "new minimum");
                min = Some(sample);
                deadline = self.deadline_from_now();
            }
            if max.is_none_or(|current| sample.ticks > current.ticks) {
                max = Some(sample);
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }
        }

        let avg = Sample {
            ticks: total.ticks / repetitions,
            bytes: total.bytes / repetitions,
            page_faults: total.page_faults / repetitions,
        };
        let report = RepetitionReport {
            label: label.to_string(),
            repetitions,
            cpu_freq: self.cpu_freq,
            min: Stat::from_sample(min.unwrap_or_default(), self.cpu_freq),
            max: Stat::from_sample(max.unwrap_or_default(), self.cpu_freq),
            avg: Stat::from_sample(avg, self.cpu_freq),
        };
        info!(
            label,
            repetitions,
            min_seconds = report.min.seconds,
            gib_per_sec = report.min.gib_per_sec,
            "repetition test finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::{RepetitionConfig, RepetitionTester, Sample, Stat};
    use crate::core::error::{Error, ErrorKind};
    use std::time::{Duration, Instant};

    fn tester(try_for_ms: u64, expected_bytes: u64) -> RepetitionTester {
        RepetitionTester::new(
            RepetitionConfig::new(Duration::from_millis(try_for_ms), expected_bytes),
            1_000_000_000,
        )
    }

    #[test]
    fn zero_window_still_runs_once() {
        let mut calls = 0;
        let report = tester(0, 0)
            .run("once", || {
                calls += 1;
                Ok(8)
            })
            .expect("run");
        assert_eq!(calls, 1);
        assert_eq!(report.repetitions, 1);
        assert_eq!(report.min, report.max);
        assert_eq!(report.label, "once");
        assert_eq!(report.avg.bytes, 8);
    }

    #[test]
    fn min_never_exceeds_max() {
        let mut buffer = vec![0u8; 4096];
        let report = tester(5, 4096)
            .run("fill", || {
                buffer.iter_mut().for_each(|b| *b = b.wrapping_add(1));
                std::hint::black_box(&buffer);
                Ok(buffer.len() as u64)
            })
            .expect("run");
        assert!(report.repetitions >= 1);
        assert!(report.min.ticks <= report.avg.ticks);
        assert!(report.avg.ticks <= report.max.ticks);
        assert_eq!(report.min.bytes, 4096);
    }

    #[test]
    fn byte_mismatch_stops_the_run() {
        let mut calls = 0;
        let err = tester(50, 100)
            .run("short", || {
                calls += 1;
                Ok(99)
            })
            .expect_err("mismatch");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.message().unwrap_or("").contains("byte count mismatch"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn workload_error_propagates() {
        let mut calls = 0;
        let err = tester(50, 0)
            .run("fails", || {
                calls += 1;
                if calls == 3 {
                    return Err(Error::new(ErrorKind::Io).with_message("disk gone"));
                }
                Ok(1)
            })
            .expect_err("error");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(calls, 3);
    }

    #[test]
    fn new_minimum_extends_the_window() {
        // Each call is faster than the last until the fourth, so each of the
        // first four is a new minimum. A fixed 5ms window would stop after the
        // first 30ms call.
        let sleeps_ms = [30u64, 20, 10, 0];
        let mut calls = 0usize;
        let start = Instant::now();
        let freq = crate::core::timer::cpu_timer_freq(Duration::from_millis(20));
        let mut tester = RepetitionTester::new(RepetitionConfig::new(Duration::from_millis(5), 0), freq);
        let report = tester
            .run("speeding-up", || {
                let ms = sleeps_ms.get(calls).copied().unwrap_or(0);
                calls += 1;
                std::thread::sleep(Duration::from_millis(ms));
                Ok(1)
            })
            .expect("run");
        assert!(report.repetitions >= 4, "stopped after {}", report.repetitions);
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert!(report.min.seconds < 0.005);
        assert!(report.max.seconds >= 0.030);
    }

    #[test]
    fn unrepresentable_window_does_not_panic() {
        let mut tester = RepetitionTester::new(RepetitionConfig::new(Duration::MAX, 0), 1_000);
        let mut calls = 0;
        let err = tester
            .run("forever", || {
                calls += 1;
                if calls == 5 {
                    return Err(Error::new(ErrorKind::Internal).with_message("stop"));
                }
                Ok(1)
            })
            .expect_err("only an error ends an unbounded run");
        assert_eq!(err.message(), Some("stop"));
        assert_eq!(calls, 5);
    }

    #[test]
    fn stat_throughput_uses_frequency() {
        let stat = Stat::from_sample(
            Sample {
                ticks: 500,
                bytes: 1000,
                page_faults: 2,
            },
            1_000,
        );
        assert_eq!(stat.seconds, 0.5);
        assert_eq!(stat.bytes_per_sec, 2000.0);
        assert_eq!(stat.gib_per_sec, 2000.0 / (1024.0 * 1024.0 * 1024.0));
        assert_eq!(stat.kb_per_fault, Some(1000.0 / 1024.0 / 2.0));

        let idle = Stat::from_sample(Sample::default(), 1_000);
        assert_eq!(idle.bytes_per_sec, 0.0);
        assert_eq!(idle.kb_per_fault, None);
    }
}
