// Benchmark sweep for the loop routines.
//
// Purpose:
// - Run every loop kernel over a list of iteration counts with the repetition tester.
// - Emit machine-readable JSON to stdout and a human-readable table to stderr.
//
// Design notes:
// - Min time is the headline number; max/avg are kept for spotting noisy machines.
// - "ticks per iteration" uses the CPU timer, which is not the core clock on every target.

use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use tracing::info;

use perfloops::api::{Error, ErrorKind, Kernel, RepetitionReport, backend, run_kernel};

use super::command_dispatch::{kernel_buffer, new_tester, report_json};
use super::{AnsiColor, ColorMode, colorize_label};

#[derive(Clone, Debug)]
pub struct BenchArgs {
    pub counts: Vec<u64>,
    pub try_for: Duration,
    pub format: BenchFormat,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BenchFormat {
    Json,
    Table,
    Both,
}

impl BenchFormat {
    pub fn parse(input: &str) -> Result<Self, Error> {
        match input.trim() {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            "both" => Ok(Self::Both),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message("invalid --format (use json|table|both)")),
        }
    }
}

pub(super) fn run_bench(args: BenchArgs, program_version: &str, color_mode: ColorMode) -> Result<(), Error> {
    if args.counts.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("bench needs at least one count")
            .with_hint("Pass --counts 4096,1048576."));
    }
    let start = SystemTime::now();

    let mut results = Vec::new();
    for count in &args.counts {
        for kernel in Kernel::ALL {
            results.push(bench_kernel(kernel, *count, args.try_for)?);
        }
    }

    let output = json!({
        "name": "perfloops",
        "version": program_version,
        "ts": rfc3339_now(start),
        "system": system_json(),
        "params": {
            "counts": args.counts,
            "try_for_secs": args.try_for.as_secs_f64(),
            "debug_build": cfg!(debug_assertions),
        },
        "results": results,
    });

    emit_bench_output(output, args.format, color_mode)
}

fn bench_kernel(kernel: Kernel, count: u64, try_for: Duration) -> Result<Value, Error> {
    let mut buffer = kernel_buffer(kernel, count)?;
    let mut tester = new_tester(try_for, count);
    let label = format!("{kernel}-{count}");
    let report = tester
        .run(&label, || {
            run_kernel(kernel, &mut buffer, count)?;
            Ok(count)
        })
        .map_err(|err| err.with_kernel(kernel.name()))?;
    info!(kernel = kernel.name(), count, repetitions = report.repetitions, "bench kernel done");
    result_entry(kernel, count, &report)
}

fn result_entry(kernel: Kernel, count: u64, report: &RepetitionReport) -> Result<Value, Error> {
    let iterations = count.max(1) as f64;
    let mut map = BTreeMap::new();
    map.insert("bench".to_string(), json!(kernel.name()));
    map.insert("count".to_string(), json!(count));
    map.insert("repetitions".to_string(), json!(report.repetitions));
    map.insert("min_ns".to_string(), json!(report.min.seconds * 1e9));
    map.insert(
        "ticks_per_iter".to_string(),
        json!(report.min.ticks as f64 / iterations),
    );
    map.insert("gib_per_sec".to_string(), json!(report.min.gib_per_sec));
    map.insert("report".to_string(), report_json(report)?);
    if kernel.needs_buffer() {
        map.insert("notes".to_string(), json!("writes count bytes"));
    }
    Ok(Value::Object(map.into_iter().collect()))
}

fn emit_bench_output(value: Value, format: BenchFormat, color_mode: ColorMode) -> Result<(), Error> {
    match format {
        BenchFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string()));
            Ok(())
        }
        BenchFormat::Table => emit_table(&value, color_mode),
        BenchFormat::Both => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string()));
            emit_table(&value, color_mode)
        }
    }
}

fn table_write_err(err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write bench table")
        .with_source(err)
}

fn emit_table(value: &Value, color_mode: ColorMode) -> Result<(), Error> {
    let use_color = color_mode.use_color(io::stderr().is_terminal());
    let mut stderr = io::stderr().lock();
    let backend_label = colorize_label(backend(), use_color, AnsiColor::Cyan);
    writeln!(stderr, "perfloops bench ({backend_label})").map_err(table_write_err)?;

    let results = value
        .get("results")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::new(ErrorKind::Internal).with_message("bench results missing"))?;

    writeln!(
        stderr,
        "{:>6}  {:>10}  {:>6}  {:>14}  {:>10}  {:>8}  {}",
        "bench", "count", "reps", "min ns", "ticks/iter", "GiB/s", "notes"
    )
    .map_err(table_write_err)?;

    for item in results {
        let bench = item.get("bench").and_then(|v| v.as_str()).unwrap_or("?");
        let count = item.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
        let reps = item.get("repetitions").and_then(|v| v.as_u64()).unwrap_or(0);
        let min_ns = item.get("min_ns").and_then(|v| v.as_f64()).unwrap_or(f64::NAN);
        let ticks = item
            .get("ticks_per_iter")
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::NAN);
        let gib_s = item.get("gib_per_sec").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let notes = item.get("notes").and_then(|v| v.as_str()).unwrap_or("");

        writeln!(
            stderr,
            "{:>6}  {:>10}  {:>6}  {:>14.0}  {:>10.3}  {:>8.3}  {}",
            bench,
            format_count(count),
            reps,
            min_ns,
            ticks,
            gib_s,
            notes
        )
        .map_err(table_write_err)?;
    }

    Ok(())
}

fn system_json() -> Value {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    json!({
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "cpus": cpus,
        "backend": backend(),
    })
}

fn rfc3339_now(ts: SystemTime) -> String {
    let dur = ts.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = dur.as_secs() as i64;
    let nsec = dur.subsec_nanos();
    let tm = time::OffsetDateTime::from_unix_timestamp(secs).unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
    let tm = tm.replace_nanosecond(nsec).unwrap_or(tm);
    tm.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Binary-prefixed iteration count, e.g. `4Ki`, `1Mi`; plain digits below 1024 or when inexact.
fn format_count(value: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(1 << 30, "Gi"), (1 << 20, "Mi"), (1 << 10, "Ki")];
    for (scale, suffix) in UNITS {
        if value >= scale && value % scale == 0 {
            return format!("{}{suffix}", value / scale);
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::{BenchFormat, format_count, rfc3339_now};
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn format_parse() {
        assert_eq!(BenchFormat::parse("both").expect("parse"), BenchFormat::Both);
        assert!(BenchFormat::parse("csv").is_err());
    }

    #[test]
    fn counts_use_binary_prefixes_when_exact() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(1000), "1000");
        assert_eq!(format_count(4096), "4Ki");
        assert_eq!(format_count(1 << 20), "1Mi");
        assert_eq!(format_count((1 << 20) + 1), "1048577");
        assert_eq!(format_count(3 << 30), "3Gi");
    }

    #[test]
    fn timestamps_are_rfc3339() {
        let ts = UNIX_EPOCH + Duration::from_secs(86_400);
        assert_eq!(rfc3339_now(ts), "1970-01-02T00:00:00Z");
    }
}
