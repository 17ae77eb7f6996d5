//! Purpose: Hold top-level CLI command dispatch for `perfloops`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command prints exactly one JSON document on stdout on success.
//! Invariants: Argument validation happens before any workload runs.

use std::hint::black_box;
use std::time::Instant;

use perfloops::api::{
    Kernel, ReadMethod, RepetitionConfig, RepetitionReport, RepetitionTester, ScalarVariant,
    backend, cpu_timer_freq, file_len, read_file_once, run_kernel,
};

use super::*;

/// Wall-clock window used to calibrate the CPU timer when the hardware doesn't report it.
pub(super) const FREQ_CALIBRATION: Duration = Duration::from_millis(100);

pub(super) fn dispatch_command(command: Command, color_mode: ColorMode) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "perfloops", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Run { kernel, count } => {
            let kernel = Kernel::parse(&kernel)?;
            let mut buffer = kernel_buffer(kernel, count)?;
            let start = Instant::now();
            run_kernel(kernel, &mut buffer, count).map_err(|err| err.with_kernel(kernel.name()))?;
            let elapsed = start.elapsed();
            emit_json(json!({
                "kernel": kernel.name(),
                "count": count,
                "backend": backend(),
                "elapsed_ns": elapsed.as_nanos() as u64,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Repeat {
            kernel,
            count,
            try_for,
        } => {
            let kernel = Kernel::parse(&kernel)?;
            let try_for = parse_try_for(try_for)?;
            let mut buffer = kernel_buffer(kernel, count)?;
            let mut tester = new_tester(try_for, count);
            let report = tester
                .run(kernel.name(), || {
                    run_kernel(kernel, &mut buffer, count)?;
                    Ok(count)
                })
                .map_err(|err| err.with_kernel(kernel.name()))?;
            emit_json(json!({
                "kernel": kernel.name(),
                "count": count,
                "backend": backend(),
                "report": report_json(&report)?,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Read {
            file,
            method,
            try_for,
        } => {
            let method = ReadMethod::parse(&method)?;
            let try_for = parse_try_for(try_for)?;
            let expected = file_len(&file)?;
            let mut buf = Vec::new();
            let mut tester = new_tester(try_for, expected);
            let report = tester.run(method.name(), || read_file_once(&file, method, &mut buf))?;
            emit_json(json!({
                "path": file.display().to_string(),
                "method": method.name(),
                "bytes": expected,
                "report": report_json(&report)?,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Scalar {
            variant,
            len,
            threads,
            try_for,
        } => {
            let variants = if variant.trim().eq_ignore_ascii_case("all") {
                ScalarVariant::ALL.to_vec()
            } else {
                vec![ScalarVariant::parse(&variant)?]
            };
            if threads == 0 && variants.contains(&ScalarVariant::Parallel) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("--threads must be at least 1")
                    .with_hint("Pass --threads 2 (or more) for the parallel variant."));
            }
            let try_for = parse_try_for(try_for)?;
            let len_u32 = u32::try_from(len).map_err(|_| {
                Error::new(ErrorKind::Usage).with_message("--len must fit in a u32")
            })?;
            let input: Vec<u32> = (0..len_u32).collect();
            let bytes = (len as u64) * 4;

            let mut tester = new_tester(try_for, bytes);
            let mut results = Vec::new();
            for variant in variants {
                let sum = variant.sum(&input, threads)?;
                let report = tester.run(variant.name(), || {
                    black_box(variant.sum(black_box(&input), threads)?);
                    Ok(bytes)
                })?;
                results.push(json!({
                    "variant": variant.name(),
                    "sum": sum,
                    "report": report_json(&report)?,
                }));
            }
            emit_json(json!({
                "len": len,
                "threads": threads,
                "results": results,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Bench {
            counts,
            try_for,
            format,
        } => {
            let args = bench::BenchArgs {
                counts,
                try_for: parse_try_for(try_for)?,
                format: bench::BenchFormat::parse(&format)?,
            };
            bench::run_bench(args, env!("CARGO_PKG_VERSION"), color_mode)?;
            Ok(RunOutcome::ok())
        }
    }
}

pub(super) fn new_tester(try_for: Duration, expected_bytes: u64) -> RepetitionTester {
    RepetitionTester::new(
        RepetitionConfig::new(try_for, expected_bytes),
        cpu_timer_freq(FREQ_CALIBRATION),
    )
}

/// Scratch buffer sized for `kernel`; only MOV writes through it.
/// A count that cannot be allocated is a usage error, never an abort.
pub(super) fn kernel_buffer(kernel: Kernel, count: u64) -> Result<Vec<u8>, Error> {
    if !kernel.needs_buffer() {
        return Ok(Vec::new());
    }
    let too_large = || {
        Error::new(ErrorKind::Usage)
            .with_message(format!("--count {count} is too large for a buffer"))
            .with_hint("Lower --count; mov allocates one byte per iteration.")
            .with_kernel(kernel.name())
    };
    let len = usize::try_from(count).map_err(|_| too_large())?;
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|err| too_large().with_source(err))?;
    buffer.resize(len, 0);
    Ok(buffer)
}

pub(super) fn report_json(report: &RepetitionReport) -> Result<Value, Error> {
    serde_json::to_value(report).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode repetition report")
            .with_source(err)
    })
}
