//! Purpose: `perfloops` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout (pretty on a TTY, compact otherwise).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Tracing output goes to stderr so stdout stays machine-readable.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod bench;
mod command_dispatch;

use perfloops::api::{Error, ErrorKind, backend, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint(clap_error_hint(&err)),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing(cli.verbose);
    let color_mode = cli.color;

    command_dispatch::dispatch_command(cli.command, color_mode)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "perfloops",
    version,
    about = "Instruction-throughput loops and a repetition tester",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Times hand-written assembly loops (mov, nop, cmp, dec), summation kernels
and file reads. Every command repeats its workload until the fastest run stops
improving, then prints min/max/avg as JSON.
"#,
    after_help = r#"EXAMPLES
  $ perfloops run mov --count 1048576
  $ perfloops repeat dec --count 100000000 --try-for 5
  $ perfloops scalar --variant all --len 4096
  $ perfloops read data.json --method mmap
  $ perfloops bench --counts 4096,1048576 --format table

  $ perfloops <command> --help"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        global = true,
        help = "Colorize stderr diagnostics and tables: auto|always|never"
    )]
    color: ColorMode,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
        help = "Log progress to stderr (-v debug, -vv trace); RUST_LOG overrides"
    )]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Call one loop routine once",
        after_help = r#"EXAMPLES
  $ perfloops run nop --count 1000000
  $ perfloops run mov

NOTES
  - Kernels: mov (writes a buffer), nop, cmp, dec
  - Output: {"kernel","count","backend","elapsed_ns"}"#
    )]
    Run {
        #[arg(help = "Loop kernel: mov|nop|cmp|dec")]
        kernel: String,
        #[arg(long, default_value_t = 1 << 20, help = "Loop iterations (bytes for mov)")]
        count: u64,
    },
    #[command(
        arg_required_else_help = true,
        about = "Repetition-test one loop routine",
        after_help = r#"EXAMPLES
  $ perfloops repeat mov --count 1048576
  $ perfloops repeat cmp --count 100000000 --try-for 3

NOTES
  - Stops once --try-for seconds pass without a new fastest run"#
    )]
    Repeat {
        #[arg(help = "Loop kernel: mov|nop|cmp|dec")]
        kernel: String,
        #[arg(long, default_value_t = 1 << 20, help = "Loop iterations (bytes for mov)")]
        count: u64,
        #[arg(long, default_value_t = 10.0, help = "Seconds without a new minimum before stopping")]
        try_for: f64,
    },
    #[command(
        arg_required_else_help = true,
        about = "Repetition-test reading a file",
        after_help = r#"EXAMPLES
  $ perfloops read pairs.json
  $ perfloops read pairs.json --method mmap --try-for 2"#
    )]
    Read {
        #[arg(help = "File to read", value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(long, default_value = "read", help = "Read method: read|mmap")]
        method: String,
        #[arg(long, default_value_t = 10.0, help = "Seconds without a new minimum before stopping")]
        try_for: f64,
    },
    #[command(
        about = "Repetition-test the summation kernels",
        after_help = r#"EXAMPLES
  $ perfloops scalar
  $ perfloops scalar --variant quad --len 65536
  $ perfloops scalar --variant parallel --threads 4

NOTES
  - Variants: single, unroll2, dual, quad, quad-chunks, octo, parallel, all
  - Input is the ramp 0, 1, 2, ... of --len u32 values"#
    )]
    Scalar {
        #[arg(long, default_value = "all", help = "Kernel variant or `all`")]
        variant: String,
        #[arg(long, default_value_t = 4096, help = "Number of u32 inputs")]
        len: usize,
        #[arg(long, default_value_t = 2, help = "Threads for the parallel variant")]
        threads: usize,
        #[arg(long, default_value_t = 10.0, help = "Seconds without a new minimum before stopping")]
        try_for: f64,
    },
    #[command(
        about = "Sweep every loop routine over several counts",
        after_help = r#"EXAMPLES
  $ perfloops bench
  $ perfloops bench --counts 4096,65536,1048576 --format both

NOTES
  - JSON goes to stdout; the table goes to stderr"#
    )]
    Bench {
        #[arg(
            long,
            value_delimiter = ',',
            default_values_t = [4096u64, 1 << 20],
            help = "Comma-separated iteration counts"
        )]
        counts: Vec<u64>,
        #[arg(long, default_value_t = 1.0, help = "Seconds without a new minimum before stopping")]
        try_for: f64,
        #[arg(long, default_value = "json", help = "Output: json|table|both")]
        format: String,
    },
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completion scripts",
        after_help = r#"EXAMPLES
  $ perfloops completion bash > ~/.local/share/bash-completion/completions/perfloops
  $ perfloops completion zsh > ~/.zfunc/_perfloops"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Longest accepted `--try-for`; a window without a new minimum this long means the run is stuck.
const MAX_TRY_FOR: Duration = Duration::from_secs(24 * 60 * 60);

fn parse_try_for(seconds: f64) -> Result<Duration, Error> {
    let try_for = Duration::try_from_secs_f64(seconds).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid --try-for `{seconds}`"))
            .with_hint("Use a non-negative number of seconds, e.g. --try-for 2.5.")
            .with_source(err)
    })?;
    if try_for > MAX_TRY_FOR {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("--try-for `{seconds}` exceeds one day"))
            .with_hint("Use at most 86400 seconds."));
    }
    Ok(try_for)
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::NotFound => err.with_hint("Check the path exists and is readable."),
        ErrorKind::Io => err.with_hint("I/O error. Check the path, filesystem, and permissions."),
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share command/context if it persists.",
    )
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
    Cyan,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
        AnsiColor::Cyan => "36",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(kernel) = err.kernel() {
        inner.insert("kernel".to_string(), json!(kernel));
        inner.insert("backend".to_string(), json!(backend()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(kernel) = err.kernel() {
        lines.push(format!(
            "{} {kernel} ({})",
            colorize_label("kernel:", use_color, AnsiColor::Yellow),
            backend()
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let subcommand = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .and_then(|usage| {
            let mut tokens = usage.split_whitespace();
            tokens.find(|token| *token == "perfloops")?;
            tokens
                .next()
                .filter(|token| !token.starts_with(['-', '<', '[']))
        });
    match subcommand {
        Some(subcommand) => format!("Try `perfloops {subcommand} --help`."),
        None => "Try `perfloops --help`.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Error, ErrorKind, error_json, error_text, parse_try_for};
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn try_for_rejects_negative_and_nan() {
        assert_eq!(parse_try_for(1.5).expect("ok"), Duration::from_millis(1500));
        assert_eq!(parse_try_for(0.0).expect("ok"), Duration::ZERO);
        assert_eq!(parse_try_for(-1.0).expect_err("neg").kind(), ErrorKind::Usage);
        assert_eq!(parse_try_for(f64::NAN).expect_err("nan").kind(), ErrorKind::Usage);
        assert_eq!(parse_try_for(86_400.0).expect("ok"), Duration::from_secs(86_400));
        assert_eq!(parse_try_for(1e19).expect_err("huge").kind(), ErrorKind::Usage);
    }

    #[test]
    fn error_json_carries_hint_and_causes() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::from_io(io, "missing.bin").with_hint("check it");
        let value = error_json(&err);
        let inner = &value["error"];
        assert_eq!(inner["kind"], "NotFound");
        assert_eq!(inner["message"], "not found");
        assert_eq!(inner["hint"], "check it");
        assert_eq!(inner["path"], "missing.bin");
        assert_eq!(inner["causes"][0], "no such file");
    }

    #[test]
    fn error_text_without_color_has_no_escapes() {
        let err = Error::new(ErrorKind::Usage)
            .with_message("bad kernel")
            .with_hint("use mov");
        let text = error_text(&err, false);
        assert_eq!(text, "error: bad kernel\nhint: use mov");
    }

    #[test]
    fn kernel_errors_name_kernel_and_backend() {
        let err = Error::new(ErrorKind::Usage)
            .with_message("count exceeds buffer")
            .with_kernel("mov");
        let value = error_json(&err);
        assert_eq!(value["error"]["kernel"], "mov");
        assert_eq!(value["error"]["backend"], perfloops::api::backend());

        let text = error_text(&err, false);
        assert!(text.ends_with(&format!("kernel: mov ({})", perfloops::api::backend())));

        let plain = error_json(&Error::new(ErrorKind::Usage));
        assert!(plain["error"].get("kernel").is_none());
        assert!(plain["error"].get("backend").is_none());
    }

    #[test]
    fn bench_counts_split_on_commas() {
        let cli = Cli::try_parse_from(["perfloops", "bench", "--counts", "1,2,3"]).expect("parse");
        match cli.command {
            super::Command::Bench { counts, .. } => assert_eq!(counts, vec![1, 2, 3]),
            _ => panic!("expected bench"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
