use anyhow::{anyhow, Context};
use bract_lib::config::LoggingConfig;
use bract_lib::dsl::{self, Interpreter};
use bract_lib::logging::init_logging;
use bract_lib::mcpclient::StdioConnector;
use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run, check or reformat an MCP test script
#[derive(Parser, Debug)]
#[command(name = "mcp-test", version)]
struct Cli {
    /// Only check the script for syntax errors
    #[arg(long)]
    validate: bool,

    /// Print the script in canonical form instead of running it
    #[arg(long)]
    format: bool,

    /// Where --format writes its output (stdout when omitted)
    #[arg(short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    /// Wall-clock limit on execution, e.g. 500ms, 30s, 1m30s; 0 disables it
    #[arg(long, default_value = "0", value_parser = parse_duration)]
    timeout: Duration,

    /// Script file
    script: Option<PathBuf>,
}

/// Legacy single-dash spellings of the long flags
const LEGACY_FLAGS: &[&str] = &["validate", "format", "timeout"];

/// Rewrite `-validate`, `-timeout=5s` and friends into their `--` form.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = text.strip_prefix('-').filter(|r| !r.starts_with('-')) else {
                return arg;
            };
            let name = rest.split('=').next().unwrap_or(rest);
            if LEGACY_FLAGS.contains(&name) {
                OsString::from(format!("-{}", text))
            } else {
                arg
            }
        })
        .collect()
}

/// Durations in the `300ms` / `1.5h` / `2m30s` style; a bare `0` is allowed.
fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut nanos = 0f64;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration '{}'", input));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid duration '{}'", input))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration '{}'", input)),
            unit => return Err(format!("unknown unit '{}' in duration '{}'", unit, input)),
        };
        nanos += value * unit_nanos;
        rest = &rest[unit_len..];
    }

    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return Err(format!("duration '{}' out of range", input));
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

async fn run(cli: Cli, script: PathBuf) -> anyhow::Result<()> {
    let source = tokio::fs::read_to_string(&script)
        .await
        .with_context(|| format!("failed to read {}", script.display()))?;

    if cli.validate {
        dsl::validate(&source).map_err(|e| anyhow!("validation failed: {}", e))?;
        println!("Script is valid");
        return Ok(());
    }

    if cli.format {
        let formatted = dsl::format_source(&source).map_err(|e| anyhow!("format failed: {}", e))?;
        match &cli.output {
            Some(path) => {
                tokio::fs::write(path, formatted)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Formatted script written to {}", path.display());
            }
            None => print!("{}", formatted),
        }
        return Ok(());
    }

    let parsed = dsl::parse(&source).map_err(|e| anyhow!("parse error: {}", e))?;

    let ct = CancellationToken::new();
    let interrupt = ct.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling script");
            interrupt.cancel();
        }
    });

    let mut interpreter = Interpreter::new(Arc::new(StdioConnector)).with_cancellation(ct);
    let result = if cli.timeout.is_zero() {
        interpreter.execute(&parsed).await.map_err(anyhow::Error::from)
    } else {
        match tokio::time::timeout(cli.timeout, interpreter.execute(&parsed)).await {
            Ok(result) => result.map_err(anyhow::Error::from),
            Err(_) => Err(anyhow!("execution timeout after {:?}", cli.timeout)),
        }
    };

    if let Err(e) = interpreter.close().await {
        tracing::warn!("Failed to close MCP client: {}", e);
    }

    result.context("execution failed")
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging(&LoggingConfig {
        level: "warn".to_string(),
        format: "text".to_string(),
    });

    let mut cli = Cli::parse_from(normalize_args(std::env::args_os()));
    let Some(script) = cli.script.take() else {
        eprintln!("{}", Cli::command().render_usage());
        return ExitCode::from(1);
    };

    match run(cli, script).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn legacy_flags_normalized() {
        let out = normalize_args(args(&["mcp-test", "-validate", "-timeout=5s", "-o", "x", "--format", "s.mcp"]));
        assert_eq!(out, args(&["mcp-test", "--validate", "--timeout=5s", "-o", "x", "--format", "s.mcp"]));
    }

    #[test]
    fn cli_accepts_both_spellings() {
        let cli = Cli::parse_from(normalize_args(args(&["mcp-test", "-format", "-o", "out.mcp", "in.mcp"])));
        assert!(cli.format);
        assert_eq!(cli.output, Some(PathBuf::from("out.mcp")));
        assert_eq!(cli.script, Some(PathBuf::from("in.mcp")));

        let cli = Cli::parse_from(normalize_args(args(&["mcp-test", "-timeout", "1m30s", "in.mcp"])));
        assert_eq!(cli.timeout, Duration::from_secs(90));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }
}
