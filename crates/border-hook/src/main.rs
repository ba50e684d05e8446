mod bootstrap_helpers;
mod guard_config;

use std::{
    future::Future,
    io::{Read, Write},
    panic::AssertUnwindSafe,
    path::PathBuf,
    process::ExitCode,
};

use border_cli::Cli;
use border_guard::{
    AdmissionReason, AdmissionVerdict, BorderGuard, Evaluation, GuardConfig, GuardOutcome,
    DEFAULT_QUARANTINE_DIR, EXIT_CODE_ALLOW, EXIT_CODE_BLOCK,
};
use clap::{error::ErrorKind, Parser};
use tokio::runtime::Runtime;

use crate::bootstrap_helpers::init_tracing;
use crate::guard_config::build_guard_config;

fn main() -> ExitCode {
    init_tracing();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => return reject_arguments(&error),
    };

    let mut raw = Vec::new();
    let read_result = std::io::stdin().lock().read_to_end(&mut raw);
    let outcome = match read_result {
        Ok(_) => run_hook(&cli, &raw),
        Err(read_error) => fallback_guard(&cli).finish(
            &raw,
            internal_error(format!("failed to read hook payload from stdin: {read_error}")),
        ),
    };
    report(&outcome);
    exit_code(outcome.exit_code())
}

/// Every failure past argument parsing resolves to a block verdict.
fn run_hook(cli: &Cli, raw: &[u8]) -> GuardOutcome {
    let guard = match build_guard_config(cli) {
        Ok(config) => BorderGuard::new(config),
        Err(config_error) => {
            return fallback_guard(cli).finish(
                raw,
                internal_error(format!("invalid guard configuration: {config_error:#}")),
            )
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(runtime_error) => {
            return guard.finish(
                raw,
                internal_error(format!("failed to start async runtime: {runtime_error}")),
            )
        }
    };

    let evaluation = evaluate_fail_closed(&runtime, guard.evaluate(raw));
    // A blocking DNS lookup may still be running; do not wait for it.
    runtime.shutdown_background();
    guard.finish(raw, evaluation)
}

/// Drives `evaluation` to a verdict, turning a shutdown signal or panic into a block.
fn evaluate_fail_closed<F>(runtime: &Runtime, evaluation: F) -> Evaluation
where
    F: Future<Output = Evaluation>,
{
    std::panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(async {
            tokio::select! {
                evaluation = evaluation => evaluation,
                signal = shutdown_signal() => {
                    internal_error(format!("interrupted by {signal} before a verdict was reached"))
                }
            }
        })
    }))
    .unwrap_or_else(|_| internal_error("guard evaluation panicked"))
}

/// Help and version exit 0. Any other argument error blocks and is quarantined.
fn reject_arguments(error: &clap::Error) -> ExitCode {
    let _ = error.print();
    if matches!(
        error.kind(),
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
    ) {
        return exit_code(EXIT_CODE_ALLOW);
    }

    let mut raw = Vec::new();
    let _ = std::io::stdin().lock().read_to_end(&mut raw);
    let guard = BorderGuard::new(GuardConfig {
        quarantine_dir: argument_error_quarantine_dir(std::env::var_os("BORDER_QUARANTINE_DIR")),
        ..GuardConfig::default()
    });
    let outcome = guard.finish(
        &raw,
        internal_error(format!(
            "invalid arguments: {}",
            argument_error_summary(&error.to_string())
        )),
    );
    report(&outcome);
    exit_code(outcome.exit_code())
}

/// Flags were not parsed, so only the environment can relocate the quarantine.
fn argument_error_quarantine_dir(from_env: Option<std::ffi::OsString>) -> PathBuf {
    from_env
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_QUARANTINE_DIR))
}

fn argument_error_summary(rendered: &str) -> &str {
    let line = rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("unrecognized arguments");
    line.strip_prefix("error: ").unwrap_or(line)
}

/// Guard used only to quarantine failures that happen before a real config exists.
fn fallback_guard(cli: &Cli) -> BorderGuard {
    BorderGuard::new(GuardConfig {
        quarantine_dir: cli.quarantine_dir.clone(),
        ..GuardConfig::default()
    })
}

fn internal_error(detail: impl AsRef<str>) -> Evaluation {
    Evaluation {
        verdict: AdmissionVerdict::block(AdmissionReason::InternalError, detail),
        event: None,
    }
}

async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = terminate.recv() => return "SIGTERM",
                _ = interrupt() => return "SIGINT",
            }
        }
    }
    interrupt().await;
    "SIGINT"
}

/// Resolves on ctrl-c; never resolves when the handler cannot be installed.
async fn interrupt() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn report(outcome: &GuardOutcome) {
    if outcome.verdict.is_allow() {
        return;
    }
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{}", outcome.verdict.message);
    if let Some(quarantine_error) = outcome.quarantine_error.as_deref() {
        let _ = writeln!(
            stderr,
            "border-hook: quarantine record was not written: {quarantine_error}"
        );
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(EXIT_CODE_BLOCK as u8))
}
