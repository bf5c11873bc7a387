//! selsync-cli: command-line surface for the selection watchers.

pub mod driver;
pub mod logging;
pub mod script;
pub mod session;

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use selsync_core::config::SyncConfig;
use selsync_core::event::{InMemoryEventSink, TracingEventSink};
use selsync_watch::{LifecycleError, StopReason};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::driver::{format_event, SessionDriver};
use crate::script::{parse_command, Command, COMMAND_HELP};
use crate::session::Session;

static VERSION: OnceLock<String> = OnceLock::new();

/// Set the version string for `--version` output.
pub fn set_version(version: &str) {
    let _ = VERSION.set(version.to_string());
}

fn get_version() -> &'static str {
    VERSION.get().map(|s| s.as_str()).unwrap_or("dev")
}

fn help_text() -> String {
    "\
selsync keeps a results table and a region list selecting the same object.

Usage:
  selsync [command]

Available Commands:
  config      Print the effective configuration
  help        Help about any command
  replay      Run a command script against a session with a manual clock
  start       Start both watchers against a session and read commands

Flags:
  -h, --help      help for selsync
  -v, --version   version for selsync

Use \"selsync [command] --help\" for more information about a command.\n"
        .to_string()
}

const START_HELP: &str = concat!(
    "Usage: selsync start --session FILE [--config FILE]\n",
    "\n",
    "Start both watchers against a session, then read commands from stdin.\n",
    "`stop` and `start` pause and resume polling. Ctrl-C or `quit` stops the\n",
    "watchers and ends the session.\n",
    "\n",
    "Flags:\n",
    "  --session FILE   session fixture (YAML)\n",
    "  --config FILE    configuration file\n",
);

const REPLAY_HELP: &str = concat!(
    "Usage: selsync replay --session FILE --script FILE [--config FILE]\n",
    "\n",
    "Run a command script against a session. Watchers only tick on `tick`\n",
    "commands, so the output is deterministic.\n",
    "\n",
    "Flags:\n",
    "  --session FILE   session fixture (YAML)\n",
    "  --script FILE    one command per line\n",
    "  --config FILE    configuration file\n",
);

const CONFIG_HELP: &str = concat!(
    "Usage: selsync config [--config FILE]\n",
    "\n",
    "Print the effective configuration after file and environment overrides.\n",
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    fn success(stdout: String) -> Self {
        Self {
            stdout,
            stderr: String::new(),
            exit_code: 0,
        }
    }
}

type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Run with an empty environment, so results do not depend on `SELSYNC_*`.
pub fn run_cli_for_test(args: &[&str]) -> CommandOutput {
    run_cli_with_env(args, &|_| None)
}

pub fn run_cli(args: &[String]) -> CommandOutput {
    let refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    run_cli_with_env(&refs, &|key| std::env::var(key).ok())
}

pub fn run_cli_with_env(args: &[&str], env: EnvLookup<'_>) -> CommandOutput {
    let Some((cmd, rest)) = args.split_first() else {
        return CommandOutput::success(help_text());
    };

    let result = match *cmd {
        "--help" | "-h" | "help" => return CommandOutput::success(help_text()),
        "--version" | "-v" => {
            return CommandOutput::success(format!("selsync version {}\n", get_version()))
        }
        "start" => execute_start(rest, env),
        "replay" => execute_replay(rest, env),
        "config" => execute_config(rest, env),
        _ => Err((1, format!("Error: unknown command \"{cmd}\" for \"selsync\""))),
    };
    match result {
        Ok(output) => output,
        // Help requested from a subcommand.
        Err((0, help)) => CommandOutput::success(help),
        Err((exit_code, message)) => CommandOutput {
            stdout: String::new(),
            stderr: format!("{message}\n"),
            exit_code,
        },
    }
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Flags {
    session: Option<PathBuf>,
    script: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_flags(args: &[&str], allowed: &[&str], help: &str) -> Result<Flags, (i32, String)> {
    let mut flags = Flags::default();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i];
        if arg == "--help" || arg == "-h" {
            return Err((0, help.to_string()));
        }
        let Some(body) = arg.strip_prefix("--") else {
            return Err((2, format!("unexpected argument: {arg}")));
        };
        let (name, value) = match body.split_once('=') {
            Some((name, value)) => (name, value.to_string()),
            None => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return Err((2, format!("flag --{body} requires a value")));
                };
                (body, (*value).to_string())
            }
        };
        if !allowed.contains(&name) {
            return Err((2, format!("unknown flag: --{name}")));
        }
        let slot = match name {
            "session" => &mut flags.session,
            "script" => &mut flags.script,
            _ => &mut flags.config,
        };
        *slot = Some(PathBuf::from(value));
        i += 1;
    }
    Ok(flags)
}

fn required(value: Option<PathBuf>, flag: &str) -> Result<PathBuf, (i32, String)> {
    value.ok_or_else(|| (2, format!("flag --{flag} is required")))
}

fn load_config(path: Option<&Path>, env: EnvLookup<'_>) -> Result<SyncConfig, (i32, String)> {
    SyncConfig::load_with_env(path, env).map_err(|err| (1, format!("Error: {err}")))
}

fn load_session(path: &Path) -> Result<Session, (i32, String)> {
    Session::load(path).map_err(|err| (1, format!("Error: {err}")))
}

fn build_runtime(enable_io: bool) -> Result<tokio::runtime::Runtime, (i32, String)> {
    let mut builder = tokio::runtime::Builder::new_current_thread();
    if enable_io {
        builder.enable_all();
    } else {
        builder.enable_time();
    }
    builder
        .build()
        .map_err(|err| (1, format!("Error: failed to start runtime: {err}")))
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn execute_config(args: &[&str], env: EnvLookup<'_>) -> Result<CommandOutput, (i32, String)> {
    let flags = parse_flags(args, &["config"], CONFIG_HELP)?;
    let cfg = load_config(flags.config.as_deref(), env)?;
    let rendered = cfg.to_yaml().map_err(|err| (1, format!("Error: {err}")))?;
    Ok(CommandOutput::success(rendered))
}

// ---------------------------------------------------------------------------
// replay
// ---------------------------------------------------------------------------

fn execute_replay(args: &[&str], env: EnvLookup<'_>) -> Result<CommandOutput, (i32, String)> {
    let flags = parse_flags(args, &["session", "script", "config"], REPLAY_HELP)?;
    let session_path = required(flags.session, "session")?;
    let script_path = required(flags.script, "script")?;
    let cfg = load_config(flags.config.as_deref(), env)?;
    let session = load_session(&session_path)?;

    let raw = std::fs::read_to_string(&script_path).map_err(|err| {
        (
            1,
            format!("Error: failed to read script {}: {err}", script_path.display()),
        )
    })?;
    let mut commands = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        match parse_command(line) {
            Ok(Some(command)) => commands.push((index + 1, line.trim().to_string(), command)),
            Ok(None) => {}
            Err(msg) => {
                return Err((
                    1,
                    format!("Error: {}:{}: {msg}", script_path.display(), index + 1),
                ))
            }
        }
    }

    let events = Arc::new(InMemoryEventSink::new());
    let driver = SessionDriver::manual(session, &cfg, events.clone())
        .map_err(|err| (1, format!("Error: {err}")))?;
    let runtime = build_runtime(false)?;
    let (stdout, failure) = runtime.block_on(replay(&driver, &events, &commands));
    match failure {
        None => Ok(CommandOutput::success(stdout)),
        Some((line, msg)) => Ok(CommandOutput {
            stdout,
            stderr: format!("Error: {}:{line}: {msg}\n", script_path.display()),
            exit_code: 1,
        }),
    }
}

async fn replay(
    driver: &SessionDriver,
    events: &InMemoryEventSink,
    commands: &[(usize, String, Command)],
) -> (String, Option<(usize, String)>) {
    let mut stdout = String::new();
    for (line, text, command) in commands {
        stdout.push_str(&format!("> {text}\n"));
        if *command == Command::Quit {
            break;
        }
        let result = driver.execute(*command).await;
        if let Ok(lines) = &result {
            for output in lines {
                stdout.push_str(output);
                stdout.push('\n');
            }
        }
        for event in events.events() {
            stdout.push_str(&format_event(&event));
            stdout.push('\n');
        }
        events.clear();
        if let Err(msg) = result {
            return (stdout, Some((*line, msg)));
        }
    }
    (stdout, None)
}

// ---------------------------------------------------------------------------
// start
// ---------------------------------------------------------------------------

fn execute_start(args: &[&str], env: EnvLookup<'_>) -> Result<CommandOutput, (i32, String)> {
    let flags = parse_flags(args, &["session", "config"], START_HELP)?;
    let session_path = required(flags.session, "session")?;
    let cfg = load_config(flags.config.as_deref(), env)?;
    let session = load_session(&session_path)?;

    // An embedding process may already have a subscriber.
    if let Err(err) = logging::init_logging(&cfg.logging) {
        tracing::debug!(error = %err, "keeping existing log subscriber");
    }

    let driver = SessionDriver::polling(session, &cfg, Arc::new(TracingEventSink))
        .map_err(|err| (1, format!("Error: {err}")))?;
    let runtime = build_runtime(true)?;
    let result = runtime.block_on(async {
        let input = tokio::io::BufReader::new(tokio::io::stdin());
        let mut out = std::io::stdout();
        run_start_session(&driver, input, &mut out, cancel_signal()).await
    });
    // A pending stdin read would otherwise keep the runtime alive.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result.map_err(|err| (1, format!("Error: {err}")))?;
    Ok(CommandOutput::success(String::new()))
}

async fn cancel_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartSessionError {
    #[error("failed to start watchers: {0}")]
    Watchers(#[from] LifecycleError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Start both watchers, then read commands as [`run_interactive`] does.
pub async fn run_start_session<R, W>(
    driver: &SessionDriver,
    input: R,
    out: &mut W,
    signal: impl Future<Output = ()>,
) -> Result<(), StartSessionError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    driver.lifecycle().start()?;
    run_interactive(driver, input, out, signal).await?;
    Ok(())
}

/// Read commands from `input` until `quit`, end of input or `signal`.
///
/// `signal` stops the watchers with [`StopReason::Signal`]; any other exit
/// stops them as a manual stop.
pub async fn run_interactive<R, W>(
    driver: &SessionDriver,
    input: R,
    out: &mut W,
    signal: impl Future<Output = ()>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    tokio::pin!(signal);
    write!(out, "{COMMAND_HELP}")?;
    out.flush()?;

    loop {
        let line = tokio::select! {
            biased;
            _ = &mut signal => {
                driver.shutdown(StopReason::Signal).await;
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => match driver.execute(command).await {
                Ok(output) => {
                    for text in output {
                        writeln!(out, "{text}")?;
                    }
                }
                Err(msg) => writeln!(out, "error: {msg}")?,
            },
            Err(msg) => writeln!(out, "error: {msg}")?,
        }
        out.flush()?;
    }

    driver.shutdown(StopReason::Manual).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_args_shows_help() {
        let out = run_cli_for_test(&[]);
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.contains("Available Commands:"));
        assert!(out.stderr.is_empty());
    }

    #[test]
    fn start_help_matches_command_summary() {
        let out = run_cli_for_test(&["start", "--help"]);
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.starts_with("Usage: selsync start --session FILE"));
        assert!(out.stdout.contains("Start both watchers against a session, then read"));
        assert!(help_text().contains("start       Start both watchers against a session"));
    }

    #[test]
    fn version_flag_prints_version() {
        for flag in ["--version", "-v"] {
            let out = run_cli_for_test(&[flag]);
            assert_eq!(out.exit_code, 0);
            assert!(out.stdout.starts_with("selsync version "), "flag={flag}");
        }
    }

    #[test]
    fn unknown_command_exits_1() {
        let out = run_cli_for_test(&["sync"]);
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stderr, "Error: unknown command \"sync\" for \"selsync\"\n");
    }

    #[test]
    fn subcommand_help_exits_0() {
        let out = run_cli_for_test(&["replay", "--help"]);
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.starts_with("Usage: selsync replay"));
    }

    #[test]
    fn flag_errors_are_usage_errors() {
        let out = run_cli_for_test(&["replay", "--session"]);
        assert_eq!(out.exit_code, 2);
        assert_eq!(out.stderr, "flag --session requires a value\n");

        let out = run_cli_for_test(&["config", "--script", "x"]);
        assert_eq!(out.exit_code, 2);
        assert_eq!(out.stderr, "unknown flag: --script\n");

        let out = run_cli_for_test(&["start", "extra"]);
        assert_eq!(out.exit_code, 2);

        let out = run_cli_for_test(&["replay", "--session=s.yaml"]);
        assert_eq!(out.exit_code, 2);
        assert_eq!(out.stderr, "flag --script is required\n");
    }

    #[test]
    fn env_overrides_reach_config_output() {
        let env = |key: &str| match key {
            "SELSYNC_POLL_INTERVAL_MS" => Some("50".to_string()),
            "SELSYNC_FAULT_POLICY" => Some("stop-all".to_string()),
            _ => None,
        };
        let out = run_cli_with_env(&["config"], &env);
        assert_eq!(out.exit_code, 0, "stderr={}", out.stderr);
        assert!(out.stdout.contains("poll_interval_ms: 50\n"));
        assert!(out.stdout.contains("fault_policy: stop-all\n"));
    }

    #[test]
    fn invalid_env_override_exits_1() {
        let env = |key: &str| (key == "SELSYNC_POLL_INTERVAL_MS").then(|| "5".to_string());
        let out = run_cli_with_env(&["config"], &env);
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.starts_with("Error: "));
    }
}
