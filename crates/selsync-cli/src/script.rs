//! Session commands, shared by the interactive prompt and replay scripts.

use selsync_core::host::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// User selects a table row.
    Row(usize),
    /// User selects a region.
    Region(usize),
    ClearRow,
    ClearRegion,
    Start,
    Stop,
    Status,
    /// Run one tick; both sides (table first) when no side is given.
    /// Replay only.
    Tick(Option<Side>),
    Quit,
}

pub const COMMAND_HELP: &str = "\
Commands:
  row N          select table row N
  region N       select region N
  clear-row      clear the table selection
  clear-region   clear the region selection
  start          start both watchers
  stop           stop both watchers
  status         show watcher and selection status
  tick [SIDE]    run one tick on table, regions or both (replay only)
  quit           end the session
";

/// Parse one line. Blank lines and `#` comments yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let name = words.next().unwrap_or_default();
    let arg = words.next();
    if let Some(extra) = words.next() {
        return Err(format!("unexpected argument {extra:?} for {name}"));
    }

    let command = match (name, arg) {
        ("row", Some(raw)) => Command::Row(parse_index(raw)?),
        ("region", Some(raw)) => Command::Region(parse_index(raw)?),
        ("row" | "region", None) => return Err(format!("{name} requires an index")),
        ("clear-row", None) => Command::ClearRow,
        ("clear-region", None) => Command::ClearRegion,
        ("start", None) => Command::Start,
        ("stop", None) => Command::Stop,
        ("status", None) => Command::Status,
        ("quit" | "exit", None) => Command::Quit,
        ("tick", None) => Command::Tick(None),
        ("tick", Some("table")) => Command::Tick(Some(Side::Table)),
        ("tick", Some("regions")) => Command::Tick(Some(Side::Regions)),
        ("tick", Some(other)) => {
            return Err(format!("unknown side {other:?}, expected table or regions"))
        }
        (_, Some(extra)) if is_known(name) => {
            return Err(format!("unexpected argument {extra:?} for {name}"))
        }
        _ => return Err(format!("unknown command {name:?}")),
    };
    Ok(Some(command))
}

fn is_known(name: &str) -> bool {
    matches!(
        name,
        "clear-row" | "clear-region" | "start" | "stop" | "status" | "quit" | "exit"
    )
}

fn parse_index(raw: &str) -> Result<usize, String> {
    raw.parse::<usize>()
        .map_err(|_| format!("invalid index {raw:?}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_selection_commands() {
        assert_eq!(parse_command("row 3").unwrap(), Some(Command::Row(3)));
        assert_eq!(parse_command("  region 0 ").unwrap(), Some(Command::Region(0)));
        assert_eq!(parse_command("clear-row").unwrap(), Some(Command::ClearRow));
        assert_eq!(
            parse_command("tick regions").unwrap(),
            Some(Command::Tick(Some(Side::Regions)))
        );
        assert_eq!(parse_command("tick").unwrap(), Some(Command::Tick(None)));
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        assert_eq!(parse_command("").unwrap(), None);
        assert_eq!(parse_command("# select the fallback row").unwrap(), None);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(
            parse_command("row").unwrap_err(),
            "row requires an index"
        );
        assert_eq!(
            parse_command("row -1").unwrap_err(),
            "invalid index \"-1\""
        );
        assert_eq!(
            parse_command("stop now").unwrap_err(),
            "unexpected argument \"now\" for stop"
        );
        assert_eq!(
            parse_command("select 1").unwrap_err(),
            "unknown command \"select\""
        );
        assert!(parse_command("tick both").is_err());
    }
}
