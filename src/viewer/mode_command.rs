//! Command mode handler (`:` prompt).

use std::io;

use log::debug;

use super::input::CommandAction;
use super::state::{Bookmarks, Layout};
use super::terminal;
use super::{Effect, ViewerMode};
use crate::encoding::EncodingChoice;

/// Mutable state for command mode (`:` prompt).
pub(super) struct CommandState {
    pub input: String,
}

/// A parsed `:` command.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Command {
    Quit,
    /// 1-based data row.
    Goto(u64),
    /// Empty list clears the selection.
    Columns(Vec<String>),
    Find(String),
    Encoding(EncodingChoice),
    Reload,
    Marks,
    ClearMarks,
}

pub(super) fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let (name, arg) = match input.split_once(char::is_whitespace) {
        Some((n, a)) => (n, a.trim()),
        None => (input, ""),
    };
    match name {
        "q" | "quit" => Ok(Command::Quit),
        "goto" | "go" => arg
            .parse::<u64>()
            .map(Command::Goto)
            .map_err(|_| format!("goto: expected a row number, got '{arg}'")),
        // `:123` works like vim
        n if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => n
            .parse::<u64>()
            .map(Command::Goto)
            .map_err(|_| format!("row number too large: {n}")),
        "cols" | "columns" => Ok(Command::Columns(
            arg.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )),
        "find" => {
            if arg.is_empty() {
                Err("find: expected text".into())
            } else {
                Ok(Command::Find(arg.to_string()))
            }
        }
        "enc" | "encoding" => arg.parse().map(Command::Encoding),
        "reload" | "e" => Ok(Command::Reload),
        "marks" if arg == "clear" => Ok(Command::ClearMarks),
        "marks" => Ok(Command::Marks),
        _ => Err(format!("Unknown command: {input}")),
    }
}

/// Header names containing `needle`, case-insensitively.
pub(super) fn find_columns<'a>(header: &'a [String], needle: &str) -> Vec<&'a str> {
    let needle = needle.to_lowercase();
    header
        .iter()
        .filter(|h| h.to_lowercase().contains(&needle))
        .map(String::as_str)
        .collect()
}

pub(super) struct CommandCtx<'a> {
    pub header: &'a [String],
    pub data_rows: u64,
    pub bookmarks: &'a mut Bookmarks,
}

pub(super) fn handle(
    action: CommandAction,
    cs: &mut CommandState,
    ctx: &mut CommandCtx,
    layout: &Layout,
) -> io::Result<Vec<Effect>> {
    match action {
        CommandAction::Type(c) => {
            cs.input.push(c);
            terminal::draw_command_bar(layout, &cs.input)?;
            Ok(vec![])
        }
        CommandAction::Backspace => {
            if cs.input.is_empty() {
                // Empty input + Backspace → cancel (vim behavior)
                Ok(vec![Effect::SetMode(ViewerMode::Normal), Effect::MarkDirty])
            } else {
                cs.input.pop();
                terminal::draw_command_bar(layout, &cs.input)?;
                Ok(vec![])
            }
        }
        CommandAction::Execute => {
            let mut effects = vec![Effect::SetMode(ViewerMode::Normal), Effect::MarkDirty];
            if cs.input.trim().is_empty() {
                return Ok(effects);
            }
            debug!("command: {:?}", cs.input);
            effects.extend(execute(parse_command(&cs.input), ctx));
            Ok(effects)
        }
        CommandAction::Cancel => Ok(vec![Effect::SetMode(ViewerMode::Normal), Effect::MarkDirty]),
    }
}

fn execute(cmd: Result<Command, String>, ctx: &mut CommandCtx) -> Vec<Effect> {
    let cmd = match cmd {
        Ok(c) => c,
        Err(msg) => return vec![Effect::Flash(msg)],
    };
    match cmd {
        Command::Quit => vec![Effect::Quit],
        Command::Goto(n) if n == 0 || n > ctx.data_rows => vec![Effect::Flash(format!(
            "Row {n} out of range (1-{})",
            ctx.data_rows
        ))],
        Command::Goto(n) => vec![Effect::ScrollTo(n - 1)],
        Command::Columns(names) => vec![Effect::SelectColumns(names)],
        Command::Find(needle) => {
            let found = find_columns(ctx.header, &needle);
            let msg = if found.is_empty() {
                format!("No column matches '{needle}'")
            } else {
                format!("{} match '{needle}': {}", found.len(), found.join(", "))
            };
            vec![Effect::Flash(msg)]
        }
        Command::Encoding(enc) => vec![Effect::Reopen(Some(enc))],
        Command::Reload => vec![Effect::Reopen(None)],
        Command::Marks => vec![Effect::Flash(ctx.bookmarks.summary())],
        Command::ClearMarks => {
            ctx.bookmarks.clear();
            vec![Effect::Flash("Bookmarks cleared".into())]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Encoding;

    #[test]
    fn test_parses_commands() {
        assert_eq!(parse_command("q"), Ok(Command::Quit));
        assert_eq!(parse_command(" goto  5000 "), Ok(Command::Goto(5000)));
        assert_eq!(parse_command("42"), Ok(Command::Goto(42)));
        assert_eq!(
            parse_command("cols name, city ,"),
            Ok(Command::Columns(vec!["name".into(), "city".into()]))
        );
        assert_eq!(parse_command("cols"), Ok(Command::Columns(vec![])));
        assert_eq!(parse_command("find Na"), Ok(Command::Find("Na".into())));
        assert_eq!(
            parse_command("enc gbk"),
            Ok(Command::Encoding(EncodingChoice::Fixed(Encoding::Gbk)))
        );
        assert_eq!(parse_command("enc auto"), Ok(Command::Encoding(EncodingChoice::Auto)));
        assert_eq!(parse_command("marks clear"), Ok(Command::ClearMarks));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse_command("goto x").is_err());
        assert!(parse_command("find").is_err());
        assert!(parse_command("enc klingon").is_err());
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn test_find_is_case_insensitive_substring() {
        let header: Vec<String> = ["ID", "First Name", "Last Name", "City"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(find_columns(&header, "name"), ["First Name", "Last Name"]);
        assert_eq!(find_columns(&header, "CI"), ["City"]);
        assert!(find_columns(&header, "zip").is_empty());
    }

    #[test]
    fn test_goto_out_of_range_flashes() {
        let mut b = Bookmarks::default();
        let mut ctx = CommandCtx {
            header: &[],
            data_rows: 10,
            bookmarks: &mut b,
        };
        let out = execute(Ok(Command::Goto(11)), &mut ctx);
        assert!(matches!(&out[..], [Effect::Flash(m)] if m.contains("out of range")));
        let out = execute(Ok(Command::Goto(10)), &mut ctx);
        assert!(matches!(&out[..], [Effect::ScrollTo(9)]));
    }
}
