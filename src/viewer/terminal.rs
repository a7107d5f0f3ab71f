//! Terminal I/O layer: raw mode, grid, status bar, command prompt.

use crossterm::{
    ExecutableCommand, QueueableCommand, cursor,
    style::{self, Stylize},
    terminal,
};
use std::io::{self, Write, stdout};

use super::state::{Layout, gutter_width};
use crate::dispatch::Dispatcher;
use crate::encoding::Encoding;
use crate::parse::Delimiter;

const ELLIPSIS: char = '…';

// ---------------------------------------------------------------------------
// RawGuard: restores raw mode / alternate screen / cursor on Drop
// ---------------------------------------------------------------------------

pub(super) struct RawGuard {
    cleaned: bool,
}

impl RawGuard {
    pub(super) fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        stdout().execute(terminal::EnterAlternateScreen)?;
        stdout().execute(cursor::Hide)?;
        Ok(Self { cleaned: false })
    }

    pub(super) fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        let mut out = stdout();
        let _ = out.execute(cursor::Show);
        let _ = out.execute(terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

pub(super) fn clear_screen() -> io::Result<()> {
    let mut out = stdout();
    out.queue(terminal::Clear(terminal::ClearType::All))?;
    out.flush()
}

// ---------------------------------------------------------------------------
// Cell formatting
// ---------------------------------------------------------------------------

/// Fit `text` into exactly `width` characters: control characters become
/// spaces, overlong text ends in an ellipsis, short text is padded.
pub(super) fn fit(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(width);
    let mut n = 0;
    let mut chars = text.chars().map(|c| if c.is_control() { ' ' } else { c });
    while n < width {
        match chars.next() {
            Some(c) => {
                out.push(c);
                n += 1;
            }
            None => break,
        }
    }
    if n == width && width > 0 && chars.next().is_some() {
        out.pop();
        out.push(ELLIPSIS);
    }
    out.extend(std::iter::repeat_n(' ', width - n));
    out
}

/// One grid line: right-aligned label in the gutter, then fixed-width cells
/// separated by a space, padded to `term_cols`.
pub(super) fn format_row<'a>(
    label: Option<u64>,
    cells: impl Iterator<Item = Option<&'a str>>,
    gutter: u16,
    column_width: u16,
    term_cols: u16,
) -> String {
    let gutter = gutter as usize;
    let mut line = match label {
        Some(n) => format!("{:>w$} ", n, w = gutter.saturating_sub(1)),
        None => " ".repeat(gutter),
    };
    for cell in cells {
        line.push_str(&fit(cell.unwrap_or(""), column_width as usize));
        line.push(' ');
    }
    fit(&line, term_cols as usize)
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Header line plus every grid row, from the dispatcher's window.
pub(super) fn draw_grid(layout: &Layout, d: &Dispatcher) -> io::Result<()> {
    let mut out = stdout();
    let gutter = gutter_width(d.data_row_count());
    let ncols = d.column_count().min(layout.fitting_columns(gutter));

    let header = format_row(
        None,
        (0..ncols).map(|c| d.header_label(c)),
        gutter,
        layout.column_width,
        layout.term_cols,
    );
    out.queue(cursor::MoveTo(0, 0))?;
    write!(out, "{}", header.bold().underlined())?;

    let shown = d.row_count();
    for r in 0..layout.grid_rows as usize {
        out.queue(cursor::MoveTo(0, layout.grid_top + r as u16))?;
        if r < shown {
            let line = format_row(
                d.row_label(r),
                (0..ncols).map(|c| d.cell(r, c)),
                gutter,
                layout.column_width,
                layout.term_cols,
            );
            let cut = line
                .char_indices()
                .nth(gutter as usize)
                .map_or(line.len(), |(i, _)| i);
            let (label, cells) = line.split_at(cut);
            write!(out, "{}{}", label.dark_grey(), cells)?;
        } else {
            write!(out, "{}", fit("~", layout.term_cols as usize).dark_grey())?;
        }
    }
    out.queue(style::ResetColor)?;
    out.flush()
}

// ---------------------------------------------------------------------------
// Status bar
// ---------------------------------------------------------------------------

/// Everything the status bar shows.
pub(super) struct StatusInfo<'a> {
    pub filename: &'a str,
    /// 1-based data rows on screen, if any.
    pub rows_shown: Option<(u64, u64)>,
    pub total_rows: u64,
    pub encoding: Option<Encoding>,
    pub delimiter: Option<Delimiter>,
    pub indexing: bool,
    pub loading: bool,
    pub acc_peek: Option<u32>,
    pub flash: Option<&'a str>,
    pub perf: String,
}

pub(super) fn format_status(info: &StatusInfo, width: usize) -> String {
    let mut parts = vec![format!(" {}", info.filename)];
    if info.indexing {
        parts.push("indexing…".into());
    } else {
        match info.rows_shown {
            Some((a, b)) => parts.push(format!("rows {a}-{b} / {}", info.total_rows)),
            None => parts.push(format!("{} rows", info.total_rows)),
        }
        if let (Some(enc), Some(delim)) = (info.encoding, info.delimiter) {
            parts.push(format!("{enc} {delim}"));
        }
    }
    if info.loading {
        parts.push("loading".into());
    }
    if let Some(msg) = info.flash {
        parts.push(msg.to_string());
    } else if let Some(n) = info.acc_peek {
        parts.push(format!(":{n}_"));
    } else if !info.perf.is_empty() {
        parts.push(info.perf.clone());
    } else {
        parts.push("[j/k d/u f/b Ng m ' ::cmd q:quit]".into());
    }
    fit(&parts.join(" | "), width)
}

pub(super) fn draw_status_bar(layout: &Layout, info: &StatusInfo) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(0, layout.status_row))?;
    let line = format_status(info, layout.term_cols as usize);
    write!(out, "{}", line.on_dark_grey().white())?;
    out.queue(style::ResetColor)?;
    out.flush()
}

/// Draw command input bar on the status row (`:input_` prompt).
pub(super) fn draw_command_bar(layout: &Layout, input: &str) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(0, layout.status_row))?;
    let prompt = fit(&format!(":{input}_"), layout.term_cols as usize);
    write!(out, "{}", prompt.on_dark_grey().white())?;
    out.queue(style::ResetColor)?;
    out.flush()
}

pub(super) fn check_tty() -> anyhow::Result<()> {
    use std::io::IsTerminal;
    // Only stdout matters. crossterm's `use-dev-tty` reads keys from /dev/tty.
    if !io::stdout().is_terminal() {
        anyhow::bail!(
            "rowscope viewer requires an interactive terminal.\n\
             \n\
             To print rows instead, use: rowscope rows <file.csv> --start 1 --count 20"
        );
    }
    Ok(())
}
