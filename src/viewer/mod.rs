//! Terminal table viewer.
//!
//! Layout:
//!   row 0               : column names
//!   row 1..term_rows-1  : data rows (row-label gutter + fixed-width cells)
//!   row term_rows-1     : status bar / command prompt
//!
//! All file I/O happens on the dispatcher's worker thread. This loop only
//! feeds it scroll positions and viewport size, drains its results, and
//! repaints from the window buffer. Redraws are coalesced to one per frame
//! budget.

mod input;
mod mode_command;
mod mode_normal;
mod state;
mod terminal;

use crossterm::{
    event::{self, Event},
    terminal as crossterm_terminal,
};
use log::{debug, info};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::dispatch::{Dispatcher, ViewEvent};
use crate::encoding::EncodingChoice;

use input::{InputAccumulator, map_command_key, map_key_event};
use mode_command::{CommandCtx, CommandState};
use mode_normal::NormalCtx;
use state::{Layout, ViewState};
use terminal::StatusInfo;

const IDLE_POLL: Duration = Duration::from_secs(86400);

/// Current input mode.
pub(super) enum ViewerMode {
    Normal,
    Command(CommandState),
}

/// What a mode handler asks the event loop to do.
pub(super) enum Effect {
    /// Move the top of the viewport to a 0-based data row.
    ScrollTo(u64),
    /// Restrict displayed columns by header name; empty shows all.
    SelectColumns(Vec<String>),
    /// Re-index the file, optionally with a new encoding.
    Reopen(Option<EncodingChoice>),
    Flash(String),
    RedrawStatusBar,
    MarkDirty,
    SetMode(ViewerMode),
    Quit,
}

/// Run the terminal viewer on `path` until the user quits.
pub fn run(path: PathBuf, config: Config) -> anyhow::Result<()> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    terminal::check_tty()?;

    let (term_cols, term_rows) = crossterm_terminal::size()
        .map_err(|e| anyhow::anyhow!("failed to get terminal size: {e}"))?;
    let mut layout = state::compute_layout(term_cols, term_rows, config.viewer.column_width);

    let mut dispatcher =
        Dispatcher::spawn(config.viewer.dispatch_settings(layout.grid_rows as usize))
            .map_err(|e| anyhow::anyhow!("failed to start I/O worker: {e}"))?;
    let mut index_options = config.index;
    dispatcher.open(&path, index_options);

    let mut guard = terminal::RawGuard::enter()?;
    terminal::clear_screen()?;

    let mut view = ViewState::new(filename);
    let mut mode = ViewerMode::Normal;
    let mut acc = InputAccumulator::new();
    let frame_budget = config.viewer.frame_budget;
    let scroll_step = config.viewer.scroll_step as u64;

    let mut dirty = true;
    let mut last_render = Instant::now();

    loop {
        for ev in dispatcher.poll(Instant::now()) {
            dirty |= apply_view_event(ev, &mut view);
        }

        let now = Instant::now();
        let mut timeout = if dirty {
            frame_budget.saturating_sub(last_render.elapsed())
        } else {
            IDLE_POLL
        };
        // Worker results arrive over a channel, not as terminal events.
        if dispatcher.is_busy() {
            timeout = timeout.min(frame_budget);
        }
        if let Some(deadline) = dispatcher.next_deadline() {
            timeout = timeout.min(deadline.saturating_duration_since(now));
        }

        if event::poll(timeout)? {
            let ev = event::read()?;
            debug!("event: {:?}", ev);

            let effects = match ev {
                Event::Key(key_event) => {
                    let had_flash = view.flash.take().is_some();
                    match &mut mode {
                        ViewerMode::Normal => match map_key_event(key_event, &mut acc) {
                            Some(action) => mode_normal::handle(
                                action,
                                &mut NormalCtx {
                                    position: dispatcher.position(),
                                    data_rows: dispatcher.data_row_count(),
                                    grid_rows: layout.grid_rows as u64,
                                    scroll_step,
                                    bookmarks: &mut view.bookmarks,
                                },
                            ),
                            None if acc.is_active() || had_flash => {
                                acc.reset();
                                vec![Effect::RedrawStatusBar]
                            }
                            None => vec![],
                        },
                        ViewerMode::Command(cs) => match map_command_key(key_event) {
                            Some(action) => mode_command::handle(
                                action,
                                cs,
                                &mut CommandCtx {
                                    header: dispatcher.header(),
                                    data_rows: dispatcher.data_row_count(),
                                    bookmarks: &mut view.bookmarks,
                                },
                                &layout,
                            )?,
                            None => vec![],
                        },
                    }
                }
                Event::Resize(new_cols, new_rows) => {
                    layout = state::compute_layout(new_cols, new_rows, config.viewer.column_width);
                    debug!(
                        "resize: {new_cols}x{new_rows}, grid rows {}",
                        layout.grid_rows
                    );
                    terminal::clear_screen()?;
                    for ev in dispatcher.set_visible_row_count(layout.grid_rows as usize, Instant::now())
                    {
                        apply_view_event(ev, &mut view);
                    }
                    vec![Effect::MarkDirty]
                }
                _ => vec![],
            };

            for effect in effects {
                match effect {
                    Effect::Quit => {
                        guard.cleanup();
                        info!("viewer: quit ({})", dispatcher.perf().format_summary());
                        return Ok(());
                    }
                    Effect::ScrollTo(row) => {
                        for ev in dispatcher.scroll_to(row, Instant::now()) {
                            apply_view_event(ev, &mut view);
                        }
                        dirty = true;
                    }
                    Effect::SelectColumns(names) => {
                        let n = dispatcher.set_selected_columns(&names);
                        view.flash = Some(if names.is_empty() {
                            format!("Showing all {n} columns")
                        } else if n == 0 {
                            format!("No column named {}", names.join(", "))
                        } else {
                            format!("Showing {n} of {} columns", dispatcher.header().len())
                        });
                        dirty = true;
                    }
                    Effect::Reopen(encoding) => {
                        if let Some(enc) = encoding {
                            index_options.encoding = enc;
                        }
                        info!(
                            "viewer: reopening {} with encoding {}",
                            path.display(),
                            index_options.encoding
                        );
                        dispatcher.open(&path, index_options);
                        view.flash = Some(format!("Reopening (encoding {})", index_options.encoding));
                        terminal::clear_screen()?;
                        dirty = true;
                    }
                    Effect::Flash(msg) => view.flash = Some(msg),
                    Effect::MarkDirty => dirty = true,
                    Effect::SetMode(new_mode) => {
                        if let ViewerMode::Command(cs) = &new_mode {
                            terminal::draw_command_bar(&layout, &cs.input)?;
                        }
                        mode = new_mode;
                    }
                    Effect::RedrawStatusBar => {
                        if matches!(mode, ViewerMode::Normal) {
                            terminal::draw_status_bar(
                                &layout,
                                &status_info(&view, &dispatcher, acc.peek()),
                            )?;
                        }
                    }
                }
            }
            continue;
        }

        // poll timeout → frame budget elapsed (or a debounce fired)
        if dirty {
            for ev in dispatcher.poll(Instant::now()) {
                apply_view_event(ev, &mut view);
            }
            terminal::draw_grid(&layout, &dispatcher)?;
            match &mode {
                ViewerMode::Normal => terminal::draw_status_bar(
                    &layout,
                    &status_info(&view, &dispatcher, acc.peek()),
                )?,
                ViewerMode::Command(cs) => terminal::draw_command_bar(&layout, &cs.input)?,
            }
            dirty = false;
            last_render = Instant::now();
        }
    }
}

/// Fold a dispatcher event into view state. Returns whether a repaint is needed.
fn apply_view_event(ev: ViewEvent, view: &mut ViewState) -> bool {
    match ev {
        ViewEvent::HeaderReady(header) => {
            debug!("viewer: header ready ({} columns)", header.len());
            true
        }
        ViewEvent::IndexFailed(msg) => {
            view.flash = Some(msg);
            true
        }
        ViewEvent::LoadFailed {
            error,
            file_changed,
        } => {
            view.flash = Some(if file_changed {
                format!("{error} (:reload to re-index)")
            } else {
                error
            });
            true
        }
        ViewEvent::RowsReady { .. } | ViewEvent::VisibleRegionChanged => true,
    }
}

fn status_info<'a>(view: &'a ViewState, d: &Dispatcher, acc_peek: Option<u32>) -> StatusInfo<'a> {
    let shown = d.row_count();
    let rows_shown = match (d.row_label(0), shown) {
        (Some(first), n) if n > 0 => Some((first, first + n as u64 - 1)),
        _ => None,
    };
    let file = d.file();
    StatusInfo {
        filename: &view.filename,
        rows_shown,
        total_rows: d.data_row_count(),
        encoding: file.map(|f| f.encoding),
        delimiter: file.map(|f| f.delimiter),
        indexing: d.is_opening(),
        loading: file.is_some() && d.data_row_count() > 0 && !d.is_settled(),
        acc_peek,
        flash: view.flash.as_deref(),
        perf: d.perf().format_summary(),
    }
}
