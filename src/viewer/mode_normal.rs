//! Normal mode handler: scrolling, jumping, bookmarks, mode transitions.

use log::debug;

use super::mode_command::CommandState;
use super::state::Bookmarks;
use super::{Effect, ViewerMode};
use crate::viewer::input::Action;

pub(super) struct NormalCtx<'a> {
    /// Top row on screen, 0-based data row.
    pub position: u64,
    pub data_rows: u64,
    pub grid_rows: u64,
    pub scroll_step: u64,
    pub bookmarks: &'a mut Bookmarks,
}

impl NormalCtx<'_> {
    fn max_top(&self) -> u64 {
        self.data_rows.saturating_sub(self.grid_rows)
    }

    fn down(&self, rows: u64) -> u64 {
        self.position.saturating_add(rows).min(self.max_top())
    }

    fn up(&self, rows: u64) -> u64 {
        self.position.saturating_sub(rows)
    }
}

pub(super) fn handle(action: Action, ctx: &mut NormalCtx) -> Vec<Effect> {
    let half_page = (ctx.grid_rows / 2).max(1);
    let page = ctx.grid_rows.max(1);

    match action {
        Action::Quit => vec![Effect::Quit],

        Action::CancelInput | Action::Digit => vec![Effect::RedrawStatusBar],

        Action::ScrollDown(count) => scroll(ctx, ctx.down(count as u64 * ctx.scroll_step)),
        Action::ScrollUp(count) => scroll(ctx, ctx.up(count as u64 * ctx.scroll_step)),
        Action::HalfPageDown(count) => scroll(ctx, ctx.down(count as u64 * half_page)),
        Action::HalfPageUp(count) => scroll(ctx, ctx.up(count as u64 * half_page)),
        Action::PageDown(count) => scroll(ctx, ctx.down(count as u64 * page)),
        Action::PageUp(count) => scroll(ctx, ctx.up(count as u64 * page)),
        Action::JumpToTop => scroll(ctx, 0),
        Action::JumpToBottom => scroll(ctx, ctx.max_top()),

        Action::JumpToRow(n) => {
            let n = n as u64;
            if n == 0 || n > ctx.data_rows {
                vec![
                    Effect::Flash(format!("Row {n} out of range (1-{})", ctx.data_rows)),
                    Effect::RedrawStatusBar,
                ]
            } else {
                debug!("jump to row {n}");
                vec![Effect::ScrollTo(n - 1)]
            }
        }

        Action::SetBookmark => {
            let row = ctx.position + 1;
            let msg = if ctx.bookmarks.add(row) {
                format!("Bookmark at row {row}")
            } else {
                format!("Row {row} already bookmarked")
            };
            vec![Effect::Flash(msg), Effect::RedrawStatusBar]
        }
        Action::JumpToBookmark => match ctx.bookmarks.last() {
            Some(row) => vec![
                Effect::ScrollTo(row - 1),
                Effect::Flash(format!("Bookmark: row {row}")),
            ],
            None => vec![
                Effect::Flash("No bookmarks (press m to set one)".into()),
                Effect::RedrawStatusBar,
            ],
        },

        Action::EnterCommand => {
            let cs = CommandState {
                input: String::new(),
            };
            vec![Effect::SetMode(ViewerMode::Command(cs))]
        }
    }
}

fn scroll(ctx: &NormalCtx, target: u64) -> Vec<Effect> {
    debug!(
        "scroll: top {} → {target} (max={}, rows={})",
        ctx.position,
        ctx.max_top(),
        ctx.data_rows
    );
    if target == ctx.position {
        vec![]
    } else {
        vec![Effect::ScrollTo(target)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(position: u64, bookmarks: &mut Bookmarks) -> NormalCtx<'_> {
        NormalCtx {
            position,
            data_rows: 1000,
            grid_rows: 20,
            scroll_step: 1,
            bookmarks,
        }
    }

    fn target(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|e| match e {
            Effect::ScrollTo(t) => Some(*t),
            _ => None,
        })
    }

    #[test]
    fn test_scrolling_is_clamped() {
        let mut b = Bookmarks::default();
        assert_eq!(target(&handle(Action::ScrollDown(5), &mut ctx(0, &mut b))), Some(5));
        assert_eq!(target(&handle(Action::ScrollUp(5), &mut ctx(3, &mut b))), Some(0));
        assert_eq!(target(&handle(Action::PageDown(1000), &mut ctx(0, &mut b))), Some(980));
        assert_eq!(target(&handle(Action::JumpToBottom, &mut ctx(0, &mut b))), Some(980));
        assert_eq!(target(&handle(Action::HalfPageDown(1), &mut ctx(100, &mut b))), Some(110));
        assert!(handle(Action::ScrollUp(1), &mut ctx(0, &mut b)).is_empty());
    }

    #[test]
    fn test_jump_to_row_is_one_based() {
        let mut b = Bookmarks::default();
        assert_eq!(target(&handle(Action::JumpToRow(500), &mut ctx(0, &mut b))), Some(499));
        let out = handle(Action::JumpToRow(5000), &mut ctx(0, &mut b));
        assert_eq!(target(&out), None);
        assert!(matches!(&out[0], Effect::Flash(m) if m.contains("out of range")));
    }

    #[test]
    fn test_bookmark_round_trip() {
        let mut b = Bookmarks::default();
        let out = handle(Action::JumpToBookmark, &mut ctx(0, &mut b));
        assert_eq!(target(&out), None);
        handle(Action::SetBookmark, &mut ctx(41, &mut b));
        let out = handle(Action::JumpToBookmark, &mut ctx(700, &mut b));
        assert_eq!(target(&out), Some(41));
    }

    #[test]
    fn test_colon_enters_command_mode() {
        let mut b = Bookmarks::default();
        let out = handle(Action::EnterCommand, &mut ctx(0, &mut b));
        assert!(matches!(&out[..], [Effect::SetMode(ViewerMode::Command(_))]));
    }
}
