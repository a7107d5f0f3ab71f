//! Input processing layer: key mapping and numeric prefix accumulator.
//!
//! Pure logic, no I/O. All functions are deterministic and testable.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const MAX_COUNT: u32 = 999_999_999;

/// Accumulated numeric prefix for vim/less-style commands.
///
/// Users type digits then a command character: `5000g` jumps to data row
/// 5000, `10j` scrolls 10 steps down.
pub(super) struct InputAccumulator {
    count: Option<u32>,
}

impl InputAccumulator {
    pub(super) fn new() -> Self {
        Self { count: None }
    }

    /// Feed a digit. Digits that would overflow are ignored.
    fn push_digit(&mut self, d: u32) {
        let new = self.count.unwrap_or(0).saturating_mul(10).saturating_add(d);
        if new <= MAX_COUNT {
            self.count = Some(new);
        }
    }

    fn take(&mut self) -> Option<u32> {
        self.count.take()
    }

    pub(super) fn peek(&self) -> Option<u32> {
        self.count
    }

    pub(super) fn reset(&mut self) {
        self.count = None;
    }

    pub(super) fn is_active(&self) -> bool {
        self.count.is_some()
    }
}

/// Actions produced by key input in normal mode.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Action {
    Quit,
    ScrollDown(u32),
    ScrollUp(u32),
    HalfPageDown(u32),
    HalfPageUp(u32),
    PageDown(u32),
    PageUp(u32),
    JumpToTop,
    JumpToBottom,
    /// 1-based data row.
    JumpToRow(u32),
    SetBookmark,
    JumpToBookmark,
    EnterCommand,
    CancelInput,
    /// A digit was accumulated; caller should redraw status bar.
    Digit,
}

/// Map a key event to an `Action`, consuming/updating the accumulator as needed.
///
/// Returns `None` for unknown keys (caller should reset accumulator).
pub(super) fn map_key_event(key: KeyEvent, acc: &mut InputAccumulator) -> Option<Action> {
    let KeyEvent {
        code, modifiers, ..
    } = key;

    match (code, modifiers) {
        (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
            Some(Action::Quit)
        }

        (KeyCode::Esc, _) => {
            acc.reset();
            Some(Action::CancelInput)
        }

        (KeyCode::Char(c @ '0'..='9'), KeyModifiers::NONE) => {
            acc.push_digit(c as u32 - '0' as u32);
            Some(Action::Digit)
        }

        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => {
            Some(Action::ScrollDown(acc.take().unwrap_or(1)))
        }
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => {
            Some(Action::ScrollUp(acc.take().unwrap_or(1)))
        }
        (KeyCode::Char('d'), _) => Some(Action::HalfPageDown(acc.take().unwrap_or(1))),
        (KeyCode::Char('u'), _) => Some(Action::HalfPageUp(acc.take().unwrap_or(1))),
        (KeyCode::Char('f'), _) | (KeyCode::PageDown, _) | (KeyCode::Char(' '), _) => {
            Some(Action::PageDown(acc.take().unwrap_or(1)))
        }
        (KeyCode::Char('b'), _) | (KeyCode::PageUp, _) => {
            Some(Action::PageUp(acc.take().unwrap_or(1)))
        }

        (KeyCode::Char('g'), _) | (KeyCode::Home, _) => match acc.take() {
            None => Some(Action::JumpToTop),
            Some(n) => Some(Action::JumpToRow(n)),
        },
        (KeyCode::Char('G'), _) | (KeyCode::End, _) => match acc.take() {
            None => Some(Action::JumpToBottom),
            Some(n) => Some(Action::JumpToRow(n)),
        },

        (KeyCode::Char('m'), _) => {
            acc.reset();
            Some(Action::SetBookmark)
        }
        (KeyCode::Char('\''), _) => {
            acc.reset();
            Some(Action::JumpToBookmark)
        }

        (KeyCode::Char(':'), _) => {
            acc.reset();
            Some(Action::EnterCommand)
        }

        _ => None,
    }
}

/// Actions produced by key input in command mode.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum CommandAction {
    Type(char),
    Backspace,
    Execute,
    Cancel,
}

pub(super) fn map_command_key(key: KeyEvent) -> Option<CommandAction> {
    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
            Some(CommandAction::Cancel)
        }
        (KeyCode::Enter, _) => Some(CommandAction::Execute),
        (KeyCode::Backspace, _) => Some(CommandAction::Backspace),
        (KeyCode::Char(c), m) if !m.contains(KeyModifiers::CONTROL) => {
            Some(CommandAction::Type(c))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn simple_key(code: KeyCode) -> KeyEvent {
        key(code, KeyModifiers::NONE)
    }

    fn type_digits(acc: &mut InputAccumulator, digits: &str) {
        for c in digits.chars() {
            map_key_event(simple_key(KeyCode::Char(c)), acc);
        }
    }

    #[test]
    fn test_5j_scroll_down() {
        let mut acc = InputAccumulator::new();
        let a = map_key_event(simple_key(KeyCode::Char('5')), &mut acc);
        assert_eq!(a, Some(Action::Digit));
        let a = map_key_event(simple_key(KeyCode::Char('j')), &mut acc);
        assert_eq!(a, Some(Action::ScrollDown(5)));
        assert!(!acc.is_active());
    }

    #[test]
    fn test_g_without_prefix_jumps_top() {
        let mut acc = InputAccumulator::new();
        let a = map_key_event(simple_key(KeyCode::Char('g')), &mut acc);
        assert_eq!(a, Some(Action::JumpToTop));
    }

    #[test]
    fn test_5000g_jumps_to_row() {
        let mut acc = InputAccumulator::new();
        type_digits(&mut acc, "5000");
        assert_eq!(acc.peek(), Some(5000));
        let a = map_key_event(simple_key(KeyCode::Char('g')), &mut acc);
        assert_eq!(a, Some(Action::JumpToRow(5000)));
    }

    #[test]
    fn test_big_g_bottom() {
        let mut acc = InputAccumulator::new();
        let a = map_key_event(key(KeyCode::Char('G'), KeyModifiers::SHIFT), &mut acc);
        assert_eq!(a, Some(Action::JumpToBottom));
    }

    #[test]
    fn test_page_keys() {
        let mut acc = InputAccumulator::new();
        assert_eq!(
            map_key_event(simple_key(KeyCode::PageDown), &mut acc),
            Some(Action::PageDown(1))
        );
        type_digits(&mut acc, "3");
        assert_eq!(
            map_key_event(simple_key(KeyCode::Char('b')), &mut acc),
            Some(Action::PageUp(3))
        );
    }

    #[test]
    fn test_ctrl_c_quits() {
        let mut acc = InputAccumulator::new();
        let a = map_key_event(key(KeyCode::Char('c'), KeyModifiers::CONTROL), &mut acc);
        assert_eq!(a, Some(Action::Quit));
    }

    #[test]
    fn test_esc_cancels_input() {
        let mut acc = InputAccumulator::new();
        type_digits(&mut acc, "5");
        assert!(acc.is_active());
        let a = map_key_event(simple_key(KeyCode::Esc), &mut acc);
        assert_eq!(a, Some(Action::CancelInput));
        assert!(!acc.is_active());
    }

    #[test]
    fn test_overflow_digits_ignored() {
        let mut acc = InputAccumulator::new();
        type_digits(&mut acc, "99999999999");
        assert_eq!(acc.peek(), Some(999_999_999));
    }

    #[test]
    fn test_unknown_key_returns_none() {
        let mut acc = InputAccumulator::new();
        assert!(map_key_event(simple_key(KeyCode::Char('x')), &mut acc).is_none());
    }

    #[test]
    fn test_command_keys() {
        assert_eq!(
            map_command_key(simple_key(KeyCode::Char('g'))),
            Some(CommandAction::Type('g'))
        );
        assert_eq!(
            map_command_key(simple_key(KeyCode::Enter)),
            Some(CommandAction::Execute)
        );
        assert_eq!(
            map_command_key(key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(CommandAction::Cancel)
        );
    }
}
