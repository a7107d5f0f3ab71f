//! Scroll classification.
//!
//! [`is_large_move`] is the only definition of "large" in the crate; the
//! dispatcher uses it for every transition, and falls back to a load only
//! when a small move cannot be served by the buffer.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollKind {
    /// Within half a viewport: try to serve from the buffer.
    Small,
    /// Further than half a viewport: load fresh rows.
    Large,
}

/// `|new - previous| > visible_row_count / 2`
pub fn is_large_move(previous: u64, new: u64, visible_row_count: usize) -> bool {
    previous.abs_diff(new) > (visible_row_count / 2) as u64
}

pub fn classify(previous: u64, new: u64, visible_row_count: usize) -> ScrollKind {
    if is_large_move(previous, new, visible_row_count) {
        ScrollKind::Large
    } else {
        ScrollKind::Small
    }
}

/// Last absolute position seen, kept only to classify the next move.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScrollState {
    last_position: u64,
}

impl ScrollState {
    pub fn last_position(&self) -> u64 {
        self.last_position
    }

    /// Record a move to `new` and classify it against the previous position.
    pub fn transition(&mut self, new: u64, visible_row_count: usize) -> ScrollKind {
        let kind = classify(self.last_position, new, visible_row_count);
        self.last_position = new;
        kind
    }

    /// Record `position` without classifying a move.
    pub fn jump_to(&mut self, position: u64) {
        self.last_position = position;
    }

    pub fn reset(&mut self) {
        self.last_position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_viewport_boundary() {
        assert_eq!(classify(1000, 1040, 100), ScrollKind::Small);
        assert_eq!(classify(1000, 1050, 100), ScrollKind::Small);
        assert_eq!(classify(1000, 1051, 100), ScrollKind::Large);
        assert_eq!(classify(1000, 1060, 100), ScrollKind::Large);
        assert_eq!(classify(1000, 940, 100), ScrollKind::Large);
        assert_eq!(classify(1000, 960, 100), ScrollKind::Small);
    }

    #[test]
    fn test_tiny_viewport_treats_any_move_as_large() {
        assert_eq!(classify(5, 5, 1), ScrollKind::Small);
        assert_eq!(classify(5, 6, 1), ScrollKind::Large);
    }

    #[test]
    fn test_state_tracks_last_position() {
        let mut s = ScrollState::default();
        assert_eq!(s.transition(10, 100), ScrollKind::Small);
        assert_eq!(s.transition(200, 100), ScrollKind::Large);
        assert_eq!(s.last_position(), 200);
        s.reset();
        assert_eq!(s.last_position(), 0);
    }
}
