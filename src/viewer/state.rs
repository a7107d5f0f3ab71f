//! Viewer state: screen layout, session state, bookmarks.

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Screen regions, in terminal cells.
///
/// ```text
/// row 0               header (column names)
/// row 1..=grid_rows   data rows
/// row status_row      status bar / command prompt
/// ```
pub(super) struct Layout {
    pub term_cols: u16,
    pub grid_top: u16,
    /// Data rows on screen (= term_rows - 2). This is the viewport capacity
    /// handed to the dispatcher.
    pub grid_rows: u16,
    pub status_row: u16,
    pub column_width: u16,
}

pub(super) fn compute_layout(term_cols: u16, term_rows: u16, column_width: u16) -> Layout {
    Layout {
        term_cols,
        grid_top: 1,
        grid_rows: term_rows.saturating_sub(2).max(1),
        status_row: term_rows.saturating_sub(1),
        column_width: column_width.max(1),
    }
}

impl Layout {
    /// How many columns fit beside a gutter of `gutter` cells.
    /// Each column takes `column_width` plus a one-cell separator.
    pub(super) fn fitting_columns(&self, gutter: u16) -> usize {
        let avail = self.term_cols.saturating_sub(gutter) as usize;
        (avail / (self.column_width as usize + 1)).max(1)
    }
}

/// Gutter width for row labels up to `data_rows`, plus a trailing space.
pub(super) fn gutter_width(data_rows: u64) -> u16 {
    let digits = data_rows.max(1).ilog10() + 1;
    digits as u16 + 1
}

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

pub(super) struct ViewState {
    pub filename: String,
    /// One-shot status message, cleared on the next key press.
    pub flash: Option<String>,
    pub bookmarks: Bookmarks,
}

impl ViewState {
    pub(super) fn new(filename: String) -> Self {
        Self {
            filename,
            flash: None,
            bookmarks: Bookmarks::default(),
        }
    }
}

/// Bookmarked data rows (1-based) for the current session, oldest first.
#[derive(Default)]
pub(super) struct Bookmarks {
    rows: Vec<u64>,
}

impl Bookmarks {
    /// Mark `row`. Marking an existing row makes it the most recent.
    /// Returns false if it was already marked.
    pub(super) fn add(&mut self, row: u64) -> bool {
        let existed = self.rows.contains(&row);
        self.rows.retain(|&r| r != row);
        self.rows.push(row);
        !existed
    }

    pub(super) fn last(&self) -> Option<u64> {
        self.rows.last().copied()
    }

    pub(super) fn clear(&mut self) {
        self.rows.clear();
    }

    pub(super) fn summary(&self) -> String {
        if self.rows.is_empty() {
            return "No bookmarks".into();
        }
        let mut sorted = self.rows.clone();
        sorted.sort_unstable();
        let list: Vec<String> = sorted.iter().map(u64::to_string).collect();
        format!("marks: {}", list.join(", "))
    }
}
