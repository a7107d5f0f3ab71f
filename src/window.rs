//! Window cache: decoded rows held in memory around the viewport.
//!
//! ```text
//!  buffer_start_row
//!  │
//!  ▼
//!  ┌──────────────┬──────────────────────┬──────────────┐
//!  │ front slack  │  visible sub-window  │  back slack  │
//!  └──────────────┴──────────────────────┴──────────────┘
//!  0              visible_offset         +visible_row_count      len
//! ```
//!
//! The buffer only changes through `replace`, `shift` and
//! `extend_before`/`extend_after` (each followed by a trim back to
//! `factor × visible_row_count`). Every one of them ends with the same
//! invariant check.

use std::cmp::Ordering;
use std::collections::VecDeque;

use log::{debug, trace};

use crate::index::index_row_to_data_row;
use crate::reader::{Row, RowSlice};

pub const DEFAULT_BUFFER_FACTOR: usize = 3;

pub struct WindowBuffer {
    header: Vec<String>,
    rows: VecDeque<Row>,
    /// Index row of `rows[0]`.
    buffer_start_row: u64,
    visible_offset: usize,
    visible_row_count: usize,
    factor: usize,
    /// Header indexes to display, ascending. `None` shows every column.
    selected_columns: Option<Vec<usize>>,
}

impl WindowBuffer {
    pub fn new(visible_row_count: usize, factor: usize) -> Self {
        Self {
            header: Vec::new(),
            rows: VecDeque::new(),
            buffer_start_row: 0,
            visible_offset: 0,
            visible_row_count: visible_row_count.max(1),
            factor: factor.max(1),
            selected_columns: None,
        }
    }

    /// Install a new header. Drops all rows and the column selection.
    pub fn set_header(&mut self, header: Vec<String>) {
        self.header = header;
        self.selected_columns = None;
        self.clear_rows();
    }

    /// Forget everything (file closed).
    pub fn reset(&mut self) {
        self.header.clear();
        self.selected_columns = None;
        self.clear_rows();
    }

    fn clear_rows(&mut self) {
        self.rows.clear();
        self.buffer_start_row = 0;
        self.visible_offset = 0;
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn visible_row_count(&self) -> usize {
        self.visible_row_count
    }

    /// Rows the buffer aims to hold outside of a fresh replace.
    pub fn target_len(&self) -> usize {
        self.visible_row_count * self.factor
    }

    pub fn buffer_len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn buffer_start_row(&self) -> u64 {
        self.buffer_start_row
    }

    /// Index row one past the last buffered row.
    pub fn buffer_end_row(&self) -> u64 {
        self.buffer_start_row + self.rows.len() as u64
    }

    pub fn visible_offset(&self) -> usize {
        self.visible_offset
    }

    /// Index row shown at the top of the viewport.
    pub fn first_visible_row(&self) -> u64 {
        self.buffer_start_row + self.visible_offset as u64
    }

    fn max_offset(&self) -> usize {
        self.rows.len().saturating_sub(self.visible_row_count)
    }

    /// Whether the viewport is fully backed by buffered rows, treating
    /// `total_rows` (index rows) as the end of the file.
    pub fn covers_viewport(&self, total_rows: u64) -> bool {
        !self.rows.is_empty()
            && (self.visible_offset + self.visible_row_count <= self.rows.len()
                || self.buffer_end_row() >= total_rows)
    }

    /// Change viewport capacity. The visible top row is kept when the buffer
    /// allows it.
    pub fn set_visible_row_count(&mut self, count: usize) {
        self.visible_row_count = count.max(1);
        self.visible_offset = self.visible_offset.min(self.max_offset());
        self.check_invariants();
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Adopt `slice` as the whole buffer and show it from its first row.
    pub fn replace(&mut self, slice: RowSlice) {
        debug!(
            "window: replace with {} rows at {} (was {} rows at {})",
            slice.len(),
            slice.start_row,
            self.rows.len(),
            self.buffer_start_row
        );
        self.rows = slice.rows.into();
        self.buffer_start_row = slice.start_row;
        self.visible_offset = 0;
        self.check_invariants();
    }

    /// Move the visible sub-window by `relative_rows` without I/O.
    ///
    /// Fails (returns `false`, nothing changes) when the window would leave
    /// the buffer; the caller then has to load.
    pub fn shift(&mut self, relative_rows: i64) -> bool {
        let Some(new_offset) = self.visible_offset.checked_add_signed(relative_rows as isize)
        else {
            trace!("window: shift {relative_rows} underflows offset {}", self.visible_offset);
            return false;
        };
        if self.rows.is_empty() || new_offset > self.max_offset() {
            trace!(
                "window: shift {relative_rows} to {new_offset} outside [0, {}]",
                self.max_offset()
            );
            return false;
        }
        self.visible_offset = new_offset;
        self.check_invariants();
        true
    }

    /// `slice` ends exactly where the buffer starts.
    pub fn can_extend_before(&self, start_row: u64, row_count: usize) -> bool {
        !self.rows.is_empty()
            && row_count > 0
            && start_row + row_count as u64 == self.buffer_start_row
    }

    /// `slice` starts exactly where the buffer ends.
    pub fn can_extend_after(&self, start_row: u64) -> bool {
        !self.rows.is_empty() && start_row == self.buffer_end_row()
    }

    /// Prepend prefetched rows, keeping the same rows on screen, then trim. Returns `false` (and changes nothing) for a stale slice.
    pub fn extend_before(&mut self, slice: RowSlice) -> bool {
        if !self.can_extend_before(slice.start_row, slice.len()) {
            return false;
        }
        let added = slice.len();
        for row in slice.rows.into_iter().rev() {
            self.rows.push_front(row);
        }
        self.buffer_start_row = slice.start_row;
        self.visible_offset += added;
        self.trim(TrimFirst::Back);
        debug!(
            "window: extended {added} rows before, buffer [{}, {}) offset {}",
            self.buffer_start_row,
            self.buffer_end_row(),
            self.visible_offset
        );
        true
    }

    /// Append prefetched rows, then trim. Returns `false` (and
    /// changes nothing) for a stale slice.
    pub fn extend_after(&mut self, slice: RowSlice) -> bool {
        if !self.can_extend_after(slice.start_row) {
            return false;
        }
        let added = slice.len();
        self.rows.extend(slice.rows);
        self.trim(TrimFirst::Front);
        debug!(
            "window: extended {added} rows after, buffer [{}, {}) offset {}",
            self.buffer_start_row,
            self.buffer_end_row(),
            self.visible_offset
        );
        true
    }

    /// Drop rows beyond `target_len`, starting at the end with more slack
    /// (furthest from the visible sub-window). On a tie `on_tie` goes first.
    /// Never cuts into the visible sub-window.
    fn trim(&mut self, on_tie: TrimFirst) {
        let target = self.target_len();
        if self.rows.len() <= target {
            self.check_invariants();
            return;
        }
        let excess = self.rows.len() - target;
        let front_slack = self.visible_offset;
        let back_slack = self
            .rows
            .len()
            .saturating_sub(self.visible_offset + self.visible_row_count);

        let first = match front_slack.cmp(&back_slack) {
            Ordering::Greater => TrimFirst::Front,
            Ordering::Less => TrimFirst::Back,
            Ordering::Equal => on_tie,
        };
        let (from_front, from_back) = match first {
            TrimFirst::Front => {
                let f = excess.min(front_slack);
                (f, (excess - f).min(back_slack))
            }
            TrimFirst::Back => {
                let b = excess.min(back_slack);
                ((excess - b).min(front_slack), b)
            }
        };

        self.rows.drain(..from_front);
        self.buffer_start_row += from_front as u64;
        self.visible_offset -= from_front;
        self.rows.truncate(self.rows.len() - from_back);
        trace!("window: trimmed {from_front} front, {from_back} back");
        self.check_invariants();
    }

    fn check_invariants(&self) {
        debug_assert!(
            self.visible_offset <= self.max_offset(),
            "visible_offset {} beyond max {} (len {}, visible {})",
            self.visible_offset,
            self.max_offset(),
            self.rows.len(),
            self.visible_row_count
        );
    }

    // -----------------------------------------------------------------------
    // Column selection
    // -----------------------------------------------------------------------

    /// Show only the named columns, in header order. Unknown names are
    /// ignored. An empty `names` clears the selection. If none of the names
    /// match, the selection is left unchanged and 0 is returned.
    pub fn set_selected_columns<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        if names.is_empty() {
            self.selected_columns = None;
            return self.header.len();
        }
        let indexes: Vec<usize> = self
            .header
            .iter()
            .enumerate()
            .filter(|(_, h)| names.iter().any(|n| n.as_ref() == h.as_str()))
            .map(|(i, _)| i)
            .collect();
        if indexes.is_empty() {
            return 0;
        }
        debug!("window: selected columns {indexes:?}");
        let n = indexes.len();
        self.selected_columns = Some(indexes);
        n
    }

    pub fn selected_columns(&self) -> Option<&[usize]> {
        self.selected_columns.as_deref()
    }

    fn header_index(&self, visible_column: usize) -> Option<usize> {
        match &self.selected_columns {
            Some(sel) => sel.get(visible_column).copied(),
            None => (visible_column < self.header.len()).then_some(visible_column),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Rows currently visible (less than the viewport near end of file).
    pub fn row_count(&self) -> usize {
        self.rows
            .len()
            .saturating_sub(self.visible_offset)
            .min(self.visible_row_count)
    }

    pub fn column_count(&self) -> usize {
        match &self.selected_columns {
            Some(sel) => sel.len(),
            None => self.header.len(),
        }
    }

    /// Cell text on screen at (`visible_row`, `visible_column`). `None` when
    /// out of range or the row is shorter than the header.
    pub fn cell(&self, visible_row: usize, visible_column: usize) -> Option<&str> {
        if visible_row >= self.row_count() {
            return None;
        }
        let col = self.header_index(visible_column)?;
        self.rows
            .get(self.visible_offset + visible_row)?
            .get(col)
            .map(String::as_str)
    }

    /// 1-based data row number for a visible row.
    pub fn row_label(&self, visible_row: usize) -> Option<u64> {
        if visible_row >= self.row_count() {
            return None;
        }
        index_row_to_data_row(self.first_visible_row() + visible_row as u64).map(|d| d + 1)
    }

    pub fn header_label(&self, visible_column: usize) -> Option<&str> {
        let col = self.header_index(visible_column)?;
        self.header.get(col).map(String::as_str)
    }
}

#[derive(Clone, Copy)]
enum TrimFirst {
    Front,
    Back,
}
