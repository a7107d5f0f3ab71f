//! Request dispatcher: the consumer-side controller and the I/O worker.
//!
//! ```text
//!  consumer thread                          worker thread
//!  ───────────────                          ─────────────
//!  Dispatcher ── Request::Open ──────────▶  FileIndex::build
//!     │       ◀───────── Response::Opened ──
//!     │       ── Request::Read ──────────▶  reader::read_rows
//!     │       ◀─────────── Response::Rows ──
//!     ▼
//!  WindowBuffer (only touched here)
//! ```
//!
//! Every request carries a generation. Opening a file or issuing a primary
//! (replace) load bumps it; the worker skips queued requests from older
//! generations, and the dispatcher drops results that no longer fit the
//! buffer. Nothing is cancelled mid-read.
//!
//! Timers are deadlines, not threads: the event loop asks for
//! [`Dispatcher::next_deadline`] and calls [`Dispatcher::poll`] when it passes.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::encoding::Encoding;
use crate::error::ReaderError;
use crate::index::{FileIndex, IndexOptions, data_row_to_index_row, index_row_to_data_row};
use crate::parse::Delimiter;
use crate::perf::{PerfLog, Timing};
use crate::reader::{self, RowsRead};
use crate::scroll::{ScrollKind, ScrollState};
use crate::window::WindowBuffer;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Replaces the whole buffer.
    Primary,
    PrefetchBefore,
    PrefetchAfter,
}

#[derive(Debug)]
pub enum Request {
    Open {
        generation: u64,
        path: PathBuf,
        options: IndexOptions,
    },
    Read {
        generation: u64,
        kind: RequestKind,
        start_row: u64,
        row_count: usize,
    },
}

impl Request {
    fn generation(&self) -> u64 {
        match self {
            Request::Open { generation, .. } | Request::Read { generation, .. } => *generation,
        }
    }
}

#[derive(Debug)]
pub enum Response {
    Opened {
        generation: u64,
        path: PathBuf,
        header: Vec<String>,
        total_rows: u64,
        encoding: Encoding,
        delimiter: Delimiter,
        timing: Timing,
    },
    OpenFailed {
        generation: u64,
        path: PathBuf,
        error: ReaderError,
    },
    Rows {
        generation: u64,
        kind: RequestKind,
        start_row: u64,
        result: Result<RowsRead, ReaderError>,
    },
}

/// Notifications for the display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// Indexing finished; these are the column names.
    HeaderReady(Vec<String>),
    /// Indexing failed; the file is not open.
    IndexFailed(String),
    /// A primary load failed. The window keeps its previous rows.
    /// `file_changed` means the file was modified after indexing and has to
    /// be reopened.
    LoadFailed { error: String, file_changed: bool },
    /// A load was applied to the window (primary or prefetch).
    RowsReady { start_row: u64, rows: usize },
    /// Repaint from the window; no I/O needed.
    VisibleRegionChanged,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Run indexing and ranged reads on a dedicated thread.
pub fn spawn_worker() -> io::Result<(Sender<Request>, Receiver<Response>, JoinHandle<()>)> {
    let (req_tx, req_rx) = mpsc::channel::<Request>();
    let (res_tx, res_rx) = mpsc::channel::<Response>();
    let handle = thread::Builder::new()
        .name("rowscope-io".into())
        .spawn(move || worker_loop(req_rx, res_tx))?;
    Ok((req_tx, res_rx, handle))
}

fn worker_loop(rx: Receiver<Request>, tx: Sender<Response>) {
    debug!("io worker: started");
    let mut index: Option<FileIndex> = None;
    let mut queue: VecDeque<Request> = VecDeque::new();

    loop {
        if queue.is_empty() {
            match rx.recv() {
                Ok(req) => queue.push_back(req),
                Err(_) => break,
            }
        }
        while let Ok(req) = rx.try_recv() {
            queue.push_back(req);
        }
        discard_superseded(&mut queue);
        let Some(req) = queue.pop_front() else {
            continue;
        };

        let response = match req {
            Request::Open {
                generation,
                path,
                options,
            } => open_index(&mut index, generation, path, options),
            Request::Read {
                generation,
                kind,
                start_row,
                row_count,
            } => {
                let result = match &index {
                    Some(idx) => reader::read_rows(idx, start_row, row_count),
                    None => Err(ReaderError::Seek {
                        row: start_row,
                        total: 0,
                    }),
                };
                Response::Rows {
                    generation,
                    kind,
                    start_row,
                    result,
                }
            }
        };
        if tx.send(response).is_err() {
            break;
        }
    }
    debug!("io worker: channel closed, exiting");
}

/// Drop queued requests from generations older than the newest one queued.
fn discard_superseded(queue: &mut VecDeque<Request>) {
    let Some(latest) = queue.iter().map(Request::generation).max() else {
        return;
    };
    let before = queue.len();
    queue.retain(|r| r.generation() == latest);
    if queue.len() < before {
        debug!(
            "io worker: skipped {} superseded requests (generation < {latest})",
            before - queue.len()
        );
    }
}

fn open_index(
    index: &mut Option<FileIndex>,
    generation: u64,
    path: PathBuf,
    options: IndexOptions,
) -> Response {
    let reused = index
        .as_ref()
        .is_some_and(|idx| idx.is_current_for(&path, options));
    let timing = if reused {
        debug!("io worker: {} unchanged, reusing index", path.display());
        Timing::new("index (reused)", Duration::ZERO)
    } else {
        *index = None;
        match FileIndex::build(&path, options) {
            Ok((idx, timing)) => {
                *index = Some(idx);
                timing
            }
            Err(error) => {
                return Response::OpenFailed {
                    generation,
                    path,
                    error,
                };
            }
        }
    };
    match index.as_ref() {
        Some(idx) => Response::Opened {
            generation,
            header: idx.header().to_vec(),
            total_rows: idx.total_row_count(),
            encoding: idx.encoding(),
            delimiter: idx.delimiter(),
            path,
            timing,
        },
        None => Response::OpenFailed {
            generation,
            error: ReaderError::Seek { row: 0, total: 0 },
            path,
        },
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub visible_row_count: usize,
    pub buffer_factor: usize,
    /// Debounce before a primary load after a large scroll.
    pub reload_delay: Duration,
    /// Idle time after a scroll before prefetching neighbours.
    pub prefetch_delay: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            visible_row_count: 40,
            buffer_factor: crate::window::DEFAULT_BUFFER_FACTOR,
            reload_delay: Duration::from_millis(30),
            prefetch_delay: Duration::from_millis(120),
        }
    }
}

/// What the worker reported about the open file.
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub path: PathBuf,
    /// Header + data rows.
    pub total_rows: u64,
    pub encoding: Encoding,
    pub delimiter: Delimiter,
}

impl OpenFile {
    pub fn data_rows(&self) -> u64 {
        index_row_to_data_row(self.total_rows).unwrap_or(0)
    }
}

pub struct Dispatcher {
    tx: Option<Sender<Request>>,
    rx: Receiver<Response>,
    worker: Option<JoinHandle<()>>,
    worker_gone: bool,

    settings: DispatchSettings,
    window: WindowBuffer,
    scroll: ScrollState,
    perf: PerfLog,

    pending_open: Option<PathBuf>,
    file: Option<OpenFile>,
    /// Desired top row of the viewport, as a 0-based data row.
    position: u64,

    generation: u64,
    primary_in_flight: Option<u64>,
    prefetch_before_in_flight: bool,
    prefetch_after_in_flight: bool,
    reload_at: Option<Instant>,
    prefetch_at: Option<Instant>,
    stale_dropped: u64,
}

impl Dispatcher {
    /// Start an I/O worker thread and a dispatcher talking to it.
    pub fn spawn(settings: DispatchSettings) -> io::Result<Self> {
        let (tx, rx, handle) = spawn_worker()?;
        let mut d = Self::with_channels(tx, rx, settings);
        d.worker = Some(handle);
        Ok(d)
    }

    /// Build a dispatcher over existing channels. The other ends are served
    /// by whoever the caller chooses (a worker thread, or a test).
    pub fn with_channels(
        tx: Sender<Request>,
        rx: Receiver<Response>,
        settings: DispatchSettings,
    ) -> Self {
        let window = WindowBuffer::new(settings.visible_row_count, settings.buffer_factor);
        Self {
            tx: Some(tx),
            rx,
            worker: None,
            worker_gone: false,
            settings,
            window,
            scroll: ScrollState::default(),
            perf: PerfLog::default(),
            pending_open: None,
            file: None,
            position: 0,
            generation: 0,
            primary_in_flight: None,
            prefetch_before_in_flight: false,
            prefetch_after_in_flight: false,
            reload_at: None,
            prefetch_at: None,
            stale_dropped: 0,
        }
    }

    fn send(&mut self, req: Request) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(req).is_err() && !self.worker_gone {
            error!("dispatch: I/O worker is gone, requests are no longer served");
            self.worker_gone = true;
        }
    }

    // -----------------------------------------------------------------------
    // Inputs from collaborators
    // -----------------------------------------------------------------------

    /// Index `path` on the worker. The current file (if any) is closed.
    pub fn open(&mut self, path: &Path, options: IndexOptions) {
        info!(
            "dispatch: opening {} (encoding={}, delimiter={})",
            path.display(),
            options.encoding,
            options
                .delimiter
                .map_or_else(|| "auto".to_string(), |d| d.to_string())
        );
        self.generation += 1;
        self.file = None;
        self.window.reset();
        self.scroll.reset();
        self.perf.clear();
        self.position = 0;
        self.clear_in_flight();
        self.reload_at = None;
        self.prefetch_at = None;
        self.pending_open = Some(path.to_path_buf());
        self.send(Request::Open {
            generation: self.generation,
            path: path.to_path_buf(),
            options,
        });
    }

    /// Scroll so that 0-based data row `target` is at the top.
    pub fn scroll_to(&mut self, target: u64, now: Instant) -> Vec<ViewEvent> {
        if self.file.is_none() {
            return Vec::new();
        }
        let target = target.min(self.max_top());
        if target == self.position {
            return Vec::new();
        }
        let visible = self.window.visible_row_count();
        let kind = self.scroll.transition(target, visible);
        debug!(
            "dispatch: scroll {} → {} ({kind:?}, visible={visible})",
            self.position, target
        );
        self.position = target;

        if kind == ScrollKind::Small && self.try_shift_to_position(now) {
            return vec![ViewEvent::VisibleRegionChanged];
        }
        if kind == ScrollKind::Small {
            debug!("dispatch: small scroll to {target} not covered by buffer, loading");
        }
        self.schedule_reload(now);
        Vec::new()
    }

    /// Scroll by `delta` rows (negative is up).
    pub fn scroll_by(&mut self, delta: i64, now: Instant) -> Vec<ViewEvent> {
        let target = self.position.saturating_add_signed(delta);
        self.scroll_to(target, now)
    }

    /// Viewport capacity changed (terminal resize).
    pub fn set_visible_row_count(&mut self, count: usize, now: Instant) -> Vec<ViewEvent> {
        let count = count.max(1);
        if count == self.window.visible_row_count() {
            return Vec::new();
        }
        debug!(
            "dispatch: visible rows {} → {count}",
            self.window.visible_row_count()
        );
        self.settings.visible_row_count = count;
        self.window.set_visible_row_count(count);
        let Some(total) = self.file.as_ref().map(|f| f.total_rows) else {
            return Vec::new();
        };
        self.position = self.position.min(self.max_top());
        if !self.window.is_empty() {
            self.position = index_row_to_data_row(self.window.first_visible_row()).unwrap_or(0);
        }
        if self.window.covers_viewport(total) {
            self.schedule_prefetch(now);
        } else {
            self.schedule_reload(now);
        }
        vec![ViewEvent::VisibleRegionChanged]
    }

    /// Restrict displayed columns to `names`. Returns how many matched.
    pub fn set_selected_columns<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        self.window.set_selected_columns(names)
    }

    // -----------------------------------------------------------------------
    // Driving the loop
    // -----------------------------------------------------------------------

    /// Apply every result that has arrived, then fire due timers.
    pub fn poll(&mut self, now: Instant) -> Vec<ViewEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(resp) => events.extend(self.handle_response(resp, now)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.worker_gone {
                        error!("dispatch: I/O worker disconnected");
                        self.worker_gone = true;
                    }
                    break;
                }
            }
        }
        self.fire_timers(now);
        events
    }

    /// Block up to `timeout` for one result, apply it, then fire due timers.
    /// Returns `None` on timeout.
    pub fn wait(&mut self, timeout: Duration) -> Option<Vec<ViewEvent>> {
        match self.rx.recv_timeout(timeout) {
            Ok(resp) => {
                let now = Instant::now();
                let events = self.handle_response(resp, now);
                self.fire_timers(now);
                Some(events)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.worker_gone = true;
                None
            }
        }
    }

    /// Earliest pending debounce deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.reload_at, self.prefetch_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Anything outstanding: an open, a load, or a pending timer.
    pub fn is_busy(&self) -> bool {
        self.pending_open.is_some()
            || self.primary_in_flight.is_some()
            || self.prefetch_before_in_flight
            || self.prefetch_after_in_flight
            || self.next_deadline().is_some()
    }

    fn fire_timers(&mut self, now: Instant) {
        if self.reload_at.is_some_and(|t| t <= now) {
            self.issue_primary();
        }
        if self.prefetch_at.is_some_and(|t| t <= now) {
            self.issue_prefetch();
        }
    }

    /// Route one worker result. Stale results are dropped here and never
    /// surface as events.
    pub fn handle_response(&mut self, resp: Response, now: Instant) -> Vec<ViewEvent> {
        match resp {
            Response::Opened {
                generation,
                path,
                header,
                total_rows,
                encoding,
                delimiter,
                timing,
            } => {
                if generation != self.generation || self.pending_open.as_deref() != Some(path.as_path()) {
                    debug!("dispatch: dropping stale open of {}", path.display());
                    self.stale_dropped += 1;
                    return Vec::new();
                }
                self.pending_open = None;
                self.perf.record(timing);
                info!(
                    "dispatch: {} ready, {} columns, {} data rows, {encoding}, delimiter {delimiter}",
                    path.display(),
                    header.len(),
                    total_rows.saturating_sub(1)
                );
                self.file = Some(OpenFile {
                    path,
                    total_rows,
                    encoding,
                    delimiter,
                });
                self.window.set_header(header.clone());
                self.scroll.reset();
                self.position = 0;
                let mut events = vec![ViewEvent::HeaderReady(header)];
                if self.data_row_count() > 0 {
                    self.issue_primary();
                } else {
                    events.push(ViewEvent::VisibleRegionChanged);
                }
                events
            }

            Response::OpenFailed {
                generation,
                path: _,
                error,
            } => {
                if generation != self.generation {
                    self.stale_dropped += 1;
                    return Vec::new();
                }
                error!("dispatch: {error}");
                self.pending_open = None;
                self.file = None;
                self.window.reset();
                vec![ViewEvent::IndexFailed(error.to_string())]
            }

            Response::Rows {
                generation,
                kind,
                start_row,
                result,
            } => self.handle_rows(generation, kind, start_row, result, now),
        }
    }

    fn handle_rows(
        &mut self,
        generation: u64,
        kind: RequestKind,
        start_row: u64,
        result: Result<RowsRead, ReaderError>,
        now: Instant,
    ) -> Vec<ViewEvent> {
        if generation == self.generation {
            match kind {
                RequestKind::Primary => {}
                RequestKind::PrefetchBefore => self.prefetch_before_in_flight = false,
                RequestKind::PrefetchAfter => self.prefetch_after_in_flight = false,
            }
        }

        let read = match result {
            Ok(read) => read,
            Err(e) => {
                warn!("dispatch: {kind:?} load at row {start_row} failed: {e}");
                if kind == RequestKind::Primary && self.primary_in_flight == Some(generation) {
                    self.primary_in_flight = None;
                    return self.primary_failed(&e);
                }
                return Vec::new();
            }
        };
        self.perf.record(read.timing.clone());
        if read.lossy_rows > 0 {
            warn!(
                "dispatch: {} rows near {start_row} decoded with replacement characters",
                read.lossy_rows
            );
        }
        let rows = read.slice.len();

        match kind {
            RequestKind::Primary => {
                if self.primary_in_flight != Some(generation) {
                    return self.drop_stale(kind, start_row, rows);
                }
                self.primary_in_flight = None;
                if read.slice.is_empty() {
                    warn!("dispatch: primary load at row {start_row} returned no rows");
                    return Vec::new();
                }
                self.window.replace(read.slice);
                // The user may have kept scrolling while this was in flight.
                if self.desired_index_row() != self.window.first_visible_row()
                    && self.try_shift_to_position(now)
                {
                    debug!("dispatch: caught up to row {} inside new buffer", self.position);
                } else if self.reload_at.is_none() {
                    self.schedule_prefetch(now);
                }
                vec![
                    ViewEvent::RowsReady { start_row, rows },
                    ViewEvent::VisibleRegionChanged,
                ]
            }
            RequestKind::PrefetchBefore | RequestKind::PrefetchAfter => {
                if generation != self.generation || self.primary_in_flight.is_some() {
                    return self.drop_stale(kind, start_row, rows);
                }
                let applied = if kind == RequestKind::PrefetchBefore {
                    self.window.extend_before(read.slice)
                } else {
                    self.window.extend_after(read.slice)
                };
                if !applied {
                    return self.drop_stale(kind, start_row, rows);
                }
                vec![
                    ViewEvent::RowsReady { start_row, rows },
                    ViewEvent::VisibleRegionChanged,
                ]
            }
        }
    }

    /// Fall back to what the window shows and tell the view why.
    fn primary_failed(&mut self, e: &ReaderError) -> Vec<ViewEvent> {
        self.reload_at = None;
        if !self.window.is_empty() {
            self.position = index_row_to_data_row(self.window.first_visible_row()).unwrap_or(0);
            self.scroll.jump_to(self.position);
        }
        vec![
            ViewEvent::LoadFailed {
                error: e.to_string(),
                file_changed: matches!(e, ReaderError::StaleIndex { .. }),
            },
            ViewEvent::VisibleRegionChanged,
        ]
    }

    fn drop_stale(&mut self, kind: RequestKind, start_row: u64, rows: usize) -> Vec<ViewEvent> {
        debug!(
            "dispatch: dropping stale {kind:?} result ({rows} rows at {start_row}), buffer [{}, {})",
            self.window.buffer_start_row(),
            self.window.buffer_end_row()
        );
        self.stale_dropped += 1;
        Vec::new()
    }

    // -----------------------------------------------------------------------
    // Load orchestration
    // -----------------------------------------------------------------------

    fn desired_index_row(&self) -> u64 {
        data_row_to_index_row(self.position)
    }

    /// Move the window to `position` without I/O, if the buffer covers it.
    fn try_shift_to_position(&mut self, now: Instant) -> bool {
        if self.window.is_empty() {
            return false;
        }
        let delta = self.desired_index_row() as i64 - self.window.first_visible_row() as i64;
        if !self.window.shift(delta) {
            return false;
        }
        self.reload_at = None;
        if self.primary_in_flight.take().is_some() {
            debug!("dispatch: in-flight primary load superseded by in-buffer shift");
        }
        self.schedule_prefetch(now);
        true
    }

    fn schedule_reload(&mut self, now: Instant) {
        self.prefetch_at = None;
        if self.settings.reload_delay.is_zero() {
            self.issue_primary();
        } else {
            self.reload_at = Some(now + self.settings.reload_delay);
        }
    }

    fn schedule_prefetch(&mut self, now: Instant) {
        if self.settings.prefetch_delay.is_zero() {
            self.issue_prefetch();
        } else {
            self.prefetch_at = Some(now + self.settings.prefetch_delay);
        }
    }

    fn issue_primary(&mut self) {
        self.reload_at = None;
        let Some(total) = self.file.as_ref().map(|f| f.total_rows) else {
            return;
        };
        let start_row = self.desired_index_row();
        if start_row >= total {
            return;
        }
        self.generation += 1;
        self.clear_in_flight();
        let row_count = self.window.visible_row_count();
        debug!(
            "dispatch: primary load [{start_row}, {}) generation {}",
            start_row + row_count as u64,
            self.generation
        );
        self.primary_in_flight = Some(self.generation);
        self.send(Request::Read {
            generation: self.generation,
            kind: RequestKind::Primary,
            start_row,
            row_count,
        });
    }

    /// Request the rows around the viewport that the buffer lacks:
    /// `[center - visible, center)` before and `[center + visible,
    /// center + 2 * visible)` after, clipped to the file and to what is
    /// already buffered.
    fn issue_prefetch(&mut self) {
        self.prefetch_at = None;
        let Some(total) = self.file.as_ref().map(|f| f.total_rows) else {
            return;
        };
        if self.primary_in_flight.is_some() || self.window.is_empty() {
            return;
        }
        let visible = self.window.visible_row_count() as u64;
        let center = self.window.first_visible_row();
        let buf_start = self.window.buffer_start_row();
        let buf_end = self.window.buffer_end_row();

        let before_lo = center.saturating_sub(visible).max(1);
        let before_hi = center.min(buf_start);
        if before_lo < before_hi && !self.prefetch_before_in_flight {
            debug!("dispatch: prefetch before [{before_lo}, {before_hi})");
            self.prefetch_before_in_flight = true;
            self.send(Request::Read {
                generation: self.generation,
                kind: RequestKind::PrefetchBefore,
                start_row: before_lo,
                row_count: (before_hi - before_lo) as usize,
            });
        }

        let after_lo = (center + visible).max(buf_end);
        let after_hi = (center + 2 * visible).min(total);
        if after_lo < after_hi && !self.prefetch_after_in_flight {
            debug!("dispatch: prefetch after [{after_lo}, {after_hi})");
            self.prefetch_after_in_flight = true;
            self.send(Request::Read {
                generation: self.generation,
                kind: RequestKind::PrefetchAfter,
                start_row: after_lo,
                row_count: (after_hi - after_lo) as usize,
            });
        }
    }

    fn clear_in_flight(&mut self) {
        self.primary_in_flight = None;
        self.prefetch_before_in_flight = false;
        self.prefetch_after_in_flight = false;
    }

    fn max_top(&self) -> u64 {
        self.data_row_count()
            .saturating_sub(self.window.visible_row_count() as u64)
    }

    // -----------------------------------------------------------------------
    // Query surface
    // -----------------------------------------------------------------------

    pub fn file(&self) -> Option<&OpenFile> {
        self.file.as_ref()
    }

    pub fn is_opening(&self) -> bool {
        self.pending_open.is_some()
    }

    pub fn header(&self) -> &[String] {
        self.window.header()
    }

    pub fn data_row_count(&self) -> u64 {
        self.file.as_ref().map_or(0, OpenFile::data_rows)
    }

    /// Desired top row (0-based data row). May run ahead of the window while
    /// a load is pending.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The window shows `position`.
    pub fn is_settled(&self) -> bool {
        !self.window.is_empty() && self.window.first_visible_row() == self.desired_index_row()
    }

    pub fn window(&self) -> &WindowBuffer {
        &self.window
    }

    pub fn row_count(&self) -> usize {
        self.window.row_count()
    }

    pub fn column_count(&self) -> usize {
        self.window.column_count()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.window.cell(row, col)
    }

    pub fn row_label(&self, row: usize) -> Option<u64> {
        self.window.row_label(row)
    }

    pub fn header_label(&self, col: usize) -> Option<&str> {
        self.window.header_label(col)
    }

    pub fn perf(&self) -> &PerfLog {
        &self.perf
    }

    /// Results discarded because the cache had moved on.
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.tx = None;
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            error!("dispatch: I/O worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::RowSlice;

    const V: usize = 10;

    /// A dispatcher whose worker side is driven by the test.
    struct Harness {
        d: Dispatcher,
        requests: Receiver<Request>,
        responses: Sender<Response>,
        now: Instant,
    }

    fn settings(delay_ms: u64) -> DispatchSettings {
        DispatchSettings {
            visible_row_count: V,
            buffer_factor: 3,
            reload_delay: Duration::from_millis(delay_ms),
            prefetch_delay: Duration::from_millis(delay_ms),
        }
    }

    fn numbered(start: u64, count: usize) -> RowSlice {
        RowSlice::new(
            start,
            (start..start + count as u64)
                .map(|r| vec![r.to_string()])
                .collect(),
        )
    }

    fn rows_ok(start: u64, count: usize) -> Result<RowsRead, ReaderError> {
        Ok(RowsRead {
            slice: numbered(start, count),
            lossy_rows: 0,
            truncated: false,
            timing: Timing::new(format!("rows {start}"), Duration::from_millis(1)),
        })
    }

    impl Harness {
        fn new(delay_ms: u64) -> Self {
            let (req_tx, req_rx) = mpsc::channel();
            let (res_tx, res_rx) = mpsc::channel();
            Self {
                d: Dispatcher::with_channels(req_tx, res_rx, settings(delay_ms)),
                requests: req_rx,
                responses: res_tx,
                now: Instant::now(),
            }
        }

        /// Open a file with `data_rows` rows and answer the header.
        fn opened(delay_ms: u64, data_rows: u64) -> Self {
            let mut h = Self::new(delay_ms);
            h.d.open(Path::new("/tmp/x.csv"), IndexOptions::default());
            let Request::Open { generation, .. } = h.next_request() else {
                panic!("expected open");
            };
            h.responses
                .send(Response::Opened {
                    generation,
                    path: PathBuf::from("/tmp/x.csv"),
                    header: vec!["n".into()],
                    total_rows: data_rows + 1,
                    encoding: Encoding::Utf8,
                    delimiter: Delimiter::Comma,
                    timing: Timing::new("index", Duration::from_millis(5)),
                })
                .unwrap();
            let events = h.d.poll(h.now);
            assert_eq!(events, vec![ViewEvent::HeaderReady(vec!["n".into()])]);
            h
        }

        fn next_request(&self) -> Request {
            self.requests.try_recv().expect("a request should be queued")
        }

        fn drain_requests(&self) -> Vec<Request> {
            self.requests.try_iter().collect()
        }

        /// Answer a read request with numbered rows, clipped to `total`.
        fn answer(&mut self, req: &Request, total: u64) -> Vec<ViewEvent> {
            let Request::Read {
                generation,
                kind,
                start_row,
                row_count,
            } = *req
            else {
                panic!("expected read, got {req:?}");
            };
            let count = (row_count as u64).min(total.saturating_sub(start_row)) as usize;
            self.d.handle_response(
                Response::Rows {
                    generation,
                    kind,
                    start_row,
                    result: rows_ok(start_row, count),
                },
                self.now,
            )
        }

        fn advance(&mut self, ms: u64) -> Vec<ViewEvent> {
            self.now += Duration::from_millis(ms);
            self.d.poll(self.now)
        }

        fn visible_first(&self) -> Option<&str> {
            self.d.cell(0, 0)
        }
    }

    fn read_kind(req: &Request) -> (RequestKind, u64, usize) {
        match req {
            Request::Read {
                kind,
                start_row,
                row_count,
                ..
            } => (*kind, *start_row, *row_count),
            other => panic!("expected read, got {other:?}"),
        }
    }

    #[test]
    fn test_open_issues_initial_primary_load() {
        let mut h = Harness::opened(0, 1000);
        let req = h.next_request();
        assert_eq!(read_kind(&req), (RequestKind::Primary, 1, V));
        let events = h.answer(&req, 1001);
        assert_eq!(
            events,
            vec![
                ViewEvent::RowsReady { start_row: 1, rows: V },
                ViewEvent::VisibleRegionChanged
            ]
        );
        assert_eq!(h.visible_first(), Some("1"));
        assert_eq!(h.d.row_label(0), Some(1));
        // Zero prefetch delay: only the after side exists at the top of file.
        let reqs = h.drain_requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(read_kind(&reqs[0]), (RequestKind::PrefetchAfter, 11, V));
    }

    #[test]
    fn test_prefetch_fills_both_sides_to_three_viewports() {
        let mut h = Harness::opened(0, 1000);
        h.d.scroll_to(500, h.now);
        // Initial primary for row 1 is still queued; a newer one supersedes it.
        let reqs = h.drain_requests();
        let primary = reqs.last().unwrap();
        assert_eq!(read_kind(primary), (RequestKind::Primary, 501, V));
        h.answer(primary, 1001);

        let reqs = h.drain_requests();
        assert_eq!(reqs.len(), 2);
        assert_eq!(read_kind(&reqs[0]), (RequestKind::PrefetchBefore, 491, V));
        assert_eq!(read_kind(&reqs[1]), (RequestKind::PrefetchAfter, 511, V));
        for r in &reqs {
            h.answer(r, 1001);
        }
        let w = h.d.window();
        assert_eq!(w.buffer_len(), 3 * V);
        assert_eq!(w.buffer_start_row(), 491);
        assert_eq!(h.visible_first(), Some("501"));
        assert_eq!(h.d.stale_dropped(), 0);
    }

    #[test]
    fn test_small_scroll_shifts_without_io() {
        let mut h = Harness::opened(0, 1000);
        h.d.scroll_to(500, h.now);
        let primary = h.drain_requests().pop().unwrap();
        h.answer(&primary, 1001);
        for r in h.drain_requests() {
            h.answer(&r, 1001);
        }

        let events = h.d.scroll_by(3, h.now);
        assert_eq!(events, vec![ViewEvent::VisibleRegionChanged]);
        assert_eq!(h.visible_first(), Some("504"));
        // Prefetch after the shift only asks for what is missing.
        let reqs = h.drain_requests();
        assert!(reqs.iter().all(|r| read_kind(r).0 == RequestKind::PrefetchAfter));
        assert_eq!(read_kind(&reqs[0]), (RequestKind::PrefetchAfter, 521, 3));
    }

    #[test]
    fn test_large_scroll_is_debounced() {
        let mut h = Harness::opened(30, 1000);
        let initial = h.next_request();
        h.answer(&initial, 1001);
        h.advance(200);
        h.drain_requests();

        h.d.scroll_to(300, h.now);
        h.advance(10);
        h.d.scroll_to(600, h.now);
        h.advance(10);
        assert!(h.drain_requests().is_empty(), "reload must wait for the debounce");
        h.advance(30);
        let reqs = h.drain_requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(read_kind(&reqs[0]), (RequestKind::Primary, 601, V));
    }

    #[test]
    fn test_stale_prefetch_is_dropped() {
        let mut h = Harness::opened(0, 1000);
        h.d.scroll_to(500, h.now);
        let primary = h.drain_requests().pop().unwrap();
        h.answer(&primary, 1001);
        let prefetches = h.drain_requests();
        assert_eq!(prefetches.len(), 2);

        // Jump away before the prefetches land.
        h.d.scroll_to(100, h.now);
        let new_primary = h.drain_requests().pop().unwrap();
        h.answer(&new_primary, 1001);
        let before_rows = h.d.row_count();
        let before_buffer = h.d.window().buffer_len();
        let before_cell = h.visible_first().map(str::to_owned);

        for r in &prefetches {
            assert!(h.answer(r, 1001).is_empty());
        }
        assert_eq!(h.d.row_count(), before_rows);
        assert_eq!(h.d.window().buffer_len(), before_buffer);
        assert_eq!(h.visible_first().map(str::to_owned), before_cell);
        assert!(h.d.stale_dropped() >= 2);
    }

    #[test]
    fn test_small_scroll_outside_buffer_falls_back_to_load() {
        let mut h = Harness::opened(0, 1000);
        let initial = h.next_request();
        h.answer(&initial, 1001);
        h.drain_requests(); // leave the after-prefetch unanswered

        // Move within half a viewport but past the 10 buffered rows.
        h.d.scroll_to(3, h.now);
        assert_eq!(h.visible_first(), Some("1"));
        h.d.scroll_to(5, h.now);
        assert_eq!(h.visible_first(), Some("1"));
        let reqs = h.drain_requests();
        let (kind, start, _) = read_kind(reqs.last().unwrap());
        assert_eq!((kind, start), (RequestKind::Primary, 6));
    }

    #[test]
    fn test_scroll_is_clamped_to_last_page() {
        let mut h = Harness::opened(0, 25);
        h.d.scroll_to(1_000_000, h.now);
        assert_eq!(h.d.position(), 15);
        let primary = h.drain_requests().pop().unwrap();
        assert_eq!(read_kind(&primary), (RequestKind::Primary, 16, V));
    }

    #[test]
    fn test_in_buffer_shift_supersedes_in_flight_primary() {
        let mut h = Harness::opened(0, 1000);
        h.d.scroll_to(500, h.now);
        let primary = h.drain_requests().pop().unwrap();
        h.answer(&primary, 1001);
        for r in h.drain_requests() {
            h.answer(&r, 1001);
        }
        // Large move within the buffer issues a primary load...
        h.d.scroll_to(508, h.now);
        let pending = h.drain_requests().pop().unwrap();
        assert_eq!(read_kind(&pending).0, RequestKind::Primary);
        // ...then a small move lands inside the buffer before it returns.
        h.d.scroll_to(505, h.now);
        assert_eq!(h.visible_first(), Some("506"));
        assert!(h.answer(&pending, 1001).is_empty());
        assert_eq!(h.visible_first(), Some("506"));
    }

    #[test]
    fn test_resize_reloads_when_buffer_is_short() {
        let mut h = Harness::opened(0, 1000);
        let initial = h.next_request();
        h.answer(&initial, 1001);
        h.drain_requests();
        let events = h.d.set_visible_row_count(25, h.now);
        assert_eq!(events, vec![ViewEvent::VisibleRegionChanged]);
        let reqs = h.drain_requests();
        assert_eq!(read_kind(reqs.last().unwrap()), (RequestKind::Primary, 1, 25));
    }

    #[test]
    fn test_open_failure_is_reported() {
        let mut h = Harness::new(0);
        h.d.open(Path::new("/nope.csv"), IndexOptions::default());
        let Request::Open { generation, .. } = h.next_request() else {
            panic!("expected open");
        };
        h.responses
            .send(Response::OpenFailed {
                generation,
                path: PathBuf::from("/nope.csv"),
                error: ReaderError::Index {
                    path: PathBuf::from("/nope.csv"),
                    source: io::Error::new(io::ErrorKind::NotFound, "missing"),
                },
            })
            .unwrap();
        let events = h.d.poll(h.now);
        assert!(matches!(&events[..], [ViewEvent::IndexFailed(msg)] if msg.contains("/nope.csv")));
        assert!(h.d.file().is_none());
    }

    #[test]
    fn test_failed_primary_keeps_previous_buffer() {
        let mut h = Harness::opened(0, 1000);
        let initial = h.next_request();
        h.answer(&initial, 1001);
        h.drain_requests();
        h.d.scroll_to(400, h.now);
        let Request::Read { generation, .. } = h.drain_requests().pop().unwrap() else {
            panic!("expected read");
        };
        let events = h.d.handle_response(
            Response::Rows {
                generation,
                kind: RequestKind::Primary,
                start_row: 401,
                result: Err(ReaderError::Seek { row: 401, total: 0 }),
            },
            h.now,
        );
        assert!(matches!(
            &events[0],
            ViewEvent::LoadFailed { file_changed: false, error } if error.contains("out of range")
        ));
        assert_eq!(h.visible_first(), Some("1"));
        assert_eq!(h.d.position(), 0);
        assert!(h.d.is_settled());
    }

    #[test]
    fn test_changed_file_is_reported_on_load() {
        let mut h = Harness::opened(0, 2000);
        let initial = h.next_request();
        h.answer(&initial, 2001);
        h.drain_requests();
        h.d.scroll_to(1500, h.now);
        let Request::Read { generation, .. } = h.drain_requests().pop().unwrap() else {
            panic!("expected read");
        };
        let events = h.d.handle_response(
            Response::Rows {
                generation,
                kind: RequestKind::Primary,
                start_row: 1501,
                result: Err(ReaderError::StaleIndex {
                    path: PathBuf::from("/data/emp.csv"),
                }),
            },
            h.now,
        );
        assert_eq!(
            events,
            vec![
                ViewEvent::LoadFailed {
                    error: "/data/emp.csv changed since it was indexed".into(),
                    file_changed: true,
                },
                ViewEvent::VisibleRegionChanged,
            ]
        );
        assert!(!h.d.is_busy());
        assert_eq!(h.d.position(), 0);
    }

    #[test]
    fn test_worker_skips_superseded_requests() {
        let mut q: VecDeque<Request> = VecDeque::new();
        for (g, kind) in [
            (1, RequestKind::Primary),
            (1, RequestKind::PrefetchAfter),
            (2, RequestKind::Primary),
        ] {
            q.push_back(Request::Read {
                generation: g,
                kind,
                start_row: 1,
                row_count: 5,
            });
        }
        discard_superseded(&mut q);
        assert_eq!(q.len(), 1);
        assert_eq!(q[0].generation(), 2);
    }
}
