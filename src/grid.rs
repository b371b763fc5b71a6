//! Paged grid cursor.
//!
//! The cursor is a `(page, row, col)` triple over a catalog laid out
//! `rows * cols` entries per page. Every transition leaves the cursor on an
//! existing entry whenever the catalog is non-empty; a move that cannot be
//! corrected is rejected and the previous coordinate kept.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub page: usize,
    pub row: usize,
    pub col: usize,
}

/// Edges observed at the end of a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSignals {
    pub selection_changed: bool,
    pub page_changed: bool,
    /// Selection the previous frame ended on.
    pub previous: Option<usize>,
    /// Selection this frame ended on.
    pub current: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct GridSelector {
    rows: usize,
    cols: usize,
    cursor: Cursor,
    prev_index: Option<usize>,
    prev_page: Option<usize>,
}

impl GridSelector {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows: rows.max(1),
            cols: cols.max(1),
            cursor: Cursor::default(),
            prev_index: None,
            prev_page: None,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn per_page(&self) -> usize {
        self.rows * self.cols
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn pages(&self, len: usize) -> usize {
        len.div_ceil(self.per_page())
    }

    fn index_of(&self, c: Cursor) -> usize {
        c.page * self.per_page() + c.row * self.cols + c.col
    }

    /// Flat catalog index under the cursor, `None` for an empty catalog.
    pub fn selection(&self, len: usize) -> Option<usize> {
        let index = self.index_of(self.cursor);
        (index < len).then_some(index)
    }

    /// Back to the first cell of the first page.
    pub fn reset(&mut self) {
        self.cursor = Cursor::default();
    }

    pub fn navigate(&mut self, direction: Direction, len: usize) {
        if len == 0 {
            return;
        }
        let before = self.cursor;
        let pages = self.pages(len);
        let mut c = before;

        match direction {
            Direction::Left => {
                if c.col > 0 {
                    c.col -= 1;
                } else if c.page > 0 {
                    c.page -= 1;
                    c.col = self.cols - 1;
                }
            }
            Direction::Right => {
                if c.col + 1 >= self.cols {
                    if c.page + 1 < pages {
                        c.page += 1;
                        c.col = 0;
                        while c.row > 0 && self.index_of(c) >= len {
                            c.row -= 1;
                        }
                    } else {
                        c.col = self.cols - 1;
                        if self.index_of(c) >= len && c.col > 0 {
                            c.col -= 1;
                        }
                    }
                } else {
                    c.col += 1;
                    if self.index_of(c) >= len {
                        c.col -= 1;
                    }
                }
            }
            Direction::Up => {
                c.row = c.row.saturating_sub(1);
            }
            Direction::Down => {
                c.row = (c.row + 1).min(self.rows - 1);
                if self.index_of(c) >= len && c.row > 0 {
                    c.row -= 1;
                }
            }
        }

        self.commit(before, c, len);
    }

    /// Moves to the first cell of the next page, when there is one.
    pub fn page_forward(&mut self, len: usize) {
        if self.cursor.page + 1 >= self.pages(len) {
            return;
        }
        let before = self.cursor;
        let mut c = Cursor { page: before.page + 1, row: before.row, col: 0 };
        while c.row > 0 && self.index_of(c) >= len {
            c.row -= 1;
        }
        self.commit(before, c, len);
    }

    /// Moves to the last column of the previous page, when there is one.
    pub fn page_back(&mut self, len: usize) {
        if self.cursor.page == 0 || len == 0 {
            return;
        }
        let before = self.cursor;
        let c = Cursor { page: before.page - 1, row: before.row, col: self.cols - 1 };
        self.commit(before, c, len);
    }

    /// Points the cursor at `(row, col)` on the current page. Ignored when
    /// the cell is empty or out of the grid.
    pub fn hover(&mut self, row: usize, col: usize, len: usize) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        let target = Cursor { page: self.cursor.page, row, col };
        if self.index_of(target) >= len {
            return false;
        }
        self.cursor = target;
        true
    }

    fn commit(&mut self, before: Cursor, after: Cursor, len: usize) {
        if self.index_of(after) < len {
            self.cursor = after;
        } else {
            log::debug!("grid: rejected move to {:?}", after);
            self.cursor = before;
        }
    }

    /// Pulls the cursor back onto the catalog after it shrank.
    pub fn clamp(&mut self, len: usize) {
        if len == 0 {
            self.reset();
            return;
        }
        let last = len - 1;
        if self.index_of(self.cursor) > last {
            let per_page = self.per_page();
            let offset = last % per_page;
            self.cursor = Cursor {
                page: last / per_page,
                row: offset / self.cols,
                col: offset % self.cols,
            };
        }
    }

    /// Compares against the previous frame and records this one.
    pub fn finish_frame(&mut self, len: usize) -> FrameSignals {
        let current = self.selection(len);
        let page = current.map(|_| self.cursor.page);
        let signals = FrameSignals {
            selection_changed: current != self.prev_index,
            page_changed: page != self.prev_page,
            previous: self.prev_index,
            current,
        };
        self.prev_index = current;
        self.prev_page = page;
        signals
    }
}
