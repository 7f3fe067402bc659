//! Scroll model of the chapter text panel.
//!
//! The text is word-wrapped to a fixed width; the viewport shows a window of
//! `rows` lines and scrolls by `step` lines.

use serde::Serialize;

pub const DEFAULT_COLUMNS: usize = 60;
pub const DEFAULT_ROWS: usize = 8;
pub const DEFAULT_STEP: usize = 3;

/// Scroll position over wrapped chapter text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    total_lines: usize,
    rows: usize,
    step: usize,
    offset: usize,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0, DEFAULT_ROWS, DEFAULT_STEP)
    }
}

impl Viewport {
    /// A viewport over `total_lines` lines, scrolled to the top.
    #[must_use]
    pub fn new(total_lines: usize, rows: usize, step: usize) -> Self {
        Self {
            total_lines,
            rows: rows.max(1),
            step: step.max(1),
            offset: 0,
        }
    }

    /// A default-sized viewport over `text`.
    #[must_use]
    pub fn for_text(text: &str) -> Self {
        Self::new(wrapped_line_count(text, DEFAULT_COLUMNS), DEFAULT_ROWS, DEFAULT_STEP)
    }

    fn max_offset(&self) -> usize {
        self.total_lines.saturating_sub(self.rows)
    }

    #[must_use]
    pub fn at_top(&self) -> bool {
        self.offset == 0
    }

    #[must_use]
    pub fn at_bottom(&self) -> bool {
        self.offset >= self.max_offset()
    }

    /// Scrolls up one step. Returns `true` if the viewport was already at the top.
    pub fn scroll_up(&mut self) -> bool {
        let was_at_top = self.at_top();
        self.offset = self.offset.saturating_sub(self.step);
        was_at_top
    }

    /// Scrolls down one step. Returns `true` if the viewport was already at the bottom.
    pub fn scroll_down(&mut self) -> bool {
        let was_at_bottom = self.at_bottom();
        self.offset = (self.offset + self.step).min(self.max_offset());
        was_at_bottom
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Lines `text` occupies when greedily word-wrapped to `columns`. Words longer
/// than a line are broken.
#[must_use]
pub fn wrapped_line_count(text: &str, columns: usize) -> usize {
    let columns = columns.max(1);
    text.lines()
        .map(|paragraph| {
            let mut lines = 1;
            let mut used = 0;
            for word in paragraph.split_whitespace() {
                let len = word.chars().count();
                let needed = if used == 0 { len } else { used + 1 + len };
                if needed <= columns {
                    used = needed;
                } else if used == 0 {
                    lines += (len - 1) / columns;
                    used = (len - 1) % columns + 1;
                } else {
                    lines += 1 + (len - 1) / columns;
                    used = (len - 1) % columns + 1;
                }
            }
            lines
        })
        .sum()
}
