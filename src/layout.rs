/// Terminal dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Where the panes go inside a bordered screen. Row 0 and the last row are borders, as
/// are the first and last columns; in split mode one more row divides the panes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub top: Rect,
    pub bottom: Option<Rect>,
    pub divider_row: Option<u16>,
}

impl Layout {
    pub fn compute(size: TermSize, split: bool) -> Self {
        let width = size.cols.saturating_sub(2);
        let inner_rows = size.rows.saturating_sub(2);
        if !split {
            return Self {
                top: Rect::new(1, 1, width, inner_rows),
                bottom: None,
                divider_row: None,
            };
        }

        // The top pane takes the extra row when the split is uneven.
        let usable = inner_rows.saturating_sub(1);
        let top_rows = usable / 2 + usable % 2;
        let bottom_rows = usable - top_rows;
        Self {
            top: Rect::new(1, 1, width, top_rows),
            bottom: Some(Rect::new(1, top_rows + 2, width, bottom_rows)),
            divider_row: Some(top_rows + 1),
        }
    }

    pub fn is_split(&self) -> bool {
        self.bottom.is_some()
    }
}

/// Which windows are on screen this frame, by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub top: Option<usize>,
    pub bottom: Option<usize>,
}

impl Selection {
    /// The first two non-empty windows get the panes. A focused non-empty window that is
    /// neither of those replaces the second, so whatever has focus is always visible.
    pub fn choose(non_empty: &[bool], focus: Option<usize>) -> Self {
        let mut candidates = non_empty
            .iter()
            .enumerate()
            .filter(|(_, has_lines)| **has_lines)
            .map(|(index, _)| index);
        let top = candidates.next();
        let mut bottom = candidates.next();
        if let (Some(top), Some(focus)) = (top, focus) {
            if focus != top && non_empty.get(focus).copied().unwrap_or(false) {
                bottom = Some(focus);
            }
        }
        Self { top, bottom }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.top == Some(index) || self.bottom == Some(index)
    }
}

/// Next non-empty window after `from`, wrapping; `None` when there is no other one.
pub fn next_non_empty(non_empty: &[bool], from: usize) -> Option<usize> {
    let len = non_empty.len();
    (1..len)
        .map(|step| (from + step) % len)
        .find(|index| non_empty[*index])
}

/// Previous non-empty window before `from`, wrapping; `None` when there is no other one.
pub fn previous_non_empty(non_empty: &[bool], from: usize) -> Option<usize> {
    let len = non_empty.len();
    (1..len)
        .map(|step| (from + len - step) % len)
        .find(|index| non_empty[*index])
}
