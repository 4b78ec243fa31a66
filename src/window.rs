use crate::layout::Rect;
use crate::line_store::{Line, LineStore};
use crate::reader::{spawn_reader, Source};
use crate::resources::Registrar;
use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor};
use log::error;
use std::io::{self, Write};
use tokio::task::JoinHandle;
use unicode_width::UnicodeWidthChar;

pub const FOCUS_COLOR: Color = Color::DarkBlue;

/// One pane's worth of content: the lines read from a single source plus where the user
/// has scrolled to.
#[derive(Debug)]
pub struct Window {
    title: String,
    store: LineStore,
    scroll_offset: usize,
    /// Rows the pane had at the last layout; 0 until the window is first laid out.
    viewport_rows: usize,
    source: Option<Source>,
    reader: Option<JoinHandle<()>>,
}

impl Window {
    /// Binds `source` without starting to read it.
    pub fn new(source: Source) -> Self {
        Self {
            title: source.title.clone(),
            store: LineStore::new(),
            scroll_offset: 0,
            viewport_rows: 0,
            source: Some(source),
            reader: None,
        }
    }

    /// Starts the background reader. Does nothing if it was already started.
    pub fn spawn_reader(&mut self, registrar: &Registrar) {
        if let Some(source) = self.source.take() {
            let handle = spawn_reader(source, self.store.staging(), registrar.clone());
            self.reader = Some(handle);
        }
    }

    /// Pulls in whatever the reader staged since the last call. Returns whether the
    /// content changed.
    pub fn update(&mut self) -> bool {
        self.store.drain()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn lines(&self) -> &[Line] {
        self.store.lines()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn viewport_rows(&self) -> usize {
        self.viewport_rows
    }

    pub fn set_viewport_rows(&mut self, rows: usize) {
        self.viewport_rows = rows;
        self.scroll_offset = self.scroll_offset.min(self.max_offset());
    }

    /// Largest offset worth scrolling to: the last full page once the pane height is known,
    /// otherwise the last line. Never beyond `len - 1`.
    pub fn max_offset(&self) -> usize {
        let len = self.store.len();
        if self.viewport_rows == 0 {
            len.saturating_sub(1)
        } else {
            len.saturating_sub(self.viewport_rows)
        }
    }

    pub fn scroll_up(&mut self, count: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(count);
    }

    pub fn scroll_down(&mut self, count: usize) {
        self.scroll_offset = self
            .scroll_offset
            .saturating_add(count)
            .min(self.max_offset());
    }

    /// Paints the visible lines into `area`: a gutter with each line's index, a separator
    /// (highlighted when `focused`), then the text cut to the pane width. An offset past the
    /// end paints nothing.
    pub fn render<W: Write>(&self, output: &mut W, area: Rect, focused: bool) -> io::Result<()> {
        let lines = self.store.lines();
        if self.scroll_offset >= lines.len() || area.is_empty() {
            return Ok(());
        }
        let end = lines.len().min(self.scroll_offset + area.height as usize);
        let gutter = decimal_digits(end - 1);
        let text_width = (area.width as usize).saturating_sub(gutter + 2);

        for (row, index) in (self.scroll_offset..end).enumerate() {
            queue!(
                output,
                MoveTo(area.x, area.y + row as u16),
                Print(format!("{index:>gutter$}"))
            )?;
            if focused {
                queue!(
                    output,
                    SetBackgroundColor(FOCUS_COLOR),
                    Print('|'),
                    ResetColor
                )?;
            } else {
                queue!(output, Print('|'))?;
            }
            if text_width > 0 {
                let text = fit_width(&lines[index], text_width);
                queue!(output, Print(' '), Print(text))?;
            }
        }
        Ok(())
    }

    /// Cancels the reader and waits for it to stop. Whatever it opened stays open for the
    /// resource registry to close.
    pub async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
            if let Err(e) = reader.await {
                if e.is_panic() {
                    error!("{}: reader panicked: {e}", self.title);
                }
            }
        }
        self.source = None;
    }
}

#[cfg(test)]
impl Window {
    /// A window whose lines are already drained, bound to a socket nobody writes to.
    pub(crate) fn with_lines(title: &str, lines: &[&str]) -> Self {
        let (ours, _theirs) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut window = Window::new(Source::socket(title, ours));
        let staging = window.store.staging();
        for line in lines {
            staging.append_staged((*line).into());
        }
        window.update();
        window
    }
}

/// Longest prefix of `text` that fits in `width` terminal columns. A wide glyph that would
/// straddle the edge is left out.
pub fn fit_width(text: &str, width: usize) -> &str {
    let mut used = 0;
    for (at, c) in text.char_indices() {
        used += c.width().unwrap_or(0);
        if used > width {
            return &text[..at];
        }
    }
    text
}

pub fn decimal_digits(number: usize) -> usize {
    number.checked_ilog10().map_or(1, |digits| digits as usize + 1)
}
