use crate::input::Command;
use crate::layout::{next_non_empty, previous_non_empty, Layout, Selection, TermSize};
use crate::window::{fit_width, Window};
use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use log::{debug, warn};
use std::io::{self, Write};
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Everything on screen: all windows, which one has focus, and the last frame's layout.
/// Only the main loop touches it.
#[derive(Debug)]
pub struct Screen {
    windows: Vec<Window>,
    focus: Option<usize>,
    selection: Selection,
    layout: Option<Layout>,
    last_size: Option<TermSize>,
    dirty: bool,
    warned_empty: bool,
}

impl Screen {
    pub fn new(windows: Vec<Window>) -> Self {
        Self {
            windows,
            focus: None,
            selection: Selection::default(),
            layout: None,
            last_size: None,
            dirty: true,
            warned_empty: false,
        }
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn focus(&self) -> Option<usize> {
        self.focus
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn layout(&self) -> Option<Layout> {
        self.layout
    }

    fn non_empty(&self) -> Vec<bool> {
        self.windows.iter().map(|w| !w.is_empty()).collect()
    }

    /// Keeps focus on a non-empty window, falling back to the first one.
    fn settle_focus(&mut self) {
        let non_empty = self.non_empty();
        let valid = matches!(self.focus, Some(focus) if non_empty.get(focus) == Some(&true));
        if !valid {
            self.focus = non_empty.iter().position(|has_lines| *has_lines);
        }
    }

    pub fn focus_next(&mut self) {
        self.settle_focus();
        if let Some(focus) = self.focus {
            if let Some(next) = next_non_empty(&self.non_empty(), focus) {
                self.focus = Some(next);
                self.dirty = true;
            }
        }
    }

    pub fn focus_previous(&mut self) {
        self.settle_focus();
        if let Some(focus) = self.focus {
            if let Some(previous) = previous_non_empty(&self.non_empty(), focus) {
                self.focus = Some(previous);
                self.dirty = true;
            }
        }
    }

    /// Applies one decoded key press to the focused window or to focus itself.
    pub fn apply(&mut self, command: Command) -> Flow {
        match command {
            Command::None => {}
            Command::Quit => return Flow::Quit,
            Command::NextPane => self.focus_next(),
            Command::PreviousPane => self.focus_previous(),
            Command::ScrollUp => self.scroll_focused(|window| window.scroll_up(1)),
            Command::ScrollDown => self.scroll_focused(|window| window.scroll_down(1)),
            Command::PageUp => self.scroll_focused(|window| {
                let page = window.viewport_rows().max(1);
                window.scroll_up(page)
            }),
            Command::PageDown => self.scroll_focused(|window| {
                let page = window.viewport_rows().max(1);
                window.scroll_down(page)
            }),
        }
        Flow::Continue
    }

    fn scroll_focused(&mut self, scroll: impl FnOnce(&mut Window)) {
        self.settle_focus();
        let Some(window) = self.focus.and_then(|focus| self.windows.get_mut(focus)) else {
            return;
        };
        let before = window.scroll_offset();
        scroll(window);
        if window.scroll_offset() != before {
            self.dirty = true;
        }
    }

    /// Drains every window and returns whether any of them got new lines.
    pub fn update(&mut self) -> bool {
        let mut changed = false;
        for window in &mut self.windows {
            changed |= window.update();
        }
        if changed {
            self.dirty = true;
        }
        changed
    }

    /// Chooses panes for this frame and sizes them. Scroll limits depend on the pane
    /// height, so the chosen windows learn their viewport here.
    pub fn arrange(&mut self, size: TermSize) -> Layout {
        self.settle_focus();
        let selection = Selection::choose(&self.non_empty(), self.focus);
        let layout = Layout::compute(size, selection.bottom.is_some());
        if let Some(top) = selection.top {
            self.windows[top].set_viewport_rows(layout.top.height as usize);
        }
        if let (Some(bottom), Some(area)) = (selection.bottom, layout.bottom) {
            self.windows[bottom].set_viewport_rows(area.height as usize);
        }
        if selection != self.selection {
            debug!("panes now {selection:?}");
        }
        self.selection = selection;
        self.layout = Some(layout);
        layout
    }

    /// One render cycle: pull in new lines, and if anything changed since the last frame
    /// (content, a key press, or the terminal size) redraw everything. Returns whether a
    /// frame was drawn.
    pub fn render<W: Write>(&mut self, output: &mut W, size: TermSize) -> io::Result<bool> {
        self.update();
        if self.last_size != Some(size) {
            self.last_size = Some(size);
            self.dirty = true;
        }
        if !std::mem::take(&mut self.dirty) {
            return Ok(false);
        }

        let layout = self.arrange(size);
        queue!(output, MoveTo(0, 0), Clear(ClearType::All))?;
        if size.cols < 2 || size.rows < 2 {
            output.flush()?;
            return Ok(true);
        }

        let top_title = self.selection.top.map(|index| self.windows[index].title());
        let bottom_title = self.selection.bottom.map(|index| self.windows[index].title());
        draw_border(output, size, &layout, top_title, bottom_title)?;

        match self.selection.top {
            Some(top) => {
                self.warned_empty = false;
                self.windows[top].render(output, layout.top, self.focus == Some(top))?;
            }
            None if !self.warned_empty => {
                let count = self.windows.len();
                warn!("none of the {count} sources has produced a line yet");
                self.warned_empty = true;
            }
            None => {}
        }
        if let (Some(bottom), Some(area)) = (self.selection.bottom, layout.bottom) {
            self.windows[bottom].render(output, area, self.focus == Some(bottom))?;
        }
        output.flush()?;
        Ok(true)
    }

    /// Cancels and joins every reader task.
    pub async fn close(&mut self) {
        for window in &mut self.windows {
            window.close().await;
        }
    }
}

fn draw_border<W: Write>(
    output: &mut W,
    size: TermSize,
    layout: &Layout,
    top_title: Option<&str>,
    bottom_title: Option<&str>,
) -> io::Result<()> {
    let last_row = size.rows - 1;
    let last_col = size.cols - 1;
    queue!(
        output,
        MoveTo(0, 0),
        Print(rule(size.cols, '┌', '┐', top_title))
    )?;
    for row in 1..last_row {
        if Some(row) == layout.divider_row {
            queue!(
                output,
                MoveTo(0, row),
                Print(rule(size.cols, '├', '┤', bottom_title))
            )?;
        } else {
            queue!(
                output,
                MoveTo(0, row),
                Print('│'),
                MoveTo(last_col, row),
                Print('│')
            )?;
        }
    }
    queue!(
        output,
        MoveTo(0, last_row),
        Print(rule(size.cols, '└', '┘', None))
    )
}

/// A full-width horizontal line, with the title set into it near the left end.
fn rule(cols: u16, left: char, right: char, title: Option<&str>) -> String {
    let inner = cols.saturating_sub(2) as usize;
    let mut middle = String::from("─");
    if let Some(title) = title {
        middle.push(' ');
        middle.push_str(title);
        middle.push(' ');
    }
    let middle = fit_width(&middle, inner);
    let mut line = String::with_capacity(cols as usize * 3);
    line.push(left);
    line.push_str(middle);
    line.extend(std::iter::repeat('─').take(inner - middle.width()));
    line.push(right);
    line
}

#[cfg(test)]
mod test {
    use crate::input::Command;
    use crate::layout::TermSize;
    use crate::screen::{rule, Flow, Screen};
    use crate::window::Window;

    fn screen_of(windows: &[(&str, &[&str])]) -> Screen {
        Screen::new(
            windows
                .iter()
                .map(|(title, lines)| Window::with_lines(title, lines))
                .collect(),
        )
    }

    fn numbered(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("line {i}")).collect()
    }

    fn frame_text(output: &[u8], size: TermSize) -> String {
        let mut parser = vt100::Parser::new(size.rows, size.cols, 0);
        parser.process(output);
        parser
            .screen()
            .rows(0, size.cols)
            .map(|row| row.trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_text(screen: &mut Screen, size: TermSize) -> String {
        let mut output = Vec::new();
        screen.render(&mut output, size).unwrap();
        frame_text(&output, size)
    }

    #[test]
    fn rule_embeds_and_truncates_titles() {
        assert_eq!(rule(10, '┌', '┐', None), "┌────────┐");
        assert_eq!(rule(10, '├', '┤', Some("ab")), "├─ ab ───┤");
        assert_eq!(rule(8, '┌', '┐', Some("long title")), "┌─ long┐");
    }

    #[test]
    fn rule_measures_wide_titles_in_columns() {
        assert_eq!(rule(9, '┌', '┐', Some("日本語")), "┌─ 日本─┐");
    }

    #[test]
    fn split_frame() {
        let mut screen = screen_of(&[("a", &["one", "two", "three"]), ("b", &["uno"])]);
        let text = render_text(&mut screen, TermSize::new(16, 7));
        insta::assert_snapshot!(text, @r###"
        ┌─ a ──────────┐
        │0| one        │
        │1| two        │
        ├─ b ──────────┤
        │0| uno        │
        │              │
        └──────────────┘
        "###);
    }

    #[test]
    fn focused_pane_is_highlighted() {
        let mut screen = screen_of(&[("a", &["one"]), ("b", &["uno"])]);
        let size = TermSize::new(16, 7);
        let mut output = Vec::new();
        screen.render(&mut output, size).unwrap();
        let mut parser = vt100::Parser::new(size.rows, size.cols, 0);
        parser.process(&output);
        let screen_model = parser.screen();
        let default = vt100::Color::Default;
        assert_ne!(screen_model.cell(1, 2).unwrap().bgcolor(), default);
        assert_eq!(screen_model.cell(4, 2).unwrap().bgcolor(), default);
    }

    #[test]
    fn ten_line_file_fits_in_a_single_pane() {
        let lines = numbered(10);
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let mut screen = screen_of(&[("notes.txt", &refs)]);
        let size = TermSize::new(30, 20);

        let text = render_text(&mut screen, size);
        let rows: Vec<&str> = text.lines().collect();
        assert!(!screen.layout().unwrap().is_split());
        assert!(rows[0].starts_with("┌─ notes.txt ─"));
        for (i, row) in rows[1..11].iter().enumerate() {
            assert!(row.starts_with(&format!("│{i}| line {i}")), "{row}");
            assert!(row.ends_with('│'));
        }

        for _ in 0..5 {
            assert_eq!(screen.apply(Command::ScrollDown), Flow::Continue);
        }
        screen.apply(Command::PageDown);
        assert_eq!(screen.windows()[0].scroll_offset(), 0);

        let mut output = Vec::new();
        assert!(!screen.render(&mut output, size).unwrap());
    }

    #[test]
    fn empty_first_source_leaves_single_pane_for_the_second() {
        let lines = numbered(5);
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let mut screen = screen_of(&[("empty", &[]), ("five", &refs)]);
        render_text(&mut screen, TermSize::new(40, 20));

        assert_eq!(screen.selection().top, Some(1));
        assert_eq!(screen.selection().bottom, None);
        assert!(!screen.layout().unwrap().is_split());
        assert_eq!(screen.focus(), Some(1));
    }

    #[test]
    fn nothing_to_show_draws_only_the_border() {
        let mut screen = screen_of(&[("empty", &[])]);
        let text = render_text(&mut screen, TermSize::new(6, 3));
        assert_eq!(text, "┌────┐\n│    │\n└────┘");
        assert_eq!(screen.selection().top, None);
    }

    #[test]
    fn renders_only_when_something_changed() {
        let mut screen = screen_of(&[("a", &["one"])]);
        let size = TermSize::new(20, 5);
        let mut output = Vec::new();
        assert!(screen.render(&mut output, size).unwrap());
        assert!(!screen.render(&mut output, size).unwrap());
        assert!(screen.render(&mut output, TermSize::new(21, 5)).unwrap());
    }

    #[test]
    fn scrolling_marks_the_frame_dirty() {
        let lines = numbered(50);
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let mut screen = screen_of(&[("long", &refs)]);
        let size = TermSize::new(20, 10);
        let mut output = Vec::new();
        screen.render(&mut output, size).unwrap();

        screen.apply(Command::ScrollDown);
        assert!(screen.render(&mut output, size).unwrap());
        screen.apply(Command::ScrollUp);
        screen.apply(Command::ScrollUp);
        assert!(screen.render(&mut output, size).unwrap());
        // Already at the top, so nothing moved.
        screen.apply(Command::ScrollUp);
        assert!(!screen.render(&mut output, size).unwrap());
    }

    #[test]
    fn paging_moves_by_pane_height() {
        let lines = numbered(100);
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let mut screen = screen_of(&[("long", &refs)]);
        screen.render(&mut Vec::new(), TermSize::new(20, 12)).unwrap();

        screen.apply(Command::PageDown);
        assert_eq!(screen.windows()[0].scroll_offset(), 10);
        screen.apply(Command::PageDown);
        screen.apply(Command::PageUp);
        assert_eq!(screen.windows()[0].scroll_offset(), 10);
        screen.apply(Command::PageUp);
        screen.apply(Command::PageUp);
        assert_eq!(screen.windows()[0].scroll_offset(), 0);
    }

    #[test]
    fn scroll_applies_to_the_focused_window_only() {
        let lines = numbered(40);
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let mut screen = screen_of(&[("a", &refs), ("b", &refs)]);
        screen.render(&mut Vec::new(), TermSize::new(20, 12)).unwrap();

        screen.apply(Command::NextPane);
        screen.apply(Command::ScrollDown);
        assert_eq!(screen.windows()[0].scroll_offset(), 0);
        assert_eq!(screen.windows()[1].scroll_offset(), 1);
    }

    #[test]
    fn focus_alone_does_not_move() {
        let mut screen = screen_of(&[("empty", &[]), ("only", &["x"]), ("empty too", &[])]);
        screen.apply(Command::NextPane);
        assert_eq!(screen.focus(), Some(1));
        screen.apply(Command::PreviousPane);
        assert_eq!(screen.focus(), Some(1));
    }

    #[test]
    fn focus_cycles_back_after_n_steps() {
        let mut screen = screen_of(&[
            ("a", &["1"]),
            ("empty", &[]),
            ("b", &["2"]),
            ("c", &["3"]),
        ]);
        screen.apply(Command::NextPane);
        let start = screen.focus();
        for _ in 0..3 {
            screen.apply(Command::NextPane);
        }
        assert_eq!(screen.focus(), start);
        for _ in 0..3 {
            screen.apply(Command::PreviousPane);
        }
        assert_eq!(screen.focus(), start);
    }

    #[test]
    fn focusing_a_third_window_shows_it_at_the_bottom() {
        let mut screen = screen_of(&[("a", &["1"]), ("b", &["2"]), ("c", &["3"])]);
        let size = TermSize::new(20, 9);
        screen.apply(Command::PreviousPane);
        assert_eq!(screen.focus(), Some(2));

        let text = render_text(&mut screen, size);
        assert_eq!(screen.selection().bottom, Some(2));
        assert!(text.contains("├─ c ─"));
        assert!(!text.contains("─ b ─"));
    }

    #[test]
    fn quit_stops_the_loop() {
        let mut screen = screen_of(&[("a", &["1"])]);
        assert_eq!(screen.apply(Command::None), Flow::Continue);
        assert_eq!(screen.apply(Command::Quit), Flow::Quit);
    }
}
