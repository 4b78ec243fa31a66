use crate::line_store::Line;
use crate::text::TextAction::{Tab, Text};
use unicode_width::UnicodeWidthChar;
use vte::{Parser, Perform};

pub const TAB_WIDTH: usize = 8;

/// What survives of a line's bytes once terminal control is stripped out.
#[derive(Debug, PartialEq, Eq)]
enum TextAction {
    Text(char),
    Tab,
}

/// Decodes one line of raw source bytes into display text. Printable characters are
/// kept, tabs are expanded to the next multiple of [TAB_WIDTH] display columns, and
/// everything else (control characters, CSI/OSC/DCS sequences) is dropped so it can't
/// move the cursor out of its pane.
pub fn decode_line(bytes: &[u8]) -> Line {
    let mut text = String::with_capacity(bytes.len());
    let mut column = 0;
    for action in parse_bytes(bytes) {
        match action {
            Text(c) => {
                text.push(c);
                column += c.width().unwrap_or(0);
            }
            Tab => {
                let pad = TAB_WIDTH - column % TAB_WIDTH;
                text.extend(std::iter::repeat(' ').take(pad));
                column += pad;
            }
        }
    }
    Line::new(text)
}

// A fresh parser per line: an escape sequence never legitimately spans a newline, and a
// truncated one must not swallow the start of the next line.
fn parse_bytes(bytes: &[u8]) -> Vec<TextAction> {
    let mut parser = Parser::new();
    let mut performer = Performer::default();
    for byte in bytes {
        parser.advance(&mut performer, *byte);
    }
    performer.actions
}

#[derive(Default)]
struct Performer {
    actions: Vec<TextAction>,
}

impl Perform for Performer {
    fn print(&mut self, c: char) {
        self.actions.push(Text(c))
    }

    fn execute(&mut self, byte: u8) {
        if byte == b'\t' {
            self.actions.push(Tab);
        }
    }
}
