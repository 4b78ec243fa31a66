use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsFd;

const PAGE_UP: &[u8] = b"\x1b[5~";
const PAGE_DOWN: &[u8] = b"\x1b[6~";
const CTRL_C: u8 = 0x03;

/// A key press that means something to the pager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    None,
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    NextPane,
    PreviousPane,
    Quit,
}

impl Command {
    /// Decodes one read's worth of bytes. Anything unrecognised, including an empty read,
    /// is [Command::None].
    pub fn decode(bytes: &[u8]) -> Self {
        match bytes {
            [b'k'] => Command::ScrollUp,
            [b'j'] => Command::ScrollDown,
            [b'h'] => Command::NextPane,
            [b'l'] => Command::PreviousPane,
            [b'q'] | [CTRL_C] => Command::Quit,
            PAGE_UP => Command::PageUp,
            PAGE_DOWN => Command::PageDown,
            _ => Command::None,
        }
    }
}

/// Reads at most four bytes per poll and decodes them. Holds no state between polls.
pub struct InputDecoder<R> {
    input: R,
}

impl<R: Read> InputDecoder<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    pub fn poll(&mut self) -> io::Result<Command> {
        let mut buffer = [0; 4];
        match self.input.read(&mut buffer) {
            Ok(read) => Ok(Command::decode(&buffer[..read])),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(Command::None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Unbuffered handle on standard input. `std::io::Stdin` buffers, which would merge
/// separate key presses into one read.
pub fn raw_stdin() -> io::Result<File> {
    Ok(File::from(io::stdin().as_fd().try_clone_to_owned()?))
}
