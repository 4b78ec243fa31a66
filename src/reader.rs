use crate::line_store::Staging;
use crate::resources::{Registrar, Resource};
use crate::text::decode_line;
use log::{debug, error, info};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::task::JoinHandle;

const CHUNK_SIZE: usize = 8 * 1024;

/// Where a window's lines come from, as handed over by startup.
#[derive(Debug)]
pub struct Source {
    pub title: String,
    pub handle: SourceHandle,
}

#[derive(Debug)]
pub enum SourceHandle {
    File(File),
    /// Parent end of a child's stdout or stderr socket pair.
    Socket(UnixStream),
}

impl Source {
    pub fn file(title: impl Into<String>, file: File) -> Self {
        Self {
            title: title.into(),
            handle: SourceHandle::File(file),
        }
    }

    pub fn socket(title: impl Into<String>, socket: UnixStream) -> Self {
        Self {
            title: title.into(),
            handle: SourceHandle::Socket(socket),
        }
    }
}

/// The reader's view of its source. Every read goes through a shared reference so the
/// same handle can sit in the resource registry while the task is still using it.
enum Stream {
    /// A regular file. Reads never wait on a writer, so a blocking read is fine.
    File(Arc<File>),
    /// A FIFO or pipe handed over as a path (`mkfifo`, `<(cmd)`).
    Pipe(Arc<AsyncFd<File>>),
    Socket(Arc<tokio::net::UnixStream>),
}

impl Stream {
    // Must run inside the runtime: pipes and sockets are registered with the reactor here.
    fn open(handle: SourceHandle) -> io::Result<Self> {
        Ok(match handle {
            SourceHandle::File(file) => {
                let file_type = file.metadata()?.file_type();
                if file_type.is_fifo() || file_type.is_socket() {
                    set_nonblocking(&file)?;
                    Stream::Pipe(Arc::new(AsyncFd::with_interest(file, Interest::READABLE)?))
                } else {
                    Stream::File(Arc::new(file))
                }
            }
            SourceHandle::Socket(socket) => {
                socket.set_nonblocking(true)?;
                Stream::Socket(Arc::new(tokio::net::UnixStream::from_std(socket)?))
            }
        })
    }

    fn resource(&self) -> Resource {
        match self {
            Stream::File(file) => Resource::File(Arc::clone(file)),
            Stream::Pipe(pipe) => Resource::Pipe(Arc::clone(pipe)),
            Stream::Socket(socket) => Resource::Socket(Arc::clone(socket)),
        }
    }

    /// Next chunk of bytes; empty at end of stream. Each await here is a point where the
    /// task may be cancelled. Only regular files are read off the runtime, and those reads
    /// always return.
    async fn read_chunk(&self) -> io::Result<Vec<u8>> {
        let mut chunk = vec![0; CHUNK_SIZE];
        match self {
            Stream::File(file) => {
                let file = Arc::clone(file);
                tokio::task::spawn_blocking(move || {
                    let n = (&*file).read(&mut chunk)?;
                    chunk.truncate(n);
                    Ok::<_, io::Error>(chunk)
                })
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
            }
            Stream::Pipe(pipe) => loop {
                let mut guard = pipe.readable().await?;
                match guard.try_io(|inner| inner.get_ref().read(&mut chunk)) {
                    Ok(result) => {
                        chunk.truncate(result?);
                        return Ok(chunk);
                    }
                    Err(_would_block) => continue,
                }
            },
            Stream::Socket(socket) => loop {
                socket.readable().await?;
                match socket.try_read(&mut chunk) {
                    Ok(n) => {
                        chunk.truncate(n);
                        return Ok(chunk);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(e) => return Err(e),
                }
            },
        }
    }
}

fn set_nonblocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: fcntl(2) on a descriptor we own; no pointers are passed.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Splits a byte stream into lines on `\n`, holding back a partial line between chunks.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(end) = rest.iter().position(|b| *b == b'\n') {
            self.pending.extend_from_slice(&rest[..end]);
            lines.push(strip_carriage_return(std::mem::take(&mut self.pending)));
            rest = &rest[end + 1..];
        }
        self.pending.extend_from_slice(rest);
        lines
    }

    /// The unterminated tail, if the stream ended mid-line.
    pub fn finish(self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(strip_carriage_return(self.pending))
        }
    }
}

fn strip_carriage_return(mut line: Vec<u8>) -> Vec<u8> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    line
}

/// Starts the background task that reads `source` line by line into `staging` until end
/// of stream, a read error, or cancellation through the returned handle.
///
/// Cancellation only lands while the task waits for bytes, never inside
/// [Staging::append_staged]. The opened stream is registered with `registrar` before the
/// first read and is not closed by cancellation; the registry closes it.
pub fn spawn_reader(
    source: Source,
    staging: Arc<Staging>,
    registrar: Registrar,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Source { title, handle } = source;
        let stream = match Stream::open(handle) {
            Ok(stream) => stream,
            Err(e) => {
                error!("{title}: could not open stream for reading: {e}");
                return;
            }
        };
        registrar.register(&title, stream.resource());
        debug!("{title}: reader started");

        match pump(&stream, &staging).await {
            Ok(count) => info!("{title}: end of stream after {count} lines"),
            Err(e) => error!("{title}: read failed, pane stops updating: {e}"),
        }
    })
}

async fn pump(stream: &Stream, staging: &Staging) -> io::Result<usize> {
    let mut splitter = LineSplitter::default();
    let mut count = 0;
    loop {
        let chunk = stream.read_chunk().await?;
        if chunk.is_empty() {
            if let Some(tail) = splitter.finish() {
                staging.append_staged(decode_line(&tail));
                count += 1;
            }
            return Ok(count);
        }
        for raw in splitter.push(&chunk) {
            staging.append_staged(decode_line(&raw));
            count += 1;
        }
    }
}
