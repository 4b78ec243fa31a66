use log::{debug, info, warn};
use std::fmt;
use std::fs::File;
use std::sync::Arc;
use tokio::io::unix::AsyncFd;
use tokio::net::UnixStream;
use tokio::sync::mpsc;

/// A stream opened by a reader task. The task keeps one reference for reading and hands
/// another to the [ResourceRegistry], which closes it once the task is known to be gone.
#[derive(Debug, Clone)]
pub enum Resource {
    File(Arc<File>),
    /// A FIFO or pipe, polled through the reactor.
    Pipe(Arc<AsyncFd<File>>),
    Socket(Arc<UnixStream>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Pipe,
    Socket,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::File => f.write_str("file"),
            ResourceKind::Pipe => f.write_str("pipe"),
            ResourceKind::Socket => f.write_str("socket"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Release {
    Closed,
    /// Another reference is still alive, so the descriptor stays open until that one drops.
    StillShared,
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::File(_) => ResourceKind::File,
            Resource::Pipe(_) => ResourceKind::Pipe,
            Resource::Socket(_) => ResourceKind::Socket,
        }
    }

    pub fn release(self) -> Release {
        let closed = match self {
            Resource::File(file) => Arc::try_unwrap(file).map(drop).is_ok(),
            Resource::Pipe(pipe) => Arc::try_unwrap(pipe).map(drop).is_ok(),
            Resource::Socket(socket) => Arc::try_unwrap(socket).map(drop).is_ok(),
        };
        if closed {
            Release::Closed
        } else {
            Release::StillShared
        }
    }
}

#[derive(Debug)]
struct Entry {
    label: String,
    resource: Resource,
}

/// Sending half of the registry, cloned into every reader task.
#[derive(Debug, Clone)]
pub struct Registrar {
    tx: mpsc::UnboundedSender<Entry>,
}

impl Registrar {
    pub fn register(&self, label: &str, resource: Resource) {
        debug!("registering {} for {label}", resource.kind());
        let entry = Entry {
            label: label.to_owned(),
            resource,
        };
        if self.tx.send(entry).is_err() {
            // The registry already drained; the caller's own reference closes it instead.
            warn!("registry is gone, {label} closes with its reader");
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub closed: usize,
    pub still_shared: usize,
}

/// Collects every resource opened by reader tasks so they can be closed from the main
/// thread. [ResourceRegistry::drain] takes `self`, so it runs at most once; call it only
/// after every reader task has been joined.
#[derive(Debug)]
pub struct ResourceRegistry {
    rx: mpsc::UnboundedReceiver<Entry>,
}

impl ResourceRegistry {
    pub fn new() -> (Self, Registrar) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, Registrar { tx })
    }

    pub fn drain(mut self) -> DrainReport {
        self.rx.close();
        let mut report = DrainReport::default();
        while let Ok(Entry { label, resource }) = self.rx.try_recv() {
            let kind = resource.kind();
            match resource.release() {
                Release::Closed => {
                    debug!("closed {kind} for {label}");
                    report.closed += 1;
                }
                Release::StillShared => {
                    warn!("{kind} for {label} is still referenced after shutdown");
                    report.still_shared += 1;
                }
            }
        }
        info!(
            "resource registry drained: {} closed, {} still shared",
            report.closed, report.still_shared
        );
        report
    }
}
