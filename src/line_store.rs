use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

/// One line of source output, terminator stripped and already decoded for display.
#[derive(Debug, PartialEq, Eq)]
pub struct Line(Box<str>);

impl Line {
    pub fn new(text: impl Into<Box<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Line {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Line {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Line {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// The half of a [LineStore] shared with the reader task. Readers can only append here;
/// they never see the drained lines.
#[derive(Debug, Default)]
pub struct Staging {
    staged: Mutex<Vec<Line>>,
}

impl Staging {
    pub fn append_staged(&self, line: Line) {
        self.lock().push(line);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Line>> {
        // Only `push` and `take` happen under the lock, so a poisoned vec is still whole.
        self.staged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Append-only line sequence owned by the render thread, fed through [Staging].
#[derive(Debug, Default)]
pub struct LineStore {
    lines: Vec<Line>,
    staging: Arc<Staging>,
}

impl LineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the producer side. Cloning it is how a reader task gets access.
    pub fn staging(&self) -> Arc<Staging> {
        Arc::clone(&self.staging)
    }

    /// Moves everything staged so far onto the end of `lines`, keeping staging order.
    /// Returns whether anything moved.
    pub fn drain(&mut self) -> bool {
        let staged = std::mem::take(&mut *self.staging.lock());
        if staged.is_empty() {
            return false;
        }
        self.lines.extend(staged);
        true
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
