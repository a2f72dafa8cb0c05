//! Core types for seqfetch

/// One chain position: a task identifier bound to its launch index
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Task {
    /// Launch position (0-based); fixes where this task's bytes land in the output
    pub index: usize,
    /// Task identifier, normally an HTTP(S) URL
    pub url: String,
}

impl Task {
    /// Create a task at the given position
    pub fn new(index: usize, url: impl Into<String>) -> Self {
        Self {
            index,
            url: url.into(),
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {}", self.index, self.url)
    }
}

/// Outcome of a chain that ran to completion
#[derive(Debug)]
pub struct Completed<W> {
    /// The sink, returned after its final shutdown
    pub sink: W,
    /// Number of tasks that were launched
    pub tasks: usize,
    /// Total bytes written to the sink across all positions
    pub bytes_written: u64,
}
