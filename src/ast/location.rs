use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable key of a source handle, used to keep location values compact.
/// The `Handles` table maps keys back to relative paths.
pub type HandleKey = u64;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Reference form of a span: the path is a handle key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub path: HandleKey,
    pub start: Position,
    pub stop: Position,
}

impl Location {
    pub fn new(path: HandleKey, start: Position, stop: Position) -> Self {
        Location { path, start, stop }
    }

    /// Collapse the span to its first line; used to bucket diagnostics.
    pub fn line_bucket(&self) -> Location {
        let start = Position::new(self.start.line, 0);
        Location {
            path: self.path,
            start,
            stop: start,
        }
    }
}

/// Instantiated form: the handle key has been resolved to a filename.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstantiatedLocation {
    pub path: String,
    pub start: Position,
    pub stop: Position,
}

impl InstantiatedLocation {
    pub fn new(path: impl Into<String>, start: Position, stop: Position) -> Self {
        InstantiatedLocation {
            path: path.into(),
            start,
            stop,
        }
    }

    pub fn line_bucket(&self) -> InstantiatedLocation {
        let start = Position::new(self.start.line, 0);
        InstantiatedLocation {
            path: self.path.clone(),
            start,
            stop: start,
        }
    }
}

impl fmt::Display for InstantiatedLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.start)
    }
}
