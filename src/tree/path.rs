//! Tree paths: sequences of child indices addressing a node from the root.
//!
//! A [`TreePath`] is the stable address of a component (and of its state node)
//! within a tree: the empty path is the root, `2.0` is the first child of the
//! root's third child. Paths are cheap to compare and hash, which is what the
//! action registry and the frame logic rely on.

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// TreePath
// ---------------------------------------------------------------------------

/// A sequence of child indices from the tree root down to a node.
///
/// The wire form is dot-separated (`"2.0.1"`); the root is the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreePath(Vec<usize>);

impl TreePath {
    /// The root path (no indices).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from a slice of child indices.
    pub fn from_indices(indices: &[usize]) -> Self {
        Self(indices.to_vec())
    }

    /// The child indices, root-first.
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Whether this path addresses the root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of steps from the root.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The path of the `index`-th child of this node.
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Whether `self` is an ancestor of `other` (strictly above it).
    pub fn is_ancestor_of(&self, other: &TreePath) -> bool {
        other.0.len() > self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for index in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{index}")?;
            first = false;
        }
        Ok(())
    }
}

/// Error parsing a wire-form path.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid path segment `{segment}`")]
pub struct PathParseError {
    /// The offending segment.
    pub segment: String,
}

impl FromStr for TreePath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let mut indices = Vec::new();
        for segment in s.split('.') {
            let index = segment.parse::<usize>().map_err(|_| PathParseError {
                segment: segment.to_owned(),
            })?;
            indices.push(index);
        }
        Ok(Self(indices))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
