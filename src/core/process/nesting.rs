// SPDX-License-Identifier: MIT OR Apache-2.0

/// Sub-process nesting depth of a process instance.
///
/// Stores the depth only; the operator invoking a sub-process compares it
/// against its own ceiling. Owned by the single thread driving the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct NestingGuard {
    depth: usize,
}

impl NestingGuard {
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Guard for a sub-process invoked from this one.
    pub fn nested(&self) -> Self {
        Self {
            depth: self.depth + 1,
        }
    }

    pub fn exceeds(&self, ceiling: usize) -> bool {
        self.depth > ceiling
    }
}
