//! Append-only action/observation history: the planner's search key.

use std::fmt;

/// One step of real or simulated experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entry {
    pub action: usize,
    pub observation: usize,
}

/// Ordered sequence of `(action, observation)` pairs.
///
/// Used both as the planner's search key (truncated to the real-world
/// prefix at the start of every simulation, then extended during the
/// in-simulation descent) and as an input to the simulator's knowledge
/// hooks (`select_random`, `local_move`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: Vec<Entry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, action: usize, observation: usize) {
        self.entries.push(Entry { action, observation });
    }

    /// Drop all entries past index `k`, leaving a history of length `k`.
    pub fn truncate(&mut self, k: usize) {
        self.entries.truncate(k);
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn back(&self) -> Option<Entry> {
        self.entries.last().copied()
    }

    /// Index from the end: `index_from_end(0)` is the last entry,
    /// `index_from_end(1)` the one before it, etc.
    pub fn index_from_end(&self, offset: usize) -> Option<Entry> {
        let len = self.entries.len();
        if offset >= len {
            None
        } else {
            Some(self.entries[len - 1 - offset])
        }
    }

    pub fn as_slice(&self) -> &[Entry] {
        &self.entries
    }

    /// The suffix of entries starting at tree depth `from`, used by RAVE to
    /// credit every action played from `from` onward in this simulation.
    pub fn suffix_from(&self, from: usize) -> &[Entry] {
        if from >= self.entries.len() {
            &[]
        } else {
            &self.entries[from..]
        }
    }

    pub fn starts_with(&self, prefix: &History) -> bool {
        prefix.entries.len() <= self.entries.len()
            && self.entries[..prefix.entries.len()] == prefix.entries[..]
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "(a={},o={})", e.action, e.observation)?;
        }
        Ok(())
    }
}
