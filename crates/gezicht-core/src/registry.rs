//! In-memory registry of known faces.
//!
//! Maps a person's name to the encodings learned for them. The entry order
//! doubles as the matching traversal queue: every lookup rotates a matched
//! entry toward the back, so repeated lookups of the same person stop paying
//! for it at the front of the queue.

use crate::types::{Embedding, Matcher};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    /// Never empty.
    encodings: Vec<Embedding>,
}

/// Known faces, in traversal order.
#[derive(Debug, Default)]
pub struct Registry {
    entries: VecDeque<Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append encodings to `name`, creating the entry if needed.
    ///
    /// Returns the number of encodings appended. Appending nothing leaves the
    /// registry untouched, so a name never maps to an empty set.
    pub fn append<I>(&mut self, name: &str, encodings: I) -> usize
    where
        I: IntoIterator<Item = Embedding>,
    {
        let encodings: Vec<Embedding> = encodings.into_iter().collect();
        let count = encodings.len();
        if count == 0 {
            return 0;
        }

        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.encodings.extend(encodings),
            None => self.entries.push_back(Entry {
                name: name.to_string(),
                encodings,
            }),
        }

        tracing::debug!(name, count, people = self.entries.len(), "registry: appended encodings");
        count
    }

    /// Find the first entry (in queue order) with an encoding matching `probe`.
    ///
    /// Entries that missed go back to the end of the queue in the order they
    /// were popped, followed by the matched entry. When nothing matches, every
    /// entry is returned in order and the queue is unchanged.
    pub fn lookup_and_rotate(&mut self, probe: &Embedding, matcher: &dyn Matcher) -> Option<String> {
        let mut missed = Vec::new();

        while let Some(entry) = self.entries.pop_front() {
            let hit = matcher
                .compare(&entry.encodings, probe)
                .into_iter()
                .any(|m| m);

            if hit {
                let name = entry.name.clone();
                self.entries.extend(missed);
                self.entries.push_back(entry);
                return Some(name);
            }
            missed.push(entry);
        }

        self.entries.extend(missed);
        None
    }

    /// Names in current traversal order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Encodings stored for `name`, in insertion order.
    pub fn encodings(&self, name: &str) -> Option<&[Embedding]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.encodings.as_slice())
    }

    /// Number of known people.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
