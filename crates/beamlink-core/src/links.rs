//! Link registry.
//!
//! Tracks `(local, remote)` process pairs linked across one connection, so a
//! disconnect can notify every local side with `noconnection`.

use eetf::Pid;

/// A link between a local and a remote process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    /// Process on this node
    pub local: Pid,
    /// Process on the peer
    pub remote: Pid,
}

impl LinkEntry {
    /// Create an entry
    #[must_use]
    pub fn new(local: Pid, remote: Pid) -> Self {
        Self { local, remote }
    }
}

/// Set of links for one connection.
#[derive(Debug, Clone, Default)]
pub struct LinkRegistry {
    entries: Vec<LinkEntry>,
}

impl LinkRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a link. Returns `false` if it was already present.
    pub fn insert(&mut self, local: Pid, remote: Pid) -> bool {
        let entry = LinkEntry::new(local, remote);
        if self.entries.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Remove a link. Returns `false` if it was not present.
    pub fn remove(&mut self, local: &Pid, remote: &Pid) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(&e.local == local && &e.remote == remote));
        self.entries.len() != before
    }

    /// Whether the link is recorded
    #[must_use]
    pub fn contains(&self, local: &Pid, remote: &Pid) -> bool {
        self.entries
            .iter()
            .any(|e| &e.local == local && &e.remote == remote)
    }

    /// Number of links
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no links
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every link
    pub fn drain(&mut self) -> Vec<LinkEntry> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(node: &str, id: u32) -> Pid {
        Pid::new(node, id, 0, 1)
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut links = LinkRegistry::new();
        assert!(links.insert(pid("a@h", 1), pid("b@h", 2)));
        assert!(!links.insert(pid("a@h", 1), pid("b@h", 2)));
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut links = LinkRegistry::new();
        links.insert(pid("a@h", 1), pid("b@h", 2));
        links.insert(pid("a@h", 1), pid("b@h", 3));
        assert!(links.remove(&pid("a@h", 1), &pid("b@h", 2)));
        assert!(!links.remove(&pid("a@h", 1), &pid("b@h", 2)));
        assert!(links.contains(&pid("a@h", 1), &pid("b@h", 3)));
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn test_drain_empties() {
        let mut links = LinkRegistry::new();
        links.insert(pid("a@h", 1), pid("x@h", 1));
        links.insert(pid("a@h", 2), pid("y@h", 1));
        let drained = links.drain();
        assert_eq!(drained.len(), 2);
        assert!(links.is_empty());
    }
}
