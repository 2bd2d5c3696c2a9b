//! Keyed registry of live view-layer handles, one per thread id.
//!
//! Handles are inserted when a view is created for a thread and removed when
//! the thread is deleted, resolved, or disappears on resync.

use std::collections::HashMap;

use crate::types::Thread;

#[derive(Debug)]
pub struct Registry<H> {
    handles: HashMap<String, H>,
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self {
            handles: HashMap::new(),
        }
    }

    /// Registers `handle` for `thread_id`, returning any handle it replaced.
    pub fn insert(&mut self, thread_id: impl Into<String>, handle: H) -> Option<H> {
        self.handles.insert(thread_id.into(), handle)
    }

    pub fn remove(&mut self, thread_id: &str) -> Option<H> {
        self.handles.remove(thread_id)
    }

    pub fn get(&self, thread_id: &str) -> Option<&H> {
        self.handles.get(thread_id)
    }

    pub fn get_mut(&mut self, thread_id: &str) -> Option<&mut H> {
        self.handles.get_mut(thread_id)
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.handles.contains_key(thread_id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drops handles whose thread is no longer in `threads` and returns them
    /// for disposal.
    pub fn retain_threads(&mut self, threads: &[Thread]) -> Vec<(String, H)> {
        let stale: Vec<String> = self
            .handles
            .keys()
            .filter(|id| !threads.iter().any(|t| &t.id == *id))
            .cloned()
            .collect();
        stale
            .into_iter()
            .filter_map(|id| self.handles.remove(&id).map(|handle| (id, handle)))
            .collect()
    }

    /// Threads in `threads` that have no registered handle yet.
    pub fn missing<'a>(&self, threads: &'a [Thread]) -> Vec<&'a Thread> {
        threads.iter().filter(|t| !self.handles.contains_key(&t.id)).collect()
    }

    /// Removes every handle, e.g. on shutdown.
    pub fn drain(&mut self) -> impl Iterator<Item = (String, H)> + '_ {
        self.handles.drain()
    }
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Comment, Range};

    fn thread(id: &str) -> Thread {
        Thread {
            id: id.to_owned(),
            uri: "src/a.rs".to_owned(),
            range: Range::lines(0, 0),
            selected_text: "x".to_owned(),
            context_before: String::new(),
            context_after: String::new(),
            content_hash: String::new(),
            comments: vec![Comment {
                id: "c".to_owned(),
                body: "b".to_owned(),
                author: "a".to_owned(),
                created_at: String::new(),
            }],
            orphaned: None,
        }
    }

    #[test]
    fn sync_against_thread_list() {
        let mut registry: Registry<u32> = Registry::new();
        registry.insert("a", 1);
        registry.insert("b", 2);

        let threads = vec![thread("b"), thread("c")];
        let mut removed = registry.retain_threads(&threads);
        removed.sort();
        assert_eq!(removed, vec![("a".to_owned(), 1)]);

        let missing: Vec<&str> = registry.missing(&threads).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(missing, vec!["c"]);

        assert_eq!(registry.insert("c", 3), None);
        assert_eq!(registry.insert("c", 4), Some(3));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.drain().count(), 2);
        assert!(registry.is_empty());
    }
}
