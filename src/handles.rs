//! Variable reference handles.
//!
//! The frontend refers to expandable things (a scope, a watch, a child of a
//! watch) by integer references. The allocator maps those integers to
//! string paths the bridge understands. All references are invalidated
//! whenever the target stops.

use std::collections::HashMap;

/// Path of the locals scope of the selected frame.
pub const LOCALS_PATH: &str = "locals";

/// Prefix marking paths that were created without a frame context.
pub const GLOBAL_PREFIX: &str = "global:";

/// Bidirectional map between frontend references and paths.
///
/// Reference 0 is never handed out; the frontend reads it as "not
/// expandable". The counter keeps growing across resets so a stale
/// reference can never alias a new one.
#[derive(Debug)]
pub struct HandleAllocator {
    next: i64,
    by_reference: HashMap<i64, String>,
    by_path: HashMap<String, i64>,
}

impl HandleAllocator {
    /// Create an empty allocator.
    pub fn new() -> Self {
        Self {
            next: 1,
            by_reference: HashMap::new(),
            by_path: HashMap::new(),
        }
    }

    /// Reference for `path`, allocating one if the path is new.
    pub fn create(&mut self, path: &str) -> i64 {
        if let Some(&reference) = self.by_path.get(path) {
            return reference;
        }
        let reference = self.next;
        self.next += 1;
        self.by_reference.insert(reference, path.to_string());
        self.by_path.insert(path.to_string(), reference);
        reference
    }

    /// Path behind `reference`, if it is live.
    pub fn get(&self, reference: i64) -> Option<&str> {
        self.by_reference.get(&reference).map(String::as_str)
    }

    /// Drop every live reference.
    pub fn reset_all(&mut self) {
        self.by_reference.clear();
        self.by_path.clear();
    }

    /// Number of live references.
    pub fn len(&self) -> usize {
        self.by_reference.len()
    }

    /// Whether no reference is live.
    pub fn is_empty(&self) -> bool {
        self.by_reference.is_empty()
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `path` denotes something evaluated outside any frame.
pub fn is_global_path(path: &str) -> bool {
    path.starts_with(GLOBAL_PREFIX)
}

/// The backend watch id a watch path refers to.
pub fn watch_id_of(path: &str) -> &str {
    path.strip_prefix(GLOBAL_PREFIX).unwrap_or(path)
}
