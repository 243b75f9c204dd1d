//! Interest filter table (longest-prefix dispatch)
//!
//! Design:
//! - `BTreeMap<Name, FilterEntry>` ordered component-wise.
//! - Prefixes are unique: registering an existing prefix swaps the callback.
//! - `longest_match` probes the incoming name's own prefixes from longest to
//!   shortest, so a lookup costs O(depth * log N) and never scans the table.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::name::Name;

/// Callback for interests arriving under a registered prefix.
///
/// Receives the full incoming name. Runs on the loop thread.
pub type InterestCallback = Arc<dyn Fn(&Name) + Send + Sync + 'static>;

/// A registered prefix and its callback.
#[derive(Clone)]
pub struct FilterEntry<C = InterestCallback> {
    prefix: Name,
    callback: C,
}

impl<C> FilterEntry<C> {
    #[must_use]
    pub const fn prefix(&self) -> &Name {
        &self.prefix
    }

    #[must_use]
    pub const fn callback(&self) -> &C {
        &self.callback
    }
}

impl<C> fmt::Debug for FilterEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEntry")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Table of registered prefixes.
pub struct FilterRegistry<C = InterestCallback> {
    filters: BTreeMap<Name, FilterEntry<C>>,
}

impl<C> Default for FilterRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> FilterRegistry<C> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            filters: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    #[must_use]
    pub fn contains(&self, prefix: &Name) -> bool {
        self.filters.contains_key(prefix)
    }

    /// Register `prefix`, returning the callback it replaced (if any).
    pub fn register(&mut self, prefix: Name, callback: C) -> Option<C> {
        let entry = FilterEntry {
            prefix: prefix.clone(),
            callback,
        };
        self.filters.insert(prefix, entry).map(|old| old.callback)
    }

    /// Remove `prefix`. Unknown prefixes are a no-op returning `None`.
    pub fn unregister(&mut self, prefix: &Name) -> Option<C> {
        self.filters.remove(prefix).map(|old| old.callback)
    }

    /// Find the longest registered prefix of `name` (including `name` itself).
    #[must_use]
    pub fn longest_match(&self, name: &Name) -> Option<&FilterEntry<C>> {
        if self.filters.is_empty() {
            return None;
        }
        name.prefixes_longest_first()
            .find_map(|prefix| self.filters.get(&prefix))
    }

    /// Registered prefixes in order.
    pub fn prefixes(&self) -> impl Iterator<Item = &Name> {
        self.filters.keys()
    }

    /// Remove every entry.
    pub fn clear(&mut self) -> Vec<FilterEntry<C>> {
        std::mem::take(&mut self.filters).into_values().collect()
    }
}

impl<C> fmt::Debug for FilterRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.filters.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut reg: FilterRegistry<u32> = FilterRegistry::new();
        reg.register(name("/a"), 1);
        reg.register(name("/a/b"), 2);
        reg.register(name("/b"), 3);

        let m = reg.longest_match(&name("/a/b/c")).unwrap();
        assert_eq!(m.prefix(), &name("/a/b"));
        assert_eq!(*m.callback(), 2);

        assert_eq!(*reg.longest_match(&name("/a/x")).unwrap().callback(), 1);
        assert_eq!(*reg.longest_match(&name("/a/b")).unwrap().callback(), 2);
        assert!(reg.longest_match(&name("/c")).is_none());
    }

    #[test]
    fn test_matching_is_component_wise() {
        let mut reg: FilterRegistry<u32> = FilterRegistry::new();
        reg.register(name("/a/b"), 1);
        assert!(reg.longest_match(&name("/a/bc")).is_none());
    }

    #[test]
    fn test_root_prefix_catches_everything() {
        let mut reg: FilterRegistry<u32> = FilterRegistry::new();
        reg.register(Name::root(), 9);
        reg.register(name("/a"), 1);

        assert_eq!(*reg.longest_match(&name("/z/y")).unwrap().callback(), 9);
        assert_eq!(*reg.longest_match(&name("/a/y")).unwrap().callback(), 1);
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut reg: FilterRegistry<u32> = FilterRegistry::new();
        assert_eq!(reg.register(name("/a"), 1), None);
        assert_eq!(reg.register(name("/a"), 2), Some(1));
        assert_eq!(reg.len(), 1);
        assert_eq!(*reg.longest_match(&name("/a/q")).unwrap().callback(), 2);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let mut reg: FilterRegistry<u32> = FilterRegistry::new();
        reg.register(name("/a"), 1);
        assert_eq!(reg.unregister(&name("/nope")), None);
        assert_eq!(reg.unregister(&name("/a")), Some(1));
        assert!(reg.is_empty());
        assert!(reg.longest_match(&name("/a")).is_none());
    }

    #[test]
    fn test_clear_returns_entries_in_order() {
        let mut reg: FilterRegistry<u32> = FilterRegistry::new();
        reg.register(name("/b"), 2);
        reg.register(name("/a"), 1);

        let prefixes: Vec<Name> = reg.clear().iter().map(|e| e.prefix().clone()).collect();
        assert_eq!(prefixes, vec![name("/a"), name("/b")]);
        assert!(reg.is_empty());
    }
}
