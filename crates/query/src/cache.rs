//! Per-operator memo of optimization costs.

use hashbrown::HashMap;
use std::collections::BTreeSet;

/// A set of column names.
pub type ColSet = BTreeSet<String>;

type CacheKey = (Vec<String>, ColSet, ColSet, bool);

/// Cost memo keyed by (index, needs, firstneeds, is_cursor).
///
/// Owned by a single operator. Only consulted and written while exploring;
/// committing always recomputes so the chosen strategy gets recorded.
#[derive(Clone, Debug, Default)]
pub struct Cache {
    entries: HashMap<CacheKey, f64>,
}

impl Cache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    pub fn add(
        &mut self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
        cost: f64,
    ) {
        self.entries.insert(
            (index.to_vec(), needs.clone(), firstneeds.clone(), is_cursor),
            cost,
        );
    }

    /// Looks up an entry.
    pub fn get(
        &self,
        index: &[String],
        needs: &ColSet,
        firstneeds: &ColSet,
        is_cursor: bool,
    ) -> Option<f64> {
        self.entries
            .get(&(index.to_vec(), needs.clone(), firstneeds.clone(), is_cursor))
            .copied()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(v: &[&str]) -> ColSet {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cache_keys() {
        let mut cache = Cache::new();
        let idx = vec!["a".to_string()];
        cache.add(&idx, &set(&["a", "b"]), &set(&[]), false, 12.5);

        assert_eq!(cache.get(&idx, &set(&["b", "a"]), &set(&[]), false), Some(12.5));
        assert_eq!(cache.get(&idx, &set(&["a", "b"]), &set(&[]), true), None);
        assert_eq!(cache.get(&[], &set(&["a", "b"]), &set(&[]), false), None);
        assert_eq!(cache.len(), 1);
    }
}
