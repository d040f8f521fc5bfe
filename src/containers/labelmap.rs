//! Small label → node-index lookup, used for species-tree tip resolution and
//! individual→species tag lookups.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct LabelMap {
    inner: HashMap<String, usize>,
}

impl LabelMap {
    pub fn new() -> Self {
        LabelMap {
            inner: HashMap::new(),
        }
    }

    /// Insert `label -> index`. Returns `false` (and leaves the map
    /// unchanged) if the label was already present.
    pub fn insert(&mut self, label: impl Into<String>, index: usize) -> bool {
        let label = label.into();
        if self.inner.contains_key(&label) {
            return false;
        }
        self.inner.insert(label, index);
        true
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.inner.get(label).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.inner.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_labels() {
        let mut map = LabelMap::new();
        assert!(map.insert("A", 0));
        assert!(!map.insert("A", 1));
        assert_eq!(map.get("A"), Some(0));
    }
}
