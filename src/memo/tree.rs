// Argument tree backing the memoizer.
//
// One `HashMap` level per argument position. Every level but the last maps
// an argument to the next level; the last level maps the final argument to
// the memoized value. Removal prunes levels that become empty so evicted
// paths leave no dead branches behind.

use std::collections::HashMap;
use std::hash::Hash;

/// A node in the argument tree.
#[derive(Debug, Clone)]
pub enum Slot<K, V> {
    /// Mapping for the next argument position.
    Level(Level<K, V>),
    /// Memoized result of a complete argument tuple.
    Value(V),
}

/// One level of the argument tree.
pub type Level<K, V> = HashMap<K, Slot<K, V>>;

/// Find the value stored at `path`.
pub(crate) fn lookup<'a, K, V>(root: &'a Level<K, V>, path: &[K]) -> Option<&'a V>
where
    K: Eq + Hash,
{
    let (last, prefix) = path.split_last()?;
    let mut level = root;
    for arg in prefix {
        match level.get(arg)? {
            Slot::Level(next) => level = next,
            Slot::Value(_) => return None,
        }
    }
    match level.get(last)? {
        Slot::Value(value) => Some(value),
        Slot::Level(_) => None,
    }
}

/// Store `value` at `path`, creating intermediate levels on the way down.
///
/// Returns the value previously stored at `path`, if any.
pub(crate) fn insert<K, V>(root: &mut Level<K, V>, path: &[K], value: V) -> Option<V>
where
    K: Eq + Hash + Clone,
{
    let (last, prefix) = path.split_last()?;
    let mut level = root;
    for arg in prefix {
        let slot = level
            .entry(arg.clone())
            .or_insert_with(|| Slot::Level(Level::new()));
        level = match slot {
            Slot::Level(next) => next,
            Slot::Value(_) => unreachable!("memo paths always share one arity"),
        };
    }
    match level.insert(last.clone(), Slot::Value(value)) {
        Some(Slot::Value(previous)) => Some(previous),
        _ => None,
    }
}

/// Remove the value at `path` and every level the removal left empty.
///
/// Pruning walks back up the path and stops at the first level that still
/// holds other entries.
pub(crate) fn remove<K, V>(root: &mut Level<K, V>, path: &[K]) -> Option<V>
where
    K: Eq + Hash,
{
    let (first, rest) = path.split_first()?;
    if rest.is_empty() {
        if !matches!(root.get(first), Some(Slot::Value(_))) {
            return None;
        }
        return match root.remove(first) {
            Some(Slot::Value(value)) => Some(value),
            _ => None,
        };
    }

    let Some(Slot::Level(child)) = root.get_mut(first) else {
        return None;
    };
    let removed = remove(child, rest);
    if child.is_empty() {
        root.remove(first);
    }
    removed
}

/// Count the levels reachable from `root`, including `root` itself.
#[cfg(test)]
pub(crate) fn level_count<K, V>(root: &Level<K, V>) -> usize {
    1 + root
        .values()
        .map(|slot| match slot {
            Slot::Level(next) => level_count(next),
            Slot::Value(_) => 0,
        })
        .sum::<usize>()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup() {
        let mut root: Level<u32, &str> = Level::new();
        assert!(insert(&mut root, &[1, 2, 3], "a").is_none());
        assert!(insert(&mut root, &[1, 2, 4], "b").is_none());

        assert_eq!(lookup(&root, &[1, 2, 3]), Some(&"a"));
        assert_eq!(lookup(&root, &[1, 2, 4]), Some(&"b"));
        assert_eq!(lookup(&root, &[1, 2, 5]), None);
        assert_eq!(lookup(&root, &[9, 2, 3]), None);
        // Levels are shared between paths with a common prefix.
        assert_eq!(level_count(&root), 3);
    }

    #[test]
    fn insert_replaces_existing_value() {
        let mut root: Level<u32, u32> = Level::new();
        insert(&mut root, &[7], 1);
        assert_eq!(insert(&mut root, &[7], 2), Some(1));
        assert_eq!(lookup(&root, &[7]), Some(&2));
    }

    #[test]
    fn remove_prunes_only_emptied_levels() {
        let mut root: Level<u32, u32> = Level::new();
        insert(&mut root, &[1, 2, 3], 10);
        insert(&mut root, &[1, 5, 6], 20);

        assert_eq!(remove(&mut root, &[1, 2, 3]), Some(10));
        // [1] still holds the [5] branch, [1][2] is gone.
        assert_eq!(level_count(&root), 3);
        assert!(lookup(&root, &[1, 5, 6]).is_some());

        assert_eq!(remove(&mut root, &[1, 5, 6]), Some(20));
        assert!(root.is_empty());
    }

    #[test]
    fn remove_missing_path_is_noop() {
        let mut root: Level<u32, u32> = Level::new();
        insert(&mut root, &[1, 2], 10);
        assert_eq!(remove(&mut root, &[1, 3]), None);
        assert_eq!(remove(&mut root, &[4, 2]), None);
        assert_eq!(remove(&mut root, &[1]), None);
        assert_eq!(lookup(&root, &[1, 2]), Some(&10));
    }
}
