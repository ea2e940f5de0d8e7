//! Per-device build retention.
//!
//! Builds are ranked newest first by timestamp; everything ranked at or past
//! the limit is evicted. A limit of 0 keeps every build.

use crate::artifact::Dated;

/// Count-based retention policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of builds to keep per device (0 = unlimited)
    pub max_builds: usize,
}

impl RetentionPolicy {
    /// Keep every build.
    pub fn unlimited() -> Self {
        Self { max_builds: 0 }
    }

    /// Keep the `count` most recent builds; 0 means unlimited.
    pub fn keep_last_n(count: usize) -> Self {
        Self { max_builds: count }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_builds == 0
    }

    /// Indices into `items` of the entries that fall outside the window.
    ///
    /// Ties on timestamp keep their relative order, so among builds of the
    /// same date the ones listed first survive.
    pub fn evicted<T: Dated>(&self, items: &[T]) -> Vec<usize> {
        if self.is_unlimited() || items.len() <= self.max_builds {
            return Vec::new();
        }

        let mut ranked: Vec<usize> = (0..items.len()).collect();
        ranked.sort_by(|&a, &b| items[b].timestamp().cmp(&items[a].timestamp()));
        ranked.split_off(self.max_builds)
    }

    /// Whether `candidate`, appended to `items`, would immediately be evicted.
    pub fn would_evict<T: Dated>(&self, items: &[T], candidate: &T) -> bool {
        if self.is_unlimited() {
            return false;
        }

        // Appended last, so existing entries of the same date rank ahead.
        let rank = items
            .iter()
            .filter(|item| item.timestamp() >= candidate.timestamp())
            .count();
        rank >= self.max_builds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Stamp(i64, &'static str);

    impl Dated for Stamp {
        fn timestamp(&self) -> i64 {
            self.0
        }
    }

    fn evicted_labels(policy: RetentionPolicy, items: &[Stamp]) -> Vec<&'static str> {
        let mut labels: Vec<_> = policy.evicted(items).into_iter().map(|i| items[i].1).collect();
        labels.sort();
        labels
    }

    #[test]
    fn test_unlimited_never_evicts() {
        let items: Vec<_> = (0..50).map(|i| Stamp(i, "x")).collect();
        assert!(RetentionPolicy::unlimited().evicted(&items).is_empty());
        assert!(RetentionPolicy::keep_last_n(0).evicted(&items).is_empty());
        assert!(!RetentionPolicy::unlimited().would_evict(&items, &Stamp(-1, "old")));
    }

    #[test]
    fn test_evicts_oldest_beyond_limit() {
        let items = vec![Stamp(10, "b"), Stamp(30, "d"), Stamp(5, "a"), Stamp(20, "c")];
        assert_eq!(evicted_labels(RetentionPolicy::keep_last_n(2), &items), vec!["a", "b"]);
        assert_eq!(evicted_labels(RetentionPolicy::keep_last_n(3), &items), vec!["a"]);
        assert!(evicted_labels(RetentionPolicy::keep_last_n(4), &items).is_empty());
        assert!(evicted_labels(RetentionPolicy::keep_last_n(10), &items).is_empty());
    }

    #[test]
    fn test_bucket_shrinks_to_min_of_n_and_limit() {
        for n in 0..8 {
            for limit in 1..6 {
                let items: Vec<_> = (0..n).map(|i| Stamp(i * 100, "x")).collect();
                let evicted = RetentionPolicy::keep_last_n(limit).evicted(&items);
                let kept = items.len() - evicted.len();
                assert_eq!(kept, items.len().min(limit));
                // Survivors are exactly the most recent ones
                for i in evicted {
                    assert!(items[i].0 < (n as i64 - limit as i64) * 100);
                }
            }
        }
    }

    #[test]
    fn test_ties_keep_earlier_entries() {
        let items = vec![Stamp(10, "first"), Stamp(10, "second"), Stamp(10, "third")];
        assert_eq!(
            evicted_labels(RetentionPolicy::keep_last_n(1), &items),
            vec!["second", "third"]
        );
    }

    #[test]
    fn test_would_evict_candidate() {
        let policy = RetentionPolicy::keep_last_n(2);
        let items = vec![Stamp(20, "b"), Stamp(30, "c")];

        assert!(policy.would_evict(&items, &Stamp(10, "older")));
        assert!(policy.would_evict(&items, &Stamp(20, "same date as oldest")));
        assert!(!policy.would_evict(&items, &Stamp(25, "in between")));
        assert!(!policy.would_evict(&[Stamp(20, "b")], &Stamp(1, "room left")));
    }
}
