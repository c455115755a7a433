use std::collections::{HashMap, HashSet};

/// Remembers which definitional entities were already emitted in this run.
///
/// Sets are partitioned per entity kind, so the same uid under two kinds is
/// tracked independently.
#[derive(Debug, Default)]
pub struct EntityDeduplicator {
    emitted: HashMap<String, HashSet<String>>,
}

impl EntityDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once per `(kind, uid)`; marks the pair as emitted.
    pub fn should_emit(&mut self, kind: &str, uid: &str) -> bool {
        match self.emitted.get_mut(kind) {
            Some(set) => set.insert(uid.to_string()),
            None => {
                self.emitted
                    .insert(kind.to_string(), HashSet::from([uid.to_string()]));
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_true_exactly_once() {
        let mut dedup = EntityDeduplicator::new();
        let results: Vec<bool> = (0..5)
            .map(|_| dedup.should_emit("qa_TestCase", "case-1"))
            .collect();
        assert_eq!(results, vec![true, false, false, false, false]);
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut dedup = EntityDeduplicator::new();
        assert!(dedup.should_emit("qa_TestSuite", "shared"));
        assert!(dedup.should_emit("qa_TestCase", "shared"));
        assert!(!dedup.should_emit("qa_TestSuite", "shared"));
        assert!(!dedup.should_emit("qa_TestCase", "shared"));
        assert!(dedup.should_emit("qa_TestExecution", "shared"));
    }

    #[test]
    fn test_never_seen_pairs_are_emitted() {
        let mut dedup = EntityDeduplicator::new();
        for i in 0..100 {
            assert!(dedup.should_emit("qa_TestCase", &format!("case-{}", i)));
        }
        assert!(!dedup.should_emit("qa_TestCase", "case-99"));
        assert!(dedup.should_emit("qa_TestSuite", "case-99"));
    }
}
